//! rawload ingest library
//!
//! Batch ingestion of a public dataset into PostgreSQL raw tables, by way of
//! S3-compatible object storage.
//!
//! # Stages
//!
//! - **Download**: fetch the dataset archive and extract its CSV files
//! - **Publish**: upload the local CSV files under a key prefix
//! - **Load**: list the prefix, stage each mapped object locally and bulk
//!   load it into the table the filename maps to
//!
//! # Example
//!
//! ```no_run
//! use rawload_ingest::pipeline::{Orchestrator, Step};
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let orchestrator = Orchestrator::from_env()?;
//!     let summary = orchestrator.run(&Step::ALL).await?;
//!     println!("{} failures", summary.has_failures());
//!     Ok(())
//! }
//! ```

pub mod cli;
pub mod config;
pub mod dataset;
pub mod error;
pub mod events;
pub mod loader;
pub mod mapping;
pub mod pipeline;
pub mod source;
pub mod staging;
pub mod storage;

pub use config::Config;
pub use error::{IngestError, Result};
pub use mapping::TableMapping;
pub use pipeline::{Orchestrator, Pipeline, Step};
