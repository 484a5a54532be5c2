//! rawload common library
#![deny(clippy::unwrap_used, clippy::expect_used)]
//!
//! Shared pieces used by every rawload workspace member:
//!
//! - **Error Handling**: [`RawloadError`] and the crate [`Result`] alias
//! - **Environment**: typed reads of environment-style configuration
//! - **Logging**: `tracing` subscriber setup driven by `LOG_*` variables
//! - **Checksums**: SHA-256 digests for published objects
//!
//! # Example
//!
//! ```no_run
//! use rawload_common::env::EnvReader;
//! use rawload_common::Result;
//!
//! fn region() -> Result<String> {
//!     let env = EnvReader::process();
//!     Ok(env.string_or("S3_REGION", "us-east-2"))
//! }
//! ```

pub mod checksum;
pub mod env;
pub mod error;
pub mod logging;

pub use error::{RawloadError, Result};
