//! rawload-publish - Upload local CSV files to object storage

use anyhow::Result;
use rawload_ingest::{cli, Step};

#[tokio::main]
async fn main() -> Result<()> {
    let _guard = cli::init("rawload-publish", false)?;
    cli::run(&[Step::Publish]).await
}
