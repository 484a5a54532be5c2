//! rawload-load - Load CSV objects from object storage into the raw tables

use anyhow::Result;
use rawload_ingest::{cli, Step};

#[tokio::main]
async fn main() -> Result<()> {
    let _guard = cli::init("rawload-load", false)?;
    cli::run(&[Step::Load]).await
}
