//! rawload-download - Download and extract the dataset archive

use anyhow::Result;
use rawload_ingest::{cli, Step};

#[tokio::main]
async fn main() -> Result<()> {
    let _guard = cli::init("rawload-download", false)?;
    cli::run(&[Step::Download]).await
}
