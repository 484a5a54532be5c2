//! rawload - dataset to raw tables ingestion tool

use anyhow::Result;
use clap::{Parser, Subcommand};
use rawload_ingest::{cli, Step};

#[derive(Parser, Debug)]
#[command(name = "rawload")]
#[command(author, version, about = "Download a dataset, stage it in S3 and load it into PostgreSQL")]
struct Cli {
    /// Stage to run; all stages when omitted
    #[command(subcommand)]
    command: Option<Command>,

    /// Verbose output
    #[arg(short, long, global = true)]
    verbose: bool,
}

#[derive(Subcommand, Debug, Clone, Copy)]
enum Command {
    /// Download and extract the dataset archive
    Download,
    /// Upload local CSV files to object storage
    Publish,
    /// Load CSV objects into the raw tables
    Load,
    /// Run download, publish and load in order
    Run,
}

impl Command {
    fn steps(self) -> &'static [Step] {
        match self {
            Command::Download => &[Step::Download],
            Command::Publish => &[Step::Publish],
            Command::Load => &[Step::Load],
            Command::Run => &Step::ALL,
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Cli::parse();
    let _guard = cli::init("rawload", args.verbose)?;

    let command = args.command.unwrap_or(Command::Run);
    cli::run(command.steps()).await
}
