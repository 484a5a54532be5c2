//! Plumbing shared by the `rawload*` binaries

use crate::pipeline::{Orchestrator, RunSummary, Step};
use anyhow::{bail, Context, Result};
use rawload_common::env::EnvReader;
use rawload_common::logging::{init_logging, LogConfig, LogGuard, LogLevel};
use tracing::{error, info};

/// Load `.env` and start logging
///
/// `LOG_*` variables take precedence over the defaults picked here. A
/// malformed `LOG_*` value is an error, reported before anything else runs.
pub fn init(log_file_prefix: &str, verbose: bool) -> Result<LogGuard> {
    dotenvy::dotenv().ok();

    let level = if verbose {
        LogLevel::Debug
    } else {
        LogLevel::Info
    };

    let log_config = LogConfig::builder()
        .level(level)
        .log_file_prefix(log_file_prefix)
        .filter_directives("aws_config=warn,aws_smithy_runtime=warn,sqlx=warn,hyper=warn")
        .build();

    let log_config = LogConfig::from_reader(&EnvReader::process(), log_config)
        .context("Invalid logging configuration")?;

    Ok(init_logging(&log_config)?)
}

/// Run `steps` from environment configuration
///
/// Fails when configuration is invalid, a stage hits a fatal error, or any
/// object ended up failed.
pub async fn run(steps: &[Step]) -> Result<()> {
    let orchestrator = Orchestrator::from_env().context("Failed to load configuration")?;

    let summary = match orchestrator.run(steps).await {
        Ok(summary) => summary,
        Err(e) => {
            error!("Pipeline aborted: {}", e);
            return Err(e.into());
        },
    };

    report(&summary);

    if summary.has_failures() {
        bail!("Run {} finished with failed objects", summary.run_id);
    }
    Ok(())
}

fn report(summary: &RunSummary) {
    if !summary.extracted.is_empty() {
        info!("Extracted {} files", summary.extracted.len());
    }
    if let Some(publish) = &summary.publish {
        info!(
            "Published {} files, {} failed",
            publish.transferred.len(),
            publish.failures.len()
        );
        for failure in &publish.failures {
            error!("  {}: {}", failure.object, failure.error);
        }
    }
    if let Some(load) = &summary.load {
        info!(
            "Loaded {} rows from {} files, {} skipped, {} failed",
            load.rows_loaded(),
            load.loaded(),
            load.skipped(),
            load.failed()
        );
    }
    info!(run_id = %summary.run_id, "Run complete");
}
