//! Staging transfer
//!
//! Byte-for-byte copies between local disk and the object store, in both
//! directions, plus the scoped scratch directory loads are staged through.
//!
//! Per-object failures never abort a publish on their own: each one is
//! recorded in the [`TransferReport`] and the batch moves on, unless the
//! caller chose [`FailurePolicy::AbortOnFirst`].

use crate::config::FailurePolicy;
use crate::error::{IngestError, Result};
use crate::events::{EventKind, EventLog, PipelineEvent, Severity, Stage};
use crate::source::list_local;
use crate::storage::{filename_of, object_key, ObjectStore};
use rawload_common::checksum::sha256_hex;
use std::path::{Path, PathBuf};
use tempfile::TempDir;
use tracing::{debug, instrument};

const STAGING_PREFIX: &str = "rawload-staging-";

/// Scoped local scratch directory
///
/// Created before the first transfer and deleted with everything in it when
/// dropped, whether the batch succeeded or not. [`StagingArea::close`]
/// deletes it eagerly and reports cleanup errors.
#[derive(Debug)]
pub struct StagingArea {
    dir: TempDir,
}

impl StagingArea {
    /// Create a fresh directory under `root` (the system temp dir when `None`)
    pub fn create(root: Option<&Path>) -> Result<Self> {
        let mut builder = tempfile::Builder::new();
        builder.prefix(STAGING_PREFIX);

        let dir = match root {
            Some(root) => {
                std::fs::create_dir_all(root)?;
                builder.tempdir_in(root)?
            },
            None => builder.tempdir()?,
        };

        debug!(path = %dir.path().display(), "Created staging area");
        Ok(Self { dir })
    }

    pub fn path(&self) -> &Path {
        self.dir.path()
    }

    /// Path a file named `filename` is staged at
    pub fn path_for(&self, filename: &str) -> PathBuf {
        self.dir.path().join(filename)
    }

    /// Remove the directory now
    pub fn close(self) -> Result<()> {
        let path = self.dir.path().to_path_buf();
        self.dir.close()?;
        debug!(path = %path.display(), "Removed staging area");
        Ok(())
    }
}

/// An object that made it to its destination
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Transferred {
    pub object: String,
    pub size: u64,
    pub sha256: String,
}

/// An object that did not
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TransferFailure {
    pub object: String,
    pub error: String,
}

/// Outcome of a batch transfer
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TransferReport {
    pub transferred: Vec<Transferred>,
    pub failures: Vec<TransferFailure>,
    /// True when the failure policy stopped the batch early
    pub aborted: bool,
}

impl TransferReport {
    pub fn is_success(&self) -> bool {
        self.failures.is_empty() && !self.aborted
    }
}

/// Upload every `suffix` file in `local_dir` to `store` under `prefix`
///
/// Listing the directory is the only fatal step; individual uploads are
/// reported in the returned [`TransferReport`].
#[instrument(skip(store, events), fields(location = %store.location()))]
pub async fn publish_directory<S>(
    store: &S,
    local_dir: &Path,
    prefix: &str,
    suffix: &str,
    policy: FailurePolicy,
    events: &mut EventLog,
) -> Result<TransferReport>
where
    S: ObjectStore + ?Sized,
{
    let files = list_local(local_dir, suffix)?;
    let mut report = TransferReport::default();

    if files.is_empty() {
        events.warn(
            Stage::Publish,
            EventKind::NothingFound,
            format!("No {} files found in {}", suffix, local_dir.display()),
        );
        return Ok(report);
    }

    events.info(
        Stage::Publish,
        EventKind::Progress,
        format!("Found {} {} files in {}", files.len(), suffix, local_dir.display()),
    );

    for path in files {
        let filename = path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default();
        let key = object_key(prefix, &filename);

        match publish_file(store, &path, &key).await {
            Ok(done) => {
                events.emit(
                    PipelineEvent::new(
                        Severity::Info,
                        Stage::Publish,
                        EventKind::Published,
                        format!(
                            "Uploaded {} -> {}/{} ({} bytes)",
                            path.display(),
                            store.location(),
                            key,
                            done.size
                        ),
                    )
                    .with_object(&key),
                );
                report.transferred.push(done);
            },
            Err(e) => {
                events.emit(
                    PipelineEvent::new(
                        Severity::Error,
                        Stage::Publish,
                        EventKind::Failed,
                        format!("Upload of {} failed: {}", path.display(), e),
                    )
                    .with_object(&key),
                );
                report.failures.push(TransferFailure {
                    object: key,
                    error: e.to_string(),
                });

                if policy == FailurePolicy::AbortOnFirst {
                    events.warn(
                        Stage::Publish,
                        EventKind::Aborted,
                        "Stopping publish after first failure",
                    );
                    report.aborted = true;
                    break;
                }
            },
        }
    }

    Ok(report)
}

/// Copy one local file to `key`
pub async fn publish_file<S>(store: &S, path: &Path, key: &str) -> Result<Transferred>
where
    S: ObjectStore + ?Sized,
{
    let data = tokio::fs::read(path)
        .await
        .map_err(|e| IngestError::transfer(key, e))?;
    let size = data.len() as u64;
    let sha256 = sha256_hex(&data);

    store.put(key, data).await?;

    Ok(Transferred {
        object: key.to_string(),
        size,
        sha256,
    })
}

/// Copy object `key` into the staging area, named by the key's basename
pub async fn fetch_to_staging<S>(store: &S, key: &str, staging: &StagingArea) -> Result<PathBuf>
where
    S: ObjectStore + ?Sized,
{
    let filename = filename_of(key);
    if filename.is_empty() {
        return Err(IngestError::transfer(key, "key has no filename component"));
    }

    let data = store.get(key).await?;
    let local_path = staging.path_for(filename);
    tokio::fs::write(&local_path, &data)
        .await
        .map_err(|e| IngestError::transfer(key, e))?;

    debug!(
        object = %key,
        path = %local_path.display(),
        bytes = data.len(),
        "Staged object"
    );
    Ok(local_path)
}
