//! Stage orchestration
//!
//! [`Pipeline`] runs the publish and load stages against any
//! [`ObjectStore`] and [`RawTableSink`]; [`Orchestrator`] builds the real
//! clients from [`Config`] and sequences download, publish and load with a
//! step banner before each.
//!
//! Processing is strictly sequential: each object is listed, staged and
//! loaded before the next one is looked at.

use crate::config::{Config, FailurePolicy, LoadMode, PipelineSettings};
use crate::dataset::DatasetClient;
use crate::error::{IngestError, Result};
use crate::events::{step_banner, EventKind, EventLog, PipelineEvent, Severity, Stage};
use crate::loader::{load_file, LoadOutcome, PgDestination, RawTableSink};
use crate::mapping::TableMapping;
use crate::source::list_objects;
use crate::staging::{fetch_to_staging, publish_directory, StagingArea, TransferReport};
use crate::storage::{filename_of, list_prefix, ObjectStore, S3Store};
use futures::TryStreamExt;
use std::path::{Path, PathBuf};
use tracing::{debug, info, info_span, warn, Instrument};
use uuid::Uuid;

/// Final state of one source object in the load stage
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FileState {
    Loaded { rows: u64 },
    /// Zero bytes or a header only
    SkippedEmpty,
    /// No table is mapped to the filename; nothing was downloaded
    SkippedUnmapped,
    Failed { reason: String },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileOutcome {
    pub object: String,
    pub table: Option<String>,
    pub state: FileState,
}

/// Outcome of the load stage
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LoadReport {
    pub files: Vec<FileOutcome>,
    /// True when the failure policy stopped the batch early
    pub aborted: bool,
}

impl LoadReport {
    pub fn rows_loaded(&self) -> u64 {
        self.files
            .iter()
            .map(|f| match f.state {
                FileState::Loaded { rows } => rows,
                _ => 0,
            })
            .sum()
    }

    pub fn loaded(&self) -> usize {
        self.count(|s| matches!(s, FileState::Loaded { .. }))
    }

    pub fn skipped(&self) -> usize {
        self.count(|s| matches!(s, FileState::SkippedEmpty | FileState::SkippedUnmapped))
    }

    pub fn failed(&self) -> usize {
        self.count(|s| matches!(s, FileState::Failed { .. }))
    }

    pub fn is_success(&self) -> bool {
        self.failed() == 0 && !self.aborted
    }

    fn count(&self, pred: impl Fn(&FileState) -> bool) -> usize {
        self.files.iter().filter(|f| pred(&f.state)).count()
    }
}

/// Publish and load stages over an object store
pub struct Pipeline<S> {
    store: S,
    mapping: TableMapping,
    prefix: String,
    settings: PipelineSettings,
    events: EventLog,
}

impl<S: ObjectStore> Pipeline<S> {
    pub fn new(
        store: S,
        mapping: TableMapping,
        prefix: impl Into<String>,
        settings: PipelineSettings,
    ) -> Self {
        Self {
            store,
            mapping,
            prefix: list_prefix(&prefix.into()),
            settings,
            events: EventLog::new(),
        }
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    pub fn events(&self) -> &EventLog {
        &self.events
    }

    pub fn into_events(self) -> EventLog {
        self.events
    }

    /// Upload the tabular files of `local_dir` under the configured prefix
    pub async fn publish(&mut self, local_dir: &Path) -> Result<TransferReport> {
        let report = publish_directory(
            &self.store,
            local_dir,
            &self.prefix,
            &self.settings.file_suffix,
            self.settings.failure_policy,
            &mut self.events,
        )
        .await?;

        self.events.info(
            Stage::Publish,
            EventKind::Summary,
            format!(
                "Published {} files to {} ({} failed)",
                report.transferred.len(),
                self.store.location(),
                report.failures.len()
            ),
        );
        Ok(report)
    }

    /// Load every mapped object under the prefix into `sink`
    ///
    /// `sink` is closed exactly once before this returns, whether the stage
    /// succeeded, hit a per-file failure, or failed outright (for instance
    /// when listing breaks mid-way). The staging area is gone by then too.
    pub async fn load<D>(&mut self, sink: &mut D) -> Result<LoadReport>
    where
        D: RawTableSink + ?Sized,
    {
        let result = match StagingArea::create(self.settings.staging_root.as_deref()) {
            Ok(staging) => {
                debug!(path = %staging.path().display(), "Staging area ready");
                let result = self.load_objects(&mut *sink, &staging).await;
                if let Err(e) = staging.close() {
                    warn!("Failed to remove staging area: {}", e);
                }
                result
            },
            Err(e) => Err(e),
        };

        let closed = sink.close().await;
        match &closed {
            Ok(()) => self.events.info(
                Stage::Load,
                EventKind::Progress,
                format!("Closed connection to {}", sink.describe()),
            ),
            Err(e) => self.events.emit(PipelineEvent::new(
                Severity::Error,
                Stage::Load,
                EventKind::Failed,
                format!("Failed to close connection to {}: {}", sink.describe(), e),
            )),
        }

        let report = match result {
            Ok(report) => report,
            Err(e) => {
                self.events.emit(PipelineEvent::new(
                    Severity::Error,
                    Stage::Load,
                    EventKind::Aborted,
                    format!("Load stage aborted: {}", e),
                ));
                return Err(e);
            },
        };
        closed?;

        self.events.info(
            Stage::Load,
            EventKind::Summary,
            format!(
                "Loaded {} rows from {} files ({} skipped, {} failed)",
                report.rows_loaded(),
                report.loaded(),
                report.skipped(),
                report.failed()
            ),
        );
        Ok(report)
    }

    async fn load_objects<D>(&mut self, sink: &mut D, staging: &StagingArea) -> Result<LoadReport>
    where
        D: RawTableSink + ?Sized,
    {
        let mode = self.settings.load_mode;
        let policy = self.settings.failure_policy;
        let events = &mut self.events;
        let mut report = LoadReport::default();

        let keys = list_objects(&self.store, &self.prefix, &self.settings.file_suffix);
        futures::pin_mut!(keys);

        while let Some(key) = keys.try_next().await? {
            let filename = filename_of(&key);
            let Some(table) = self.mapping.resolve(filename) else {
                events.emit(
                    PipelineEvent::new(
                        Severity::Info,
                        Stage::Load,
                        EventKind::SkippedUnmapped,
                        format!("No table mapping for {}, skipping", filename),
                    )
                    .with_object(&key),
                );
                report.files.push(FileOutcome {
                    object: key,
                    table: None,
                    state: FileState::SkippedUnmapped,
                });
                continue;
            };

            let state = match load_object(&self.store, &mut *sink, &key, table, staging, mode, events).await {
                Ok(LoadOutcome::Loaded { rows }) => {
                    events.emit(
                        PipelineEvent::new(
                            Severity::Info,
                            Stage::Load,
                            EventKind::Loaded,
                            format!("Inserted {} rows into {}", rows, table),
                        )
                        .with_object(&key),
                    );
                    FileState::Loaded { rows }
                },
                Ok(LoadOutcome::Empty) => {
                    events.emit(
                        PipelineEvent::new(
                            Severity::Warn,
                            Stage::Load,
                            EventKind::SkippedEmpty,
                            format!("{} is empty, skipping", filename),
                        )
                        .with_object(&key),
                    );
                    FileState::SkippedEmpty
                },
                Err(e) => {
                    events.emit(
                        PipelineEvent::new(
                            Severity::Error,
                            Stage::Load,
                            EventKind::Failed,
                            format!("Failed to load {} into {}: {}", filename, table, e),
                        )
                        .with_object(&key),
                    );
                    FileState::Failed {
                        reason: e.to_string(),
                    }
                },
            };

            let failed = matches!(state, FileState::Failed { .. });
            report.files.push(FileOutcome {
                object: key,
                table: Some(table.to_string()),
                state,
            });

            if failed && policy == FailurePolicy::AbortOnFirst {
                events.warn(
                    Stage::Load,
                    EventKind::Aborted,
                    "Stopping load after first failure",
                );
                report.aborted = true;
                break;
            }
        }

        if report.files.is_empty() {
            events.warn(
                Stage::Load,
                EventKind::NothingFound,
                format!(
                    "No {} objects under {}/{}",
                    self.settings.file_suffix,
                    self.store.location(),
                    self.prefix
                ),
            );
        }

        Ok(report)
    }
}

/// Stage one object, load it, and drop the staged copy
async fn load_object<S, D>(
    store: &S,
    sink: &mut D,
    key: &str,
    table: &str,
    staging: &StagingArea,
    mode: LoadMode,
    events: &mut EventLog,
) -> Result<LoadOutcome>
where
    S: ObjectStore + ?Sized,
    D: RawTableSink + ?Sized,
{
    let local_path = fetch_to_staging(store, key, staging).await?;
    events.emit(
        PipelineEvent::new(
            Severity::Info,
            Stage::Load,
            EventKind::Downloaded,
            format!("Downloaded {} -> {}", key, local_path.display()),
        )
        .with_object(key),
    );

    let outcome = load_file(sink, &local_path, table, mode).await;

    if let Err(e) = tokio::fs::remove_file(&local_path).await {
        warn!(path = %local_path.display(), "Failed to remove staged file: {}", e);
    }

    outcome
}

/// A stage of the full run
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Step {
    Download,
    Publish,
    Load,
}

impl Step {
    pub const ALL: [Step; 3] = [Step::Download, Step::Publish, Step::Load];

    pub fn title(&self) -> &'static str {
        match self {
            Step::Download => "Download dataset",
            Step::Publish => "Upload to object storage",
            Step::Load => "Load into raw tables",
        }
    }

    fn stage(&self) -> Stage {
        match self {
            Step::Download => Stage::Download,
            Step::Publish => Stage::Publish,
            Step::Load => Stage::Load,
        }
    }
}

/// What a run did, stage by stage
#[derive(Debug, Default)]
pub struct RunSummary {
    pub run_id: Uuid,
    pub extracted: Vec<PathBuf>,
    pub publish: Option<TransferReport>,
    pub load: Option<LoadReport>,
    pub events: EventLog,
}

impl RunSummary {
    /// True when any object failed to transfer or load
    pub fn has_failures(&self) -> bool {
        self.publish.as_ref().is_some_and(|r| !r.is_success())
            || self.load.as_ref().is_some_and(|r| !r.is_success())
    }
}

/// Builds clients from [`Config`] and runs stages in order
pub struct Orchestrator {
    config: Config,
    mapping: TableMapping,
}

impl Orchestrator {
    pub fn new(config: Config) -> Self {
        Self::with_mapping(config, TableMapping::olist())
    }

    pub fn with_mapping(config: Config, mapping: TableMapping) -> Self {
        Self { config, mapping }
    }

    pub fn from_env() -> Result<Self> {
        Ok(Self::new(Config::from_env()?))
    }

    /// Validate configuration for every requested step before any I/O
    pub fn validate(&self, steps: &[Step]) -> Result<()> {
        for step in steps {
            match step {
                Step::Download => self.config.validate_download()?,
                Step::Publish => self.config.validate_publish()?,
                Step::Load => self.config.validate_load()?,
            }
        }
        Ok(())
    }

    /// Run `steps` in order under a fresh `run_id`
    ///
    /// A fatal error in any stage stops the run and is returned; per-object
    /// failures are reported in the summary instead.
    pub async fn run(&self, steps: &[Step]) -> Result<RunSummary> {
        let run_id = Uuid::new_v4();
        let span = info_span!("run", run_id = %run_id);

        async move {
            self.validate(steps)?;

            let mut summary = RunSummary {
                run_id,
                ..RunSummary::default()
            };

            for (i, step) in steps.iter().enumerate() {
                let [heading, rule] = step_banner(i + 1, steps.len(), step.title());
                summary
                    .events
                    .info(step.stage(), EventKind::StepStarted, heading);
                info!("{}", rule);

                match step {
                    Step::Download => {
                        summary.extracted = self.download(&mut summary.events).await?;
                    },
                    Step::Publish => {
                        summary.publish = Some(self.publish(&mut summary.events).await?);
                    },
                    Step::Load => {
                        summary.load = Some(self.load(&mut summary.events).await?);
                    },
                }
            }

            summary.events.info(
                Stage::Pipeline,
                EventKind::Summary,
                if summary.has_failures() {
                    "Pipeline finished with failures"
                } else {
                    "Pipeline finished"
                },
            );
            Ok::<_, IngestError>(summary)
        }
        .instrument(span)
        .await
    }

    async fn download(&self, events: &mut EventLog) -> Result<Vec<PathBuf>> {
        let dataset = &self.config.dataset;
        let settings = &self.config.pipeline;
        let client = DatasetClient::new(dataset);

        let files = client
            .download_to(&dataset.dataset, &settings.local_dir, &settings.file_suffix)
            .await?;

        if files.is_empty() {
            events.warn(
                Stage::Download,
                EventKind::NothingFound,
                format!(
                    "Archive for {} has no {} entries",
                    dataset.dataset, settings.file_suffix
                ),
            );
        }
        for path in &files {
            events.emit(
                PipelineEvent::new(
                    Severity::Info,
                    Stage::Download,
                    EventKind::Extracted,
                    format!("Extracted {}", path.display()),
                )
                .with_object(path.display().to_string()),
            );
        }

        events.info(
            Stage::Download,
            EventKind::Summary,
            format!(
                "Dataset {} extracted into {} ({} files)",
                dataset.dataset,
                settings.local_dir.display(),
                files.len()
            ),
        );
        Ok(files)
    }

    async fn publish(&self, events: &mut EventLog) -> Result<TransferReport> {
        let store = S3Store::connect(&self.config.storage).await?;
        let mut pipeline = self.pipeline(store);

        let report = pipeline.publish(&self.config.pipeline.local_dir).await;
        events.append(pipeline.into_events());
        report
    }

    async fn load(&self, events: &mut EventLog) -> Result<LoadReport> {
        let store = S3Store::connect(&self.config.storage).await?;
        let mut sink = PgDestination::connect(&self.config.database).await?;
        let mut pipeline = self.pipeline(store);

        let report = pipeline.load(&mut sink).await;
        events.append(pipeline.into_events());
        report
    }

    fn pipeline<S: ObjectStore>(&self, store: S) -> Pipeline<S> {
        Pipeline::new(
            store,
            self.mapping.clone(),
            self.config.storage.prefix.clone(),
            self.config.pipeline.clone(),
        )
    }
}
