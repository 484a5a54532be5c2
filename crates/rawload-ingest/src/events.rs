//! Structured pipeline events
//!
//! Stages report progress as [`PipelineEvent`]s rather than free-form text.
//! The [`EventLog`] forwards every event to `tracing` and keeps a copy, so
//! callers (and tests) can inspect exactly which loads, skips, and failures
//! a run produced.

use chrono::{DateTime, Utc};
use serde::Serialize;
use std::fmt;
use tracing::{error, info, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    Info,
    Warn,
    Error,
}

/// Pipeline stage an event belongs to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Stage {
    Pipeline,
    Download,
    Publish,
    Load,
}

impl Stage {
    pub fn as_str(&self) -> &'static str {
        match self {
            Stage::Pipeline => "pipeline",
            Stage::Download => "download",
            Stage::Publish => "publish",
            Stage::Load => "load",
        }
    }
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// What happened
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum EventKind {
    /// Banner line announcing a stage
    StepStarted,
    /// General progress (staging area created, connection closed, ...)
    Progress,
    /// The enumerator found no matching source objects
    NothingFound,
    Extracted,
    Published,
    Downloaded,
    Loaded,
    SkippedUnmapped,
    SkippedEmpty,
    Failed,
    /// The failure policy stopped the batch early
    Aborted,
    Summary,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PipelineEvent {
    pub at: DateTime<Utc>,
    pub severity: Severity,
    pub stage: Stage,
    pub kind: EventKind,
    /// Object key or filename the event concerns
    pub object: Option<String>,
    pub message: String,
}

impl PipelineEvent {
    pub fn new(severity: Severity, stage: Stage, kind: EventKind, message: impl Into<String>) -> Self {
        Self {
            at: Utc::now(),
            severity,
            stage,
            kind,
            object: None,
            message: message.into(),
        }
    }

    pub fn with_object(mut self, object: impl Into<String>) -> Self {
        self.object = Some(object.into());
        self
    }
}

/// Ordered record of everything a run reported
#[derive(Debug, Default)]
pub struct EventLog {
    events: Vec<PipelineEvent>,
}

impl EventLog {
    pub fn new() -> Self {
        Self::default()
    }

    /// Log `event` through tracing and keep it
    pub fn emit(&mut self, event: PipelineEvent) {
        let object = event.object.as_deref().unwrap_or("-");
        match event.severity {
            Severity::Info => info!(
                stage = %event.stage,
                kind = ?event.kind,
                object = %object,
                "{}",
                event.message
            ),
            Severity::Warn => warn!(
                stage = %event.stage,
                kind = ?event.kind,
                object = %object,
                "{}",
                event.message
            ),
            Severity::Error => error!(
                stage = %event.stage,
                kind = ?event.kind,
                object = %object,
                "{}",
                event.message
            ),
        }
        self.events.push(event);
    }

    pub fn info(&mut self, stage: Stage, kind: EventKind, message: impl Into<String>) {
        self.emit(PipelineEvent::new(Severity::Info, stage, kind, message));
    }

    pub fn warn(&mut self, stage: Stage, kind: EventKind, message: impl Into<String>) {
        self.emit(PipelineEvent::new(Severity::Warn, stage, kind, message));
    }

    /// Move the events of `other` to the end of this log without logging them again
    pub fn append(&mut self, other: EventLog) {
        self.events.extend(other.events);
    }

    pub fn events(&self) -> &[PipelineEvent] {
        &self.events
    }

    pub fn of_kind(&self, kind: EventKind) -> impl Iterator<Item = &PipelineEvent> {
        self.events.iter().filter(move |e| e.kind == kind)
    }

    pub fn count(&self, kind: EventKind) -> usize {
        self.of_kind(kind).count()
    }

    pub fn has_errors(&self) -> bool {
        self.events.iter().any(|e| e.severity == Severity::Error)
    }
}

/// The two banner lines printed before a stage
pub fn step_banner(step: usize, total: usize, title: &str) -> [String; 2] {
    let heading = format!("Step {}/{}: {}", step, total, title);
    let rule = "=".repeat(heading.len());
    [heading, rule]
}
