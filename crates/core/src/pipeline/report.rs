use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Error lines carried in a run summary notification.
pub const MAX_SUMMARY_ERRORS: usize = 10;

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct BatchReport {
    pub stage: String,
    pub successful: u32,
    pub failed: u32,
    pub skipped: u32,
    pub errors: Vec<String>,
}

impl BatchReport {
    pub fn empty(stage: impl Into<String>) -> Self {
        Self { stage: stage.into(), ..Self::default() }
    }

    pub fn total(&self) -> u32 {
        self.successful + self.failed + self.skipped
    }

    pub fn is_noop(&self) -> bool {
        self.total() == 0 && self.errors.is_empty()
    }

    pub fn record_success(&mut self) {
        self.successful += 1;
    }

    pub fn record_skip(&mut self) {
        self.skipped += 1;
    }

    pub fn record_failure(&mut self, lead: &str, message: impl AsRef<str>) {
        self.failed += 1;
        self.errors.push(format!("{}: {lead}: {}", self.stage, message.as_ref()));
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RunKind {
    Pipeline,
    FollowUp,
}

impl RunKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pipeline => "pipeline",
            Self::FollowUp => "follow_up",
        }
    }
}

/// Aggregate of one orchestrator or follow-up run.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct RunSummary {
    pub kind: RunKind,
    pub started_at: DateTime<Utc>,
    pub duration: Duration,
    pub stages: Vec<BatchReport>,
    /// Stage-level failures, i.e. a stage that could not run at all.
    pub stage_errors: Vec<String>,
}

impl RunSummary {
    pub fn new(kind: RunKind, started_at: DateTime<Utc>) -> Self {
        Self { kind, started_at, duration: Duration::ZERO, stages: Vec::new(), stage_errors: Vec::new() }
    }

    pub fn processed(&self) -> u32 {
        self.stages.iter().map(BatchReport::total).sum()
    }

    pub fn successful(&self) -> u32 {
        self.stages.iter().map(|stage| stage.successful).sum()
    }

    pub fn failed(&self) -> u32 {
        self.stages.iter().map(|stage| stage.failed).sum()
    }

    pub fn has_errors(&self) -> bool {
        !self.stage_errors.is_empty() || self.stages.iter().any(|stage| !stage.errors.is_empty())
    }

    /// Stage errors first, then per-lead errors, capped for the operator channel.
    pub fn capped_errors(&self) -> (Vec<String>, usize) {
        let all: Vec<&String> = self
            .stage_errors
            .iter()
            .chain(self.stages.iter().flat_map(|stage| stage.errors.iter()))
            .collect();
        let omitted = all.len().saturating_sub(MAX_SUMMARY_ERRORS);
        (all.into_iter().take(MAX_SUMMARY_ERRORS).cloned().collect(), omitted)
    }
}
