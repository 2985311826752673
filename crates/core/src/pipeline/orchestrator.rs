use std::sync::Arc;
use std::time::Instant;

use serde_json::json;
use tracing::{error, info};

use crate::domain::contact::SearchCriteria;
use crate::errors::ApplicationError;
use crate::pipeline::batch::BatchRunner;
use crate::pipeline::discovery::DiscoveryStage;
use crate::pipeline::report::{BatchReport, RunKind, RunSummary};
use crate::pipeline::signals::notify_best_effort;
use crate::pipeline::stage::{Stage, StageContext};
use crate::pipeline::stages::{OutreachStage, ResearchStage, SendStage};
use crate::ports::{Notification, Notifier};

/// Per-stage batch sizes for one run.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct BatchLimits {
    pub discovery: u32,
    pub research: u32,
    pub outreach: u32,
    pub sending: u32,
    pub follow_up: u32,
}

impl BatchLimits {
    pub fn standard() -> Self {
        Self { discovery: 50, research: 25, outreach: 25, sending: 40, follow_up: 40 }
    }

    /// Small batches for quick manual runs.
    pub fn fast() -> Self {
        Self { discovery: 10, research: 5, outreach: 5, sending: 5, follow_up: 5 }
    }
}

impl Default for BatchLimits {
    fn default() -> Self {
        Self::standard()
    }
}

/// Runs discovery, research, outreach and the first send in order.
pub struct Orchestrator {
    ctx: StageContext,
    runner: BatchRunner,
    discovery: DiscoveryStage,
    research: Arc<ResearchStage>,
    outreach: Arc<OutreachStage>,
    first_send: Arc<SendStage>,
    notifier: Arc<dyn Notifier>,
    criteria: SearchCriteria,
    limits: BatchLimits,
}

impl Orchestrator {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        ctx: StageContext,
        discovery: DiscoveryStage,
        research: Arc<ResearchStage>,
        outreach: Arc<OutreachStage>,
        first_send: Arc<SendStage>,
        notifier: Arc<dyn Notifier>,
        criteria: SearchCriteria,
        limits: BatchLimits,
    ) -> Self {
        let runner = BatchRunner::new(ctx.clone());
        Self { ctx, runner, discovery, research, outreach, first_send, notifier, criteria, limits }
    }

    pub fn limits(&self) -> BatchLimits {
        self.limits
    }

    pub fn with_limits(mut self, limits: BatchLimits) -> Self {
        self.limits = limits;
        self
    }

    /// One full pass. A stage that fails outright is recorded and the run moves on.
    pub async fn run_once(&self) -> RunSummary {
        let started = Instant::now();
        let mut summary = RunSummary::new(RunKind::Pipeline, self.ctx.clock.now_utc());
        info!(event_name = "pipeline.run.started", "pipeline run started");

        let discovered = self.discovery.discover(&self.criteria, self.limits.discovery).await;
        collect(&mut summary, "discovery", discovered);

        let stages: [(&dyn Stage, u32); 3] = [
            (self.research.as_ref(), self.limits.research),
            (self.outreach.as_ref(), self.limits.outreach),
            (self.first_send.as_ref(), self.limits.sending),
        ];
        for (stage, limit) in stages {
            let report = self.runner.run(stage, limit).await;
            collect(&mut summary, stage.name(), report);
        }

        summary.duration = started.elapsed();
        self.finish(&summary).await;
        summary
    }

    async fn finish(&self, summary: &RunSummary) {
        info!(
            event_name = "pipeline.run.completed",
            processed = summary.processed(),
            successful = summary.successful(),
            failed = summary.failed(),
            stage_errors = summary.stage_errors.len(),
            duration_ms = summary.duration.as_millis() as u64,
            "pipeline run completed"
        );
        self.ctx
            .events
            .system(
                "pipeline_run",
                json!({
                    "processed": summary.processed(),
                    "successful": summary.successful(),
                    "failed": summary.failed(),
                    "stage_errors": summary.stage_errors,
                    "duration_ms": summary.duration.as_millis() as u64,
                }),
                self.ctx.clock.now_utc(),
            )
            .await;
        notify_best_effort(self.notifier.as_ref(), &Notification::RunSummary(summary.clone())).await;
    }
}

pub(crate) fn collect(
    summary: &mut RunSummary,
    stage: &str,
    report: Result<BatchReport, ApplicationError>,
) {
    match report {
        Ok(report) => summary.stages.push(report),
        Err(stage_error) => {
            error!(
                event_name = "pipeline.stage.failed",
                stage,
                error = %stage_error,
                "stage could not run"
            );
            summary.stage_errors.push(format!("{stage}: {stage_error}"));
            summary.stages.push(BatchReport::empty(stage));
        }
    }
}
