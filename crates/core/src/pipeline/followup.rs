use std::sync::Arc;
use std::time::Instant;

use serde_json::json;
use tracing::{debug, info};

use crate::pipeline::batch::BatchRunner;
use crate::pipeline::orchestrator::collect;
use crate::pipeline::report::{RunKind, RunSummary};
use crate::pipeline::signals::notify_best_effort;
use crate::pipeline::stage::{Stage, StageContext};
use crate::pipeline::stages::SendStage;
use crate::ports::{Notification, Notifier};

/// Sends emails 2 and 3 once the previous email is older than the configured delay.
pub struct FollowUpScheduler {
    ctx: StageContext,
    runner: BatchRunner,
    second: Arc<SendStage>,
    third: Arc<SendStage>,
    notifier: Arc<dyn Notifier>,
    limit: u32,
}

impl FollowUpScheduler {
    pub fn new(
        ctx: StageContext,
        second: Arc<SendStage>,
        third: Arc<SendStage>,
        notifier: Arc<dyn Notifier>,
        limit: u32,
    ) -> Self {
        let runner = BatchRunner::new(ctx.clone());
        Self { ctx, runner, second, third, notifier, limit }
    }

    pub fn with_limit(mut self, limit: u32) -> Self {
        self.limit = limit;
        self
    }

    /// Runs both follow-up steps. Nothing is logged to the event table or the operator
    /// channel when no lead was eligible.
    pub async fn run_once(&self) -> RunSummary {
        let started = Instant::now();
        let mut summary = RunSummary::new(RunKind::FollowUp, self.ctx.clock.now_utc());

        for stage in [self.second.as_ref(), self.third.as_ref()] {
            let report = self.runner.run(stage, self.limit).await;
            collect(&mut summary, stage.name(), report);
        }
        summary.duration = started.elapsed();

        if summary.processed() == 0 && summary.stage_errors.is_empty() {
            debug!(event_name = "pipeline.follow_up.idle", "no follow-ups due");
            return summary;
        }

        info!(
            event_name = "pipeline.follow_up.completed",
            processed = summary.processed(),
            successful = summary.successful(),
            failed = summary.failed(),
            "follow-up run completed"
        );
        self.ctx
            .events
            .system(
                "follow_up_run",
                json!({
                    "processed": summary.processed(),
                    "successful": summary.successful(),
                    "failed": summary.failed(),
                }),
                self.ctx.clock.now_utc(),
            )
            .await;
        notify_best_effort(self.notifier.as_ref(), &Notification::RunSummary(summary.clone())).await;
        summary
    }
}
