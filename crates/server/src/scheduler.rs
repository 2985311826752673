use std::sync::Arc;
use std::time::Duration;

use outreach_core::config::PipelineConfig;
use outreach_core::pipeline::{Pipeline, RunSummary, Ticker};
use tokio::sync::watch;
use tracing::{info, warn};

/// Drives the main pipeline and the follow-up scheduler on separate tickers.
pub struct Scheduler {
    pipeline: Arc<Pipeline>,
    pipeline_interval: Duration,
    follow_up_interval: Duration,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct TickerRuns {
    pub pipeline: u64,
    pub follow_up: u64,
}

impl Scheduler {
    pub fn new(pipeline: Arc<Pipeline>, pipeline_interval: Duration, follow_up_interval: Duration) -> Self {
        Self { pipeline, pipeline_interval, follow_up_interval }
    }

    pub fn from_config(pipeline: Arc<Pipeline>, config: &PipelineConfig) -> Self {
        Self::new(
            pipeline,
            Duration::from_secs(config.tick_interval_secs),
            Duration::from_secs(config.follow_up_interval_secs),
        )
    }

    /// One pass of every job, pipeline first.
    pub async fn run_once(&self) -> Vec<RunSummary> {
        let pipeline = self.pipeline.run_once().await;
        log_summary(&pipeline);
        let follow_up = self.pipeline.run_follow_ups().await;
        log_summary(&follow_up);
        vec![pipeline, follow_up]
    }

    /// Runs both tickers until `shutdown` flips to true.
    pub async fn run(&self, shutdown: watch::Receiver<bool>) -> TickerRuns {
        let pipeline_ticker = Ticker::new("pipeline", self.pipeline_interval);
        let follow_up_ticker = Ticker::new("follow_up", self.follow_up_interval);

        let pipeline_job = || async {
            log_summary(&self.pipeline.run_once().await);
        };
        let follow_up_job = || async {
            log_summary(&self.pipeline.run_follow_ups().await);
        };

        let (pipeline, follow_up) = tokio::join!(
            pipeline_ticker.run(pipeline_job, shutdown.clone()),
            follow_up_ticker.run(follow_up_job, shutdown),
        );
        TickerRuns { pipeline, follow_up }
    }
}

fn log_summary(summary: &RunSummary) {
    if summary.has_errors() {
        let (errors, omitted) = summary.capped_errors();
        warn!(
            event_name = "scheduler.run.completed_with_errors",
            run = summary.kind.as_str(),
            processed = summary.processed(),
            failed = summary.failed(),
            errors = ?errors,
            omitted,
            "run finished with errors"
        );
    } else {
        info!(
            event_name = "scheduler.run.completed",
            run = summary.kind.as_str(),
            processed = summary.processed(),
            duration_ms = summary.duration.as_millis() as u64,
            "run finished"
        );
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;
    use std::time::Duration;

    use outreach_core::pipeline::RunKind;
    use tokio::sync::watch;

    use super::Scheduler;
    use crate::test_support::TestPipeline;

    #[tokio::test]
    async fn run_once_reports_discovery_failure_and_an_empty_follow_up() {
        let fixture = TestPipeline::new();
        let scheduler =
            Scheduler::new(Arc::new(fixture.pipeline()), Duration::from_secs(600), Duration::from_secs(3600));

        let summaries = scheduler.run_once().await;
        assert_eq!(summaries.len(), 2);
        assert_eq!(summaries[0].kind, RunKind::Pipeline);
        assert!(summaries[0].has_errors(), "lead source is unavailable in the fixture");
        assert_eq!(summaries[1].kind, RunKind::FollowUp);
        assert!(!summaries[1].has_errors());
    }

    #[tokio::test(start_paused = true)]
    async fn tickers_run_until_shutdown() {
        let fixture = TestPipeline::new();
        let scheduler = Arc::new(Scheduler::new(
            Arc::new(fixture.pipeline()),
            Duration::from_secs(60),
            Duration::from_secs(3600),
        ));
        let (shutdown_tx, shutdown_rx) = watch::channel(false);

        let running = {
            let scheduler = scheduler.clone();
            tokio::spawn(async move { scheduler.run(shutdown_rx).await })
        };
        tokio::time::sleep(Duration::from_secs(150)).await;
        shutdown_tx.send(true).expect("shutdown");

        let runs = running.await.expect("join");
        assert_eq!(runs.pipeline, 3);
        assert_eq!(runs.follow_up, 1);
    }
}
