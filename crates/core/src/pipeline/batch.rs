//! Applies a stage to a bounded batch of eligible leads.

use std::any::Any;
use std::panic::AssertUnwindSafe;

use futures::future::join_all;
use futures::FutureExt;
use tracing::{error, info};

use crate::domain::lead::Lead;
use crate::errors::{ApplicationError, StoreError};
use crate::pipeline::outcome::StageOutcome;
use crate::pipeline::report::BatchReport;
use crate::pipeline::stage::{Stage, StageContext};

enum LeadResult {
    Succeeded,
    Skipped,
    Failed(String),
}

#[derive(Clone)]
pub struct BatchRunner {
    ctx: StageContext,
}

impl BatchRunner {
    pub fn new(ctx: StageContext) -> Self {
        Self { ctx }
    }

    /// Runs `stage` over up to `limit` eligible leads. Per-lead failures, including
    /// panics, are counted and never abort the batch; only selection errors escape.
    pub async fn run(&self, stage: &dyn Stage, limit: u32) -> Result<BatchReport, ApplicationError> {
        let now = self.ctx.clock.now_utc();
        let leads = stage.eligible(limit, now).await?;
        let mut report = BatchReport::empty(stage.name());
        if leads.is_empty() {
            return Ok(report);
        }

        let pacing = stage.pacing();
        info!(
            event_name = "pipeline.batch.started",
            stage = stage.name(),
            eligible = leads.len(),
            concurrency = pacing.concurrency,
            "batch started"
        );

        if pacing.concurrency <= 1 {
            for (index, lead) in leads.into_iter().enumerate() {
                if index > 0 && !pacing.lead_delay.is_zero() {
                    tokio::time::sleep(pacing.lead_delay).await;
                }
                let email = lead.email.clone();
                let result = self.process_one(stage, lead).await;
                tally(&mut report, &email, result);
            }
        } else {
            for (index, chunk) in leads.chunks(pacing.concurrency).enumerate() {
                if index > 0 && !pacing.chunk_pause.is_zero() {
                    tokio::time::sleep(pacing.chunk_pause).await;
                }
                let results =
                    join_all(chunk.iter().cloned().map(|lead| self.process_one(stage, lead))).await;
                for (lead, result) in chunk.iter().zip(results) {
                    tally(&mut report, &lead.email, result);
                }
            }
        }

        info!(
            event_name = "pipeline.batch.completed",
            stage = stage.name(),
            successful = report.successful,
            failed = report.failed,
            skipped = report.skipped,
            "batch completed"
        );
        Ok(report)
    }

    /// Runs `stage` for a single lead, e.g. from an operator command.
    pub async fn run_single(
        &self,
        stage: &dyn Stage,
        lead: Lead,
    ) -> Result<StageOutcome, ApplicationError> {
        let now = self.ctx.clock.now_utc();
        stage.process(lead, now).await
    }

    async fn process_one(&self, stage: &dyn Stage, lead: Lead) -> LeadResult {
        let now = self.ctx.clock.now_utc();
        let attempt = AssertUnwindSafe(stage.process(lead.clone(), now)).catch_unwind().await;
        let message = match attempt {
            Ok(Ok(StageOutcome::Advanced(_))) => return LeadResult::Succeeded,
            Ok(Ok(StageOutcome::Skipped(_))) => return LeadResult::Skipped,
            Ok(Ok(StageOutcome::Rejected(precondition))) => {
                return LeadResult::Failed(precondition.to_string())
            }
            Ok(Ok(StageOutcome::Failed(message))) => return LeadResult::Failed(message),
            Ok(Err(ApplicationError::Persistence(StoreError::Conflict { .. }))) => {
                return LeadResult::Skipped
            }
            Ok(Err(error)) => error.to_string(),
            Err(panic) => format!("panicked: {}", panic_message(panic.as_ref())),
        };

        error!(
            event_name = "pipeline.lead.exception",
            stage = stage.name(),
            lead_id = %lead.id,
            error = %message,
            "unexpected error while processing lead"
        );
        self.ctx.fail(stage.name(), &lead, &message, now).await;
        LeadResult::Failed(message)
    }
}

fn tally(report: &mut BatchReport, email: &str, result: LeadResult) {
    match result {
        LeadResult::Succeeded => report.record_success(),
        LeadResult::Skipped => report.record_skip(),
        LeadResult::Failed(message) => report.record_failure(email, message),
    }
}

fn panic_message(panic: &(dyn Any + Send)) -> String {
    if let Some(message) = panic.downcast_ref::<&str>() {
        (*message).to_owned()
    } else if let Some(message) = panic.downcast_ref::<String>() {
        message.clone()
    } else {
        "unknown panic".to_owned()
    }
}
