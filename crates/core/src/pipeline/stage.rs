use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde_json::{json, Value};
use tracing::{info, warn};

use crate::clock::Clock;
use crate::domain::lead::{Lead, LeadStatus};
use crate::errors::{ApplicationError, PreconditionError, StoreError};
use crate::events::EventLog;
use crate::lifecycle::{self, LeadTrigger};
use crate::pipeline::outcome::StageOutcome;
use crate::quarantine::Quarantine;
use crate::store::LeadStore;

/// Rate-limit settings for a batch.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Pacing {
    /// Pause between consecutive leads when processing one at a time.
    pub lead_delay: Duration,
    /// Leads in flight at once. `1` means strictly sequential.
    pub concurrency: usize,
    /// Pause between concurrent chunks.
    pub chunk_pause: Duration,
}

impl Pacing {
    pub fn sequential(lead_delay: Duration) -> Self {
        Self { lead_delay, concurrency: 1, chunk_pause: Duration::ZERO }
    }

    pub fn fan_out(concurrency: usize, chunk_pause: Duration) -> Self {
        Self { lead_delay: Duration::ZERO, concurrency: concurrency.max(1), chunk_pause }
    }
}

impl Default for Pacing {
    fn default() -> Self {
        Self::sequential(Duration::from_millis(500))
    }
}

/// One pipeline step over leads in a single entry status.
#[async_trait]
pub trait Stage: Send + Sync {
    fn name(&self) -> &'static str;

    fn pacing(&self) -> Pacing;

    /// Leads this stage would pick up right now, oldest first.
    async fn eligible(&self, limit: u32, now: DateTime<Utc>) -> Result<Vec<Lead>, StoreError>;

    async fn process(&self, lead: Lead, now: DateTime<Utc>) -> Result<StageOutcome, ApplicationError>;
}

/// Shared collaborators every stage needs.
#[derive(Clone)]
pub struct StageContext {
    pub store: Arc<dyn LeadStore>,
    pub events: EventLog,
    pub quarantine: Quarantine,
    pub clock: Arc<dyn Clock>,
}

impl StageContext {
    pub fn threshold(&self) -> u32 {
        self.quarantine.policy().threshold
    }

    /// Rejects leads that are quarantined or not in `expected`.
    pub fn check_entry(&self, lead: &Lead, expected: LeadStatus) -> Option<StageOutcome> {
        if lead.status != expected {
            return Some(StageOutcome::Rejected(PreconditionError::WrongStatus {
                expected,
                actual: lead.status,
            }));
        }
        if lead.is_quarantined(self.threshold()) {
            return Some(StageOutcome::Rejected(PreconditionError::Quarantined {
                error_count: lead.error_count,
            }));
        }
        None
    }

    /// Applies `trigger`, persists the lead with an optimistic version check and writes
    /// `event_type`. A lost race is reported as skipped.
    pub async fn commit(
        &self,
        lead: Lead,
        trigger: LeadTrigger,
        event_type: &str,
        data: Value,
        now: DateTime<Utc>,
    ) -> Result<StageOutcome, ApplicationError> {
        match self.try_commit(lead, trigger, event_type, data, now).await {
            Err(ApplicationError::Persistence(StoreError::Conflict { lead_id })) => {
                info!(
                    event_name = "pipeline.lead.claim_lost",
                    lead_id = %lead_id,
                    trigger = %trigger.name(),
                    "lead changed concurrently, leaving it to the other worker"
                );
                Ok(StageOutcome::Skipped("lead was modified concurrently".to_owned()))
            }
            other => other,
        }
    }

    /// Like [`StageContext::commit`], but a lost race surfaces as `StoreError::Conflict`.
    pub async fn try_commit(
        &self,
        mut lead: Lead,
        trigger: LeadTrigger,
        event_type: &str,
        data: Value,
        now: DateTime<Utc>,
    ) -> Result<StageOutcome, ApplicationError> {
        let transition = match lifecycle::apply(&mut lead, trigger) {
            Ok(transition) => transition,
            Err(error) => return Ok(StageOutcome::Rejected(PreconditionError::Transition(error))),
        };
        lead.check_consistency()?;
        lead.updated_at = now;

        let stored = self.store.update(&lead).await?;

        info!(
            event_name = "pipeline.lead.transitioned",
            lead_id = %stored.id,
            from = %transition.from,
            to = %transition.to,
            trigger = %trigger.name(),
            "lead transitioned"
        );
        self.events.lead(&stored.id, event_type, data, now).await;
        Ok(StageOutcome::Advanced(stored))
    }

    /// Records a failure against the lead and writes `<stage>_failed`.
    pub async fn fail(&self, stage: &str, lead: &Lead, error: &str, now: DateTime<Utc>) -> StageOutcome {
        warn!(
            event_name = "pipeline.lead.failed",
            stage,
            lead_id = %lead.id,
            error,
            "stage failed for lead"
        );
        let error_count = match self.quarantine.record_error(&lead.id, error, now).await {
            Ok(count) => Some(count),
            Err(store_error) => {
                warn!(
                    event_name = "pipeline.lead.record_error_failed",
                    stage,
                    lead_id = %lead.id,
                    error = %store_error,
                    "could not record lead error"
                );
                None
            }
        };
        self.events
            .lead(
                &lead.id,
                &format!("{stage}_failed"),
                json!({ "error": error, "error_count": error_count }),
                now,
            )
            .await;
        StageOutcome::Failed(error.to_owned())
    }
}
