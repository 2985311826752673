//! Error bookkeeping and quarantine of repeatedly failing leads.
//!
//! Quarantine is derived from `error_count`; store queries built with
//! [`QuarantinePolicy::eligible`] exclude quarantined leads.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde_json::json;
use tracing::{info, warn};

use crate::domain::lead::{Lead, LeadId, LeadStatus};
use crate::errors::StoreError;
use crate::events::EventLog;
use crate::store::{LeadQuery, LeadStore};

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct QuarantinePolicy {
    pub threshold: u32,
}

impl Default for QuarantinePolicy {
    fn default() -> Self {
        Self { threshold: 3 }
    }
}

impl QuarantinePolicy {
    pub fn new(threshold: u32) -> Self {
        Self { threshold: threshold.max(1) }
    }

    pub fn is_quarantined(&self, lead: &Lead) -> bool {
        lead.is_quarantined(self.threshold)
    }

    /// Base query for automatic batch selection.
    pub fn eligible(&self, status: LeadStatus, limit: u32) -> LeadQuery {
        LeadQuery::new(status, limit).excluding_quarantined(self.threshold)
    }
}

#[derive(Clone)]
pub struct Quarantine {
    store: Arc<dyn LeadStore>,
    events: EventLog,
    policy: QuarantinePolicy,
}

impl Quarantine {
    pub fn new(store: Arc<dyn LeadStore>, events: EventLog, policy: QuarantinePolicy) -> Self {
        Self { store, events, policy }
    }

    pub fn policy(&self) -> QuarantinePolicy {
        self.policy
    }

    /// Records a failure against the lead and returns its new error count.
    pub async fn record_error(
        &self,
        lead_id: &LeadId,
        reason: &str,
        at: DateTime<Utc>,
    ) -> Result<u32, StoreError> {
        let error_count = self.store.record_error(lead_id, reason, at).await?;
        if error_count == self.policy.threshold {
            warn!(
                event_name = "quarantine.threshold_crossed",
                lead_id = %lead_id,
                error_count,
                reason,
                "lead quarantined"
            );
            self.events
                .lead(
                    lead_id,
                    "lead_quarantined",
                    json!({ "error_count": error_count, "reason": reason }),
                    at,
                )
                .await;
        }
        Ok(error_count)
    }

    pub async fn clear_error(
        &self,
        lead_id: &LeadId,
        reset_to: Option<LeadStatus>,
        at: DateTime<Utc>,
    ) -> Result<Lead, StoreError> {
        let lead = self.store.clear_error(lead_id, reset_to, at).await?;
        info!(
            event_name = "quarantine.cleared",
            lead_id = %lead_id,
            status = %lead.status,
            "lead error count reset"
        );
        self.events
            .lead(
                lead_id,
                "errors_cleared",
                json!({ "reset_to": reset_to.map(|status| status.as_str()) }),
                at,
            )
            .await;
        Ok(lead)
    }

    pub async fn count_quarantined(&self) -> Result<u64, StoreError> {
        self.store.count_quarantined(self.policy.threshold).await
    }

    pub async fn find_with_errors(&self, limit: u32) -> Result<Vec<Lead>, StoreError> {
        self.store.find_with_errors(limit).await
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use chrono::Utc;

    use super::{Quarantine, QuarantinePolicy};
    use crate::domain::lead::{Lead, LeadStatus};
    use crate::events::{EventLog, InMemoryEventSink};
    use crate::store::{InMemoryLeadStore, LeadStore};

    #[tokio::test]
    async fn crossing_threshold_excludes_lead_until_cleared() {
        let store = InMemoryLeadStore::new();
        let sink = InMemoryEventSink::default();
        let quarantine = Quarantine::new(
            Arc::new(store.clone()),
            EventLog::new(Arc::new(sink.clone())),
            QuarantinePolicy::new(2),
        );
        let now = Utc::now();
        let lead = Lead::discovered("a@b.com", "A", now);
        store.insert_if_absent(&lead).await.expect("insert");
        let query = quarantine.policy().eligible(LeadStatus::Scraped, 10);

        assert_eq!(quarantine.record_error(&lead.id, "timeout", now).await.expect("record"), 1);
        assert_eq!(store.select(&query).await.expect("select").len(), 1);

        assert_eq!(quarantine.record_error(&lead.id, "timeout", now).await.expect("record"), 2);
        assert!(store.select(&query).await.expect("select").is_empty());
        assert_eq!(quarantine.count_quarantined().await.expect("count"), 1);
        assert_eq!(sink.event_types(), vec!["lead_quarantined"]);

        let cleared = quarantine
            .clear_error(&lead.id, Some(LeadStatus::Scraped), now)
            .await
            .expect("clear");
        assert_eq!(cleared.error_count, 0);
        assert_eq!(store.select(&query).await.expect("select").len(), 1);
        assert_eq!(quarantine.find_with_errors(10).await.expect("errors").len(), 0);
    }
}
