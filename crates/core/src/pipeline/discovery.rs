use std::sync::Arc;

use serde_json::json;
use tracing::info;

use crate::domain::contact::SearchCriteria;
use crate::domain::lead::LeadStatus;
use crate::errors::ApplicationError;
use crate::lifecycle::{self, LeadTrigger};
use crate::pipeline::report::BatchReport;
use crate::pipeline::stage::StageContext;
use crate::ports::LeadSource;

/// Pulls contacts from the lead source and inserts the ones not seen before as `scraped`.
pub struct DiscoveryStage {
    ctx: StageContext,
    source: Arc<dyn LeadSource>,
}

impl DiscoveryStage {
    pub fn new(ctx: StageContext, source: Arc<dyn LeadSource>) -> Self {
        Self { ctx, source }
    }

    /// A failed search is a stage-level error. Invalid and duplicate contacts count as skipped.
    pub async fn discover(
        &self,
        criteria: &SearchCriteria,
        limit: u32,
    ) -> Result<BatchReport, ApplicationError> {
        let mut report = BatchReport::empty("discovery");
        if limit == 0 {
            return Ok(report);
        }

        let mut criteria = criteria.clone();
        criteria.max_results = limit;
        let result = self.source.search(&criteria).await?;
        let now = self.ctx.clock.now_utc();

        for contact in result.contacts.into_iter().take(limit as usize) {
            let Some(mut lead) = contact.into_lead(now) else {
                report.record_skip();
                continue;
            };
            lead.status = lifecycle::transition(LeadStatus::New, LeadTrigger::Discovered)?.to;
            if self.ctx.store.insert_if_absent(&lead).await? {
                self.ctx
                    .events
                    .lead(&lead.id, "lead_discovered", json!({ "email": lead.email }), now)
                    .await;
                report.record_success();
            } else {
                report.record_skip();
            }
        }

        info!(
            event_name = "pipeline.discovery.completed",
            total_found = result.total_found,
            inserted = report.successful,
            skipped = report.skipped,
            "discovery completed"
        );
        Ok(report)
    }
}
