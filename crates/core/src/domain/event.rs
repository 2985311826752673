use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::domain::lead::LeadId;

/// Immutable audit record. `lead_id` is `None` for system-level events such as run summaries.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct PipelineEvent {
    pub lead_id: Option<LeadId>,
    pub event_type: String,
    pub event_data: Value,
    pub created_at: DateTime<Utc>,
}

impl PipelineEvent {
    pub fn for_lead(
        lead_id: &LeadId,
        event_type: impl Into<String>,
        event_data: Value,
        created_at: DateTime<Utc>,
    ) -> Self {
        Self { lead_id: Some(lead_id.clone()), event_type: event_type.into(), event_data, created_at }
    }

    pub fn system(event_type: impl Into<String>, event_data: Value, created_at: DateTime<Utc>) -> Self {
        Self { lead_id: None, event_type: event_type.into(), event_data, created_at }
    }
}
