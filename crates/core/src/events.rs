//! Append-only event log.
//!
//! Writes are attempted before the owning operation returns, but a failed write
//! never fails the operation: [`EventLog`] logs the failure and moves on.

use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde_json::Value;
use tracing::warn;

use crate::domain::event::PipelineEvent;
use crate::domain::lead::LeadId;
use crate::errors::StoreError;

#[async_trait]
pub trait EventSink: Send + Sync {
    async fn append(&self, event: &PipelineEvent) -> Result<(), StoreError>;
}

#[derive(Clone, Default)]
pub struct InMemoryEventSink {
    events: Arc<Mutex<Vec<PipelineEvent>>>,
}

impl InMemoryEventSink {
    pub fn events(&self) -> Vec<PipelineEvent> {
        match self.events.lock() {
            Ok(events) => events.clone(),
            Err(poisoned) => poisoned.into_inner().clone(),
        }
    }

    pub fn event_types(&self) -> Vec<String> {
        self.events().into_iter().map(|event| event.event_type).collect()
    }
}

#[async_trait]
impl EventSink for InMemoryEventSink {
    async fn append(&self, event: &PipelineEvent) -> Result<(), StoreError> {
        match self.events.lock() {
            Ok(mut events) => events.push(event.clone()),
            Err(poisoned) => poisoned.into_inner().push(event.clone()),
        }
        Ok(())
    }
}

#[derive(Clone)]
pub struct EventLog {
    sink: Arc<dyn EventSink>,
}

impl EventLog {
    pub fn new(sink: Arc<dyn EventSink>) -> Self {
        Self { sink }
    }

    pub async fn record(&self, event: PipelineEvent) {
        if let Err(error) = self.sink.append(&event).await {
            warn!(
                event_name = "events.append_failed",
                event_type = %event.event_type,
                lead_id = event.lead_id.as_ref().map(|id| id.0.as_str()).unwrap_or("-"),
                error = %error,
                "dropping pipeline event"
            );
        }
    }

    pub async fn lead(&self, lead_id: &LeadId, event_type: &str, data: Value, at: DateTime<Utc>) {
        self.record(PipelineEvent::for_lead(lead_id, event_type, data, at)).await;
    }

    pub async fn system(&self, event_type: &str, data: Value, at: DateTime<Utc>) {
        self.record(PipelineEvent::system(event_type, data, at)).await;
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use async_trait::async_trait;
    use chrono::Utc;
    use serde_json::json;

    use super::{EventLog, EventSink, InMemoryEventSink};
    use crate::domain::event::PipelineEvent;
    use crate::domain::lead::LeadId;
    use crate::errors::StoreError;

    struct BrokenSink;

    #[async_trait]
    impl EventSink for BrokenSink {
        async fn append(&self, _event: &PipelineEvent) -> Result<(), StoreError> {
            Err(StoreError::Backend("disk full".to_owned()))
        }
    }

    #[tokio::test]
    async fn records_lead_and_system_events_in_order() {
        let sink = InMemoryEventSink::default();
        let log = EventLog::new(Arc::new(sink.clone()));
        let lead_id = LeadId("lead-1".to_owned());

        log.lead(&lead_id, "research_completed", json!({"insights": 3}), Utc::now()).await;
        log.system("pipeline_run", json!({"successful": 1}), Utc::now()).await;

        let events = sink.events();
        assert_eq!(sink.event_types(), vec!["research_completed", "pipeline_run"]);
        assert_eq!(events[0].lead_id, Some(lead_id));
        assert_eq!(events[1].lead_id, None);
    }

    #[tokio::test]
    async fn failing_sink_is_swallowed() {
        let log = EventLog::new(Arc::new(BrokenSink));
        log.system("pipeline_run", json!({}), Utc::now()).await;
    }
}
