use std::sync::Arc;

use async_trait::async_trait;
use chrono::{Duration, TimeZone, Utc};
use outreach_core::clock::{Clock, FixedClock};
use outreach_core::domain::contact::{SearchCriteria, SearchResult};
use outreach_core::domain::lead::{Delivery, EmailSequence, EmailStep, Lead, LeadStatus, TimezoneBucket};
use outreach_core::domain::reply::{InboundReply, ReplyCategory, ReplyClassification, Sentiment};
use outreach_core::errors::IntegrationError;
use outreach_core::events::InMemoryEventSink;
use outreach_core::pipeline::{Pipeline, PipelineDeps, PipelineSettings};
use outreach_core::ports::{
    fallback_sequence, ContentGenerator, LeadSource, MessageSender, Notification, Notifier,
    OutboundEmail, ReplyClassifier, ResearchContext, SentMessage,
};
use outreach_core::store::{InMemoryLeadStore, LeadStore};
use serde_json::{json, Value};

struct Unavailable;

fn unavailable() -> IntegrationError {
    IntegrationError::Rejected("not wired in this test".to_string())
}

#[async_trait]
impl LeadSource for Unavailable {
    async fn search(&self, _criteria: &SearchCriteria) -> Result<SearchResult, IntegrationError> {
        Err(unavailable())
    }
}

#[async_trait]
impl ContentGenerator for Unavailable {
    async fn analyze(&self, _lead: &Lead, _context: &ResearchContext) -> Result<Value, IntegrationError> {
        Err(unavailable())
    }

    async fn draft_sequence(&self, _lead: &Lead, _insights: &Value) -> Result<EmailSequence, IntegrationError> {
        Err(unavailable())
    }
}

#[async_trait]
impl MessageSender for Unavailable {
    async fn send(&self, _email: &OutboundEmail) -> Result<SentMessage, IntegrationError> {
        Err(unavailable())
    }
}

#[async_trait]
impl Notifier for Unavailable {
    async fn post(&self, _notification: &Notification) -> Result<(), IntegrationError> {
        Ok(())
    }
}

struct InterestedClassifier;

#[async_trait]
impl ReplyClassifier for InterestedClassifier {
    async fn classify(&self, _reply: &InboundReply) -> Result<ReplyClassification, IntegrationError> {
        Ok(ReplyClassification {
            category: ReplyCategory::Interested,
            sentiment: Sentiment::Positive,
            summary: Some("wants details".to_string()),
        })
    }
}

/// In-memory pipeline for route tests. Only the reply classifier is functional.
pub struct TestPipeline {
    pub store: InMemoryLeadStore,
    pub events: InMemoryEventSink,
    pub clock: FixedClock,
}

impl TestPipeline {
    pub fn new() -> Self {
        let now = Utc.with_ymd_and_hms(2026, 3, 2, 10, 0, 0).single().expect("timestamp");
        Self {
            store: InMemoryLeadStore::new(),
            events: InMemoryEventSink::default(),
            clock: FixedClock::at(now),
        }
    }

    pub fn pipeline(&self) -> Pipeline {
        let unavailable = Arc::new(Unavailable);
        Pipeline::new(
            PipelineDeps {
                store: Arc::new(self.store.clone()),
                events: Arc::new(self.events.clone()),
                lead_source: unavailable.clone(),
                generator: unavailable.clone(),
                sender: unavailable.clone(),
                classifier: Arc::new(InterestedClassifier),
                notifier: unavailable,
                clock: Arc::new(self.clock.clone()),
            },
            PipelineSettings { senders: vec!["sdr@seller.test".to_string()], ..PipelineSettings::default() },
        )
    }

    fn drafted(&self, email: &str, status: LeadStatus) -> Lead {
        let now = self.clock.now_utc();
        let mut lead = Lead::discovered(email, "Ada Lovelace", now - Duration::days(10));
        lead.status = status;
        lead.research = Some(json!({ "summary": "engines" }));
        lead.researched_at = Some(now - Duration::days(9));
        lead.sequence = Some(fallback_sequence(&lead));
        lead.sender = Some("sdr@seller.test".to_string());
        lead.timezone_bucket = Some(TimezoneBucket::Local);
        lead
    }

    /// A lead that has received its first email.
    pub async fn seed_sent(&self, email: &str) -> Lead {
        let mut lead = self.drafted(email, LeadStatus::Email1Sent);
        lead.deliveries.set(
            EmailStep::First,
            Delivery { sent_at: self.clock.now_utc() - Duration::days(2), message_id: "m-1".to_string() },
        );
        assert!(self.store.insert_if_absent(&lead).await.expect("insert"));
        lead
    }

    pub async fn seed_engaged(&self, email: &str) -> Lead {
        let lead = self.drafted(email, LeadStatus::Engaged);
        assert!(self.store.insert_if_absent(&lead).await.expect("insert"));
        lead
    }
}
