//! Interfaces of the external collaborators the pipeline drives.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

use crate::domain::contact::{SearchCriteria, SearchResult};
use crate::domain::lead::{EmailDraft, EmailSequence, Lead};
use crate::domain::reply::{InboundReply, ReplyCategory, ReplyClassification};
use crate::errors::IntegrationError;
use crate::pipeline::report::RunSummary;

#[async_trait]
pub trait LeadSource: Send + Sync {
    async fn search(&self, criteria: &SearchCriteria) -> Result<SearchResult, IntegrationError>;
}

/// What the operator sells; handed to research so insights are relevant to the pitch.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResearchContext {
    pub offering: String,
}

#[async_trait]
pub trait ContentGenerator: Send + Sync {
    async fn analyze(&self, lead: &Lead, context: &ResearchContext) -> Result<Value, IntegrationError>;

    async fn draft_sequence(&self, lead: &Lead, insights: &Value) -> Result<EmailSequence, IntegrationError>;
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct OutboundEmail {
    pub to: String,
    pub from: String,
    pub reply_to: Option<String>,
    pub subject: String,
    pub body: String,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct SentMessage {
    pub message_id: String,
}

#[async_trait]
pub trait MessageSender: Send + Sync {
    async fn send(&self, email: &OutboundEmail) -> Result<SentMessage, IntegrationError>;
}

#[async_trait]
pub trait ReplyClassifier: Send + Sync {
    async fn classify(&self, reply: &InboundReply) -> Result<ReplyClassification, IntegrationError>;
}

#[derive(Clone, Debug, PartialEq)]
pub enum Notification {
    RunSummary(RunSummary),
    ReplyReceived {
        email: String,
        name: String,
        company: Option<String>,
        category: ReplyCategory,
        summary: Option<String>,
    },
    MeetingBooked {
        email: String,
        name: String,
        company: Option<String>,
        scheduled_at: DateTime<Utc>,
    },
}

/// Operator channel. Callers treat delivery as best effort.
#[async_trait]
pub trait Notifier: Send + Sync {
    async fn post(&self, notification: &Notification) -> Result<(), IntegrationError>;
}

/// Insights used when the generator answers with something unusable.
pub fn fallback_insights() -> Value {
    json!({ "summary": null, "pain_points": [], "hooks": [], "fallback": true })
}

/// One-line drafts used when the generator answers with something unusable.
pub fn fallback_sequence(lead: &Lead) -> EmailSequence {
    let first_name = lead.first_name();
    let company = lead.company.as_deref().unwrap_or("your team");
    EmailSequence {
        email_1: EmailDraft::new(
            Some(format!("Quick question for {company}")),
            format!("Hi {first_name}, would a short call about how {company} handles outreach be useful?"),
        ),
        email_2: EmailDraft::new(None, format!("Hi {first_name}, just bumping this up in case it got buried.")),
        email_3: EmailDraft::new(
            Some("Closing the loop".to_owned()),
            format!("Hi {first_name}, I will leave it here. Reply any time if the timing improves."),
        ),
    }
}
