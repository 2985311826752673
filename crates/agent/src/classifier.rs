use std::sync::Arc;

use async_trait::async_trait;
use outreach_core::domain::reply::{InboundReply, ReplyCategory, ReplyClassification, Sentiment};
use outreach_core::errors::IntegrationError;
use outreach_core::ports::ReplyClassifier;
use tracing::{debug, warn};

use crate::extract::{extract_json_object, string_field};
use crate::llm::{CompletionRequest, LlmClient};

const CLASSIFY_SYSTEM: &str = "You triage replies to sales emails. Answer with one JSON object \
with keys `category` (one of interested, question, meeting_request, not_now, not_interested, \
unsubscribe, out_of_office, bounce), `sentiment` (positive, neutral or negative) and `summary` \
(one sentence). No prose outside the JSON.";

const UNSUBSCRIBE_PHRASES: &[&str] = &[
    "unsubscribe",
    "remove me",
    "take me off",
    "stop emailing",
    "do not contact",
    "don't contact",
    "opt out",
];

const OUT_OF_OFFICE_PHRASES: &[&str] = &[
    "out of office",
    "out of the office",
    "on vacation",
    "on holiday",
    "on leave",
    "away until",
    "automatic reply",
    "auto-reply",
    "autoreply",
];

const BOUNCE_PHRASES: &[&str] = &[
    "delivery status notification",
    "undeliverable",
    "mail delivery failed",
    "address not found",
    "mailbox unavailable",
];

/// Unambiguous replies that never need a model: opt-outs, auto-replies and bounces.
pub fn keyword_classification(reply: &InboundReply) -> Option<ReplyClassification> {
    let text = format!("{}\n{}", reply.subject, reply.body).to_lowercase();
    let contains_any = |phrases: &[&str]| phrases.iter().any(|phrase| text.contains(phrase));

    let (category, sentiment) = if contains_any(BOUNCE_PHRASES) {
        (ReplyCategory::Bounce, Sentiment::Neutral)
    } else if contains_any(UNSUBSCRIBE_PHRASES) {
        (ReplyCategory::Unsubscribe, Sentiment::Negative)
    } else if contains_any(OUT_OF_OFFICE_PHRASES) {
        (ReplyCategory::OutOfOffice, Sentiment::Neutral)
    } else {
        return None;
    };
    Some(ReplyClassification { category, sentiment, summary: None })
}

/// Best guess when the model is unavailable. Ambiguous replies land on
/// `question` so a human reads them.
fn keyword_fallback(reply: &InboundReply) -> ReplyClassification {
    if let Some(classification) = keyword_classification(reply) {
        return classification;
    }
    let text = format!("{}\n{}", reply.subject, reply.body).to_lowercase();
    let (category, sentiment) = if ["not interested", "no thanks", "no thank you"]
        .iter()
        .any(|phrase| text.contains(phrase))
    {
        (ReplyCategory::NotInterested, Sentiment::Negative)
    } else if ["calendar", "book a", "schedule", "call next", "meet"]
        .iter()
        .any(|phrase| text.contains(phrase))
    {
        (ReplyCategory::MeetingRequest, Sentiment::Positive)
    } else if ["next quarter", "not right now", "later this year", "circle back"]
        .iter()
        .any(|phrase| text.contains(phrase))
    {
        (ReplyCategory::NotNow, Sentiment::Neutral)
    } else if ["interested", "sounds good", "tell me more"].iter().any(|phrase| text.contains(phrase))
    {
        (ReplyCategory::Interested, Sentiment::Positive)
    } else {
        (ReplyCategory::Question, Sentiment::Neutral)
    };
    ReplyClassification { category, sentiment, summary: None }
}

pub struct LlmReplyClassifier {
    client: Arc<dyn LlmClient>,
}

impl LlmReplyClassifier {
    pub fn new(client: Arc<dyn LlmClient>) -> Self {
        Self { client }
    }

    async fn ask_model(&self, reply: &InboundReply) -> Result<ReplyClassification, IntegrationError> {
        let prompt = format!("Subject: {}\n\n{}", reply.subject, reply.body);
        let request = CompletionRequest::new(CLASSIFY_SYSTEM, prompt)
            .with_max_tokens(300)
            .with_temperature(0.0);
        let answer = self.client.complete(&request).await?;

        let value = extract_json_object(&answer).ok_or_else(|| {
            IntegrationError::InvalidResponse("classification answer was not JSON".to_string())
        })?;
        let category = string_field(&value, "category")
            .and_then(|raw| ReplyCategory::parse(&raw))
            .ok_or_else(|| {
                IntegrationError::InvalidResponse(format!("unknown reply category in {value}"))
            })?;
        let sentiment = string_field(&value, "sentiment")
            .and_then(|raw| Sentiment::parse(&raw))
            .unwrap_or(Sentiment::Neutral);

        Ok(ReplyClassification { category, sentiment, summary: string_field(&value, "summary") })
    }
}

#[async_trait]
impl ReplyClassifier for LlmReplyClassifier {
    async fn classify(&self, reply: &InboundReply) -> Result<ReplyClassification, IntegrationError> {
        if let Some(classification) = keyword_classification(reply) {
            debug!(
                event_name = "classifier.keyword_match",
                category = classification.category.as_str(),
                "reply classified without the model"
            );
            return Ok(classification);
        }

        match self.ask_model(reply).await {
            Ok(classification) => Ok(classification),
            Err(error) => {
                warn!(
                    event_name = "classifier.model_failed",
                    error = %error,
                    "falling back to keyword classification"
                );
                Ok(keyword_fallback(reply))
            }
        }
    }
}
