use std::sync::Arc;

use async_trait::async_trait;
use outreach_core::domain::lead::{EmailDraft, EmailSequence, Lead};
use outreach_core::errors::IntegrationError;
use outreach_core::ports::{fallback_insights, fallback_sequence, ContentGenerator, ResearchContext};
use serde_json::Value;
use tracing::warn;

use crate::extract::{extract_json_object, string_field};
use crate::llm::{CompletionRequest, LlmClient};

const RESEARCH_SYSTEM: &str = "You research B2B prospects for a sales team. \
Answer with one JSON object with keys `summary` (string), `pain_points` (array of strings) \
and `hooks` (array of strings). No prose outside the JSON.";

const SEQUENCE_SYSTEM: &str = "You write short, plain-text cold emails. \
Answer with one JSON object: {\"email_1\": {\"subject\", \"body\"}, \"email_2\": {\"body\"}, \
\"email_3\": {\"subject\", \"body\"}}. Email 2 is a reply in the same thread and has no subject. \
Keep each body under 120 words. No prose outside the JSON.";

/// Research and drafting through an [`LlmClient`]. Transport failures are
/// returned for the caller to retry; unusable answers become fallback content.
pub struct LlmContentGenerator {
    client: Arc<dyn LlmClient>,
}

impl LlmContentGenerator {
    pub fn new(client: Arc<dyn LlmClient>) -> Self {
        Self { client }
    }
}

#[async_trait]
impl ContentGenerator for LlmContentGenerator {
    async fn analyze(&self, lead: &Lead, context: &ResearchContext) -> Result<Value, IntegrationError> {
        let request = CompletionRequest::new(RESEARCH_SYSTEM, research_prompt(lead, context))
            .with_temperature(0.2);
        let answer = self.client.complete(&request).await?;

        match extract_json_object(&answer) {
            Some(insights) => Ok(insights),
            None => {
                warn!(
                    event_name = "content.analyze.unparseable",
                    lead_id = %lead.id,
                    "research answer was not JSON; using fallback insights"
                );
                Ok(fallback_insights())
            }
        }
    }

    async fn draft_sequence(&self, lead: &Lead, insights: &Value) -> Result<EmailSequence, IntegrationError> {
        let request = CompletionRequest::new(SEQUENCE_SYSTEM, sequence_prompt(lead, insights))
            .with_max_tokens(1_500);
        let answer = self.client.complete(&request).await?;

        match extract_json_object(&answer).and_then(|value| parse_sequence(&value)) {
            Some(sequence) => Ok(sequence),
            None => {
                warn!(
                    event_name = "content.draft.unparseable",
                    lead_id = %lead.id,
                    "draft answer was incomplete; using fallback sequence"
                );
                Ok(fallback_sequence(lead))
            }
        }
    }
}

fn profile_lines(lead: &Lead) -> String {
    let fields = [
        ("Name", Some(lead.name.as_str())),
        ("Title", lead.title.as_deref()),
        ("Company", lead.company.as_deref()),
        ("Industry", lead.industry.as_deref()),
        ("Seniority", lead.seniority.as_deref()),
        ("Location", lead.location.as_deref()),
        ("Country", lead.country.as_deref()),
    ];
    fields
        .iter()
        .filter_map(|(label, value)| value.map(|value| format!("{label}: {value}")))
        .collect::<Vec<_>>()
        .join("\n")
}

fn research_prompt(lead: &Lead, context: &ResearchContext) -> String {
    let offering = if context.offering.trim().is_empty() {
        "a B2B service"
    } else {
        context.offering.trim()
    };
    format!(
        "We sell: {offering}\n\nProspect:\n{}\n\nWhat is this person likely to care about, \
         and which angles would make a first email relevant to them?",
        profile_lines(lead)
    )
}

fn sequence_prompt(lead: &Lead, insights: &Value) -> String {
    format!(
        "Prospect:\n{}\n\nResearch notes (JSON):\n{insights}\n\nWrite the three-email sequence. \
         Address the prospect by first name ({}).",
        profile_lines(lead),
        lead.first_name()
    )
}

fn parse_sequence(value: &Value) -> Option<EmailSequence> {
    let draft = |key: &str, with_subject: bool| -> Option<EmailDraft> {
        let email = value.get(key)?;
        let subject = if with_subject { Some(string_field(email, "subject")?) } else { None };
        Some(EmailDraft::new(subject, string_field(email, "body")?))
    };
    let sequence = EmailSequence {
        email_1: draft("email_1", true)?,
        email_2: draft("email_2", false)?,
        email_3: draft("email_3", true)?,
    };
    sequence.is_complete().then_some(sequence)
}
