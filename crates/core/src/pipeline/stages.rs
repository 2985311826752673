//! Research, outreach generation and sending stages.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde_json::json;

use crate::domain::lead::{Delivery, EmailStep, Lead, LeadStatus, TimezoneBucket};
use crate::errors::{ApplicationError, PreconditionError, StoreError};
use crate::lifecycle::LeadTrigger;
use crate::pipeline::outcome::StageOutcome;
use crate::pipeline::rotation::SenderRotation;
use crate::pipeline::stage::{Pacing, Stage, StageContext};
use crate::ports::{ContentGenerator, MessageSender, OutboundEmail, ResearchContext};
use crate::retry::{with_retry, RetryPolicy};
use crate::window::SendingWindow;

pub struct ResearchStage {
    ctx: StageContext,
    generator: Arc<dyn ContentGenerator>,
    context: ResearchContext,
    retry: RetryPolicy,
    pacing: Pacing,
}

impl ResearchStage {
    pub fn new(
        ctx: StageContext,
        generator: Arc<dyn ContentGenerator>,
        context: ResearchContext,
        pacing: Pacing,
    ) -> Self {
        Self { ctx, generator, context, retry: RetryPolicy::llm_analysis(), pacing }
    }

    pub fn with_retry_policy(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }
}

#[async_trait]
impl Stage for ResearchStage {
    fn name(&self) -> &'static str {
        "research"
    }

    fn pacing(&self) -> Pacing {
        self.pacing
    }

    async fn eligible(&self, limit: u32, _now: DateTime<Utc>) -> Result<Vec<Lead>, StoreError> {
        let query = self.ctx.quarantine.policy().eligible(LeadStatus::Scraped, limit);
        self.ctx.store.select(&query).await
    }

    async fn process(&self, lead: Lead, now: DateTime<Utc>) -> Result<StageOutcome, ApplicationError> {
        if let Some(rejected) = self.ctx.check_entry(&lead, LeadStatus::Scraped) {
            return Ok(rejected);
        }

        let generator = &self.generator;
        let context = &self.context;
        let subject = &lead;
        let analyzed = with_retry(&self.retry, "content.analyze", move || async move {
            generator.analyze(subject, context).await
        })
        .await;
        let insights = match analyzed {
            Ok(insights) => insights,
            Err(error) => return Ok(self.ctx.fail(self.name(), &lead, &error.to_string(), now).await),
        };

        let mut next = lead;
        next.research = Some(insights);
        next.researched_at = Some(now);
        self.ctx
            .commit(next, LeadTrigger::ResearchCompleted, "research_completed", json!({}), now)
            .await
    }
}

pub struct OutreachStage {
    ctx: StageContext,
    generator: Arc<dyn ContentGenerator>,
    senders: SenderRotation,
    retry: RetryPolicy,
    pacing: Pacing,
}

impl OutreachStage {
    pub fn new(
        ctx: StageContext,
        generator: Arc<dyn ContentGenerator>,
        senders: SenderRotation,
        pacing: Pacing,
    ) -> Self {
        Self { ctx, generator, senders, retry: RetryPolicy::llm_analysis(), pacing }
    }

    pub fn with_retry_policy(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }
}

#[async_trait]
impl Stage for OutreachStage {
    fn name(&self) -> &'static str {
        "outreach"
    }

    fn pacing(&self) -> Pacing {
        self.pacing
    }

    async fn eligible(&self, limit: u32, _now: DateTime<Utc>) -> Result<Vec<Lead>, StoreError> {
        let query = self.ctx.quarantine.policy().eligible(LeadStatus::Researched, limit);
        self.ctx.store.select(&query).await
    }

    async fn process(&self, lead: Lead, now: DateTime<Utc>) -> Result<StageOutcome, ApplicationError> {
        if let Some(rejected) = self.ctx.check_entry(&lead, LeadStatus::Researched) {
            return Ok(rejected);
        }
        let Some(insights) = lead.research.as_ref().filter(|_| lead.has_research()) else {
            return Ok(StageOutcome::Rejected(PreconditionError::MissingContent(
                "research insights".to_owned(),
            )));
        };
        if self.senders.is_empty() {
            return Ok(StageOutcome::Rejected(PreconditionError::MissingContent(
                "a sender identity".to_owned(),
            )));
        }

        let generator = &self.generator;
        let subject = &lead;
        let drafted = with_retry(&self.retry, "content.draft_sequence", move || async move {
            generator.draft_sequence(subject, insights).await
        })
        .await;
        let sequence = match drafted {
            Ok(sequence) if !sequence.email_1.is_empty() => sequence,
            Ok(_) => {
                return Ok(self.ctx.fail(self.name(), &lead, "generator returned an empty email 1", now).await)
            }
            Err(error) => return Ok(self.ctx.fail(self.name(), &lead, &error.to_string(), now).await),
        };

        // Only a usable draft takes a turn in the rotation.
        let Some(sender) = self.senders.next_sender() else {
            return Ok(StageOutcome::Rejected(PreconditionError::MissingContent(
                "a sender identity".to_owned(),
            )));
        };
        let bucket = TimezoneBucket::from_country(lead.country.as_deref().or(lead.location.as_deref()));
        let data = json!({ "sender": sender, "timezone_bucket": bucket.as_str() });
        let mut next = lead;
        next.sequence = Some(sequence);
        next.sender = Some(sender);
        next.timezone_bucket = Some(bucket);
        self.ctx.commit(next, LeadTrigger::SequenceDrafted, "sequence_drafted", data, now).await
    }
}

/// Delivers one email of the sequence. Steps 2 and 3 carry a follow-up delay measured
/// from the previous step's delivery.
pub struct SendStage {
    ctx: StageContext,
    sender: Arc<dyn MessageSender>,
    step: EmailStep,
    window: SendingWindow,
    follow_up_delay: Option<chrono::Duration>,
    reply_to: Option<String>,
    retry: RetryPolicy,
    pacing: Pacing,
}

impl SendStage {
    pub fn new(
        ctx: StageContext,
        sender: Arc<dyn MessageSender>,
        step: EmailStep,
        window: SendingWindow,
    ) -> Self {
        Self {
            ctx,
            sender,
            step,
            window,
            follow_up_delay: None,
            reply_to: None,
            retry: RetryPolicy::email_send(),
            pacing: Pacing::sequential(Duration::from_millis(600)),
        }
    }

    pub fn with_follow_up_delay(mut self, delay: chrono::Duration) -> Self {
        self.follow_up_delay = Some(delay);
        self
    }

    pub fn with_reply_to(mut self, reply_to: Option<String>) -> Self {
        self.reply_to = reply_to;
        self
    }

    pub fn with_pacing(mut self, pacing: Pacing) -> Self {
        self.pacing = pacing;
        self
    }

    pub fn with_retry_policy(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    pub fn step(&self) -> EmailStep {
        self.step
    }
}

#[async_trait]
impl Stage for SendStage {
    fn name(&self) -> &'static str {
        match self.step {
            EmailStep::First => "send_email_1",
            EmailStep::Second => "send_email_2",
            EmailStep::Third => "send_email_3",
        }
    }

    fn pacing(&self) -> Pacing {
        self.pacing
    }

    async fn eligible(&self, limit: u32, now: DateTime<Utc>) -> Result<Vec<Lead>, StoreError> {
        let mut query =
            self.ctx.quarantine.policy().eligible(self.step.entry_status(), limit).excluding_replied();
        if let (Some(previous), Some(delay)) = (self.step.previous(), self.follow_up_delay) {
            query = query.sent_before(previous, now - delay);
        }
        // Select only from buckets whose window is open now.
        let local = self.ctx.clock.now_local();
        let open: Vec<TimezoneBucket> = TimezoneBucket::ALL
            .into_iter()
            .filter(|bucket| self.window.is_within_window(*bucket, local))
            .collect();
        if open.is_empty() {
            return Ok(Vec::new());
        }
        self.ctx.store.select(&query.in_buckets(open)).await
    }

    async fn process(&self, lead: Lead, now: DateTime<Utc>) -> Result<StageOutcome, ApplicationError> {
        if let Some(rejected) = self.ctx.check_entry(&lead, self.step.entry_status()) {
            return Ok(rejected);
        }
        if lead.replied_at.is_some() {
            return Ok(StageOutcome::Rejected(PreconditionError::AlreadyReplied));
        }
        let Some(sequence) = lead.sequence.as_ref().filter(|seq| !seq.draft(self.step).is_empty()) else {
            return Ok(StageOutcome::Rejected(PreconditionError::MissingContent(format!(
                "email {} content",
                self.step.number()
            ))));
        };
        let Some(from) = lead.sender.clone() else {
            return Ok(StageOutcome::Rejected(PreconditionError::MissingContent(
                "an assigned sender".to_owned(),
            )));
        };

        let bucket = lead.timezone_bucket.unwrap_or(TimezoneBucket::Local);
        if !self.window.is_within_window(bucket, self.ctx.clock.now_local()) {
            return Ok(StageOutcome::Skipped(format!(
                "outside the sending window for bucket {}",
                bucket.as_str()
            )));
        }

        let email = OutboundEmail {
            to: lead.email.clone(),
            from,
            reply_to: self.reply_to.clone(),
            subject: sequence.subject_for(self.step),
            body: sequence.draft(self.step).body.clone(),
        };
        let sender = &self.sender;
        let outbound = &email;
        let sent = with_retry(&self.retry, "mail.send", move || async move { sender.send(outbound).await }).await;
        let message = match sent {
            Ok(message) => message,
            Err(error) => return Ok(self.ctx.fail("sending", &lead, &error.to_string(), now).await),
        };

        // Delivery timestamps never go backwards, even if the clock does.
        let floor = self
            .step
            .previous()
            .and_then(|previous| lead.deliveries.get(previous))
            .map(|delivery| delivery.sent_at + chrono::Duration::milliseconds(1));
        let sent_at = floor.map_or(now, |floor| floor.max(now));

        let data = json!({ "message_id": message.message_id, "from": email.from, "step": self.step.number() });
        let mut next = lead;
        next.deliveries.set(self.step, Delivery { sent_at, message_id: message.message_id });
        self.ctx.commit(next, LeadTrigger::EmailSent(self.step), self.step.sent_event(), data, now).await
    }
}
