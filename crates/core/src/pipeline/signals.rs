//! Inbound signals: classified replies and meeting bookings.
//!
//! These run outside the scheduler, one lead per call, triggered by webhooks or
//! operator commands.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde_json::{json, Value};
use tracing::{info, warn};

use crate::domain::lead::Lead;
use crate::domain::reply::{InboundReply, MeetingOutcome, ReplyClassification};
use crate::errors::{ApplicationError, PreconditionError, StoreError};
use crate::lifecycle::LeadTrigger;
use crate::pipeline::outcome::StageOutcome;
use crate::pipeline::stage::StageContext;
use crate::ports::{Notification, Notifier, ReplyClassifier};
use crate::retry::{with_retry, RetryPolicy};

/// Posts to the operator channel, logging instead of failing.
pub async fn notify_best_effort(notifier: &dyn Notifier, notification: &Notification) {
    if let Err(error) = notifier.post(notification).await {
        warn!(
            event_name = "notify.post_failed",
            error = %error,
            "operator notification was not delivered"
        );
    }
}

async fn load_lead(ctx: &StageContext, email: &str) -> Result<Lead, ApplicationError> {
    ctx.store
        .find_by_email(email)
        .await?
        .ok_or_else(|| PreconditionError::NotFound(email.to_owned()).into())
}

const SIGNAL_COMMIT_ATTEMPTS: u32 = 3;

/// Commits an inbound signal. On a version conflict the lead is reloaded and `edit`
/// reapplied, up to `SIGNAL_COMMIT_ATTEMPTS` times.
async fn commit_signal(
    ctx: &StageContext,
    lead: Lead,
    edit: impl Fn(&mut Lead),
    trigger: LeadTrigger,
    event_type: &str,
    data: Value,
    now: DateTime<Utc>,
) -> Result<StageOutcome, ApplicationError> {
    let id = lead.id.clone();
    let email = lead.email.clone();
    let mut current = lead;
    let mut attempt = 1;
    loop {
        let mut next = current;
        edit(&mut next);
        match ctx.try_commit(next, trigger, event_type, data.clone(), now).await {
            Err(ApplicationError::Persistence(StoreError::Conflict { lead_id }))
                if attempt < SIGNAL_COMMIT_ATTEMPTS =>
            {
                info!(
                    event_name = "pipeline.signal.reloaded",
                    lead_id = %lead_id,
                    trigger = %trigger.name(),
                    attempt,
                    "lead changed while the signal was in flight, reapplying"
                );
                current = ctx
                    .store
                    .find_by_id(&id)
                    .await?
                    .ok_or_else(|| PreconditionError::NotFound(email.clone()))?;
                attempt += 1;
            }
            result => return result,
        }
    }
}

#[derive(Clone, Debug, PartialEq)]
pub struct ReplyOutcome {
    pub classification: ReplyClassification,
    pub outcome: StageOutcome,
}

pub struct ReplyHandler {
    ctx: StageContext,
    classifier: Arc<dyn ReplyClassifier>,
    notifier: Arc<dyn Notifier>,
    retry: RetryPolicy,
}

impl ReplyHandler {
    pub fn new(
        ctx: StageContext,
        classifier: Arc<dyn ReplyClassifier>,
        notifier: Arc<dyn Notifier>,
    ) -> Self {
        Self { ctx, classifier, notifier, retry: RetryPolicy::llm_analysis() }
    }

    pub fn with_retry_policy(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    pub async fn handle(&self, reply: &InboundReply) -> Result<ReplyOutcome, ApplicationError> {
        let lead = load_lead(&self.ctx, &reply.from_email).await?;
        let classifier = &self.classifier;
        let classification =
            with_retry(&self.retry, "reply.classify", move || async move { classifier.classify(reply).await })
                .await?;
        let category = classification.category;
        let now = self.ctx.clock.now_utc();

        info!(
            event_name = "pipeline.reply.classified",
            lead_id = %lead.id,
            category = category.as_str(),
            sentiment = classification.sentiment.as_str(),
            "reply classified"
        );

        let lead_id = lead.id.clone();
        let mark_replied = |next: &mut Lead| {
            if !category.is_automatic() {
                next.replied_at = Some(reply.received_at);
                next.reply_category = Some(category);
                next.reply_sentiment = Some(classification.sentiment);
            }
        };
        let data = json!({
            "category": category.as_str(),
            "sentiment": classification.sentiment.as_str(),
            "summary": classification.summary,
            "subject": reply.subject,
        });
        let trigger = LeadTrigger::ReplyClassified(category);
        let outcome =
            commit_signal(&self.ctx, lead, mark_replied, trigger, "reply_received", data.clone(), now).await?;

        if let StageOutcome::Rejected(reason) = &outcome {
            warn!(
                event_name = "pipeline.reply.unapplied",
                lead_id = %lead_id,
                category = category.as_str(),
                reason = %reason,
                "reply did not move the lead"
            );
            let mut data = data;
            data["rejected"] = Value::String(reason.to_string());
            self.ctx.events.lead(&lead_id, "reply_received", data, now).await;
        }

        if let (StageOutcome::Advanced(lead), false) = (&outcome, category.is_automatic()) {
            let alert = Notification::ReplyReceived {
                email: lead.email.clone(),
                name: lead.name.clone(),
                company: lead.company.clone(),
                category,
                summary: classification.summary.clone(),
            };
            notify_best_effort(self.notifier.as_ref(), &alert).await;
        }

        Ok(ReplyOutcome { classification, outcome })
    }
}

pub struct BookingHandler {
    ctx: StageContext,
    notifier: Arc<dyn Notifier>,
}

impl BookingHandler {
    pub fn new(ctx: StageContext, notifier: Arc<dyn Notifier>) -> Self {
        Self { ctx, notifier }
    }

    pub async fn meeting_booked(
        &self,
        email: &str,
        scheduled_at: DateTime<Utc>,
    ) -> Result<StageOutcome, ApplicationError> {
        let lead = load_lead(&self.ctx, email).await?;
        let now = self.ctx.clock.now_utc();
        let outcome = commit_signal(
            &self.ctx,
            lead,
            |next| next.meeting_at = Some(scheduled_at),
            LeadTrigger::MeetingBooked,
            "meeting_booked",
            json!({ "scheduled_at": scheduled_at.to_rfc3339() }),
            now,
        )
        .await?;

        if let StageOutcome::Advanced(lead) = &outcome {
            let alert = Notification::MeetingBooked {
                email: lead.email.clone(),
                name: lead.name.clone(),
                company: lead.company.clone(),
                scheduled_at,
            };
            notify_best_effort(self.notifier.as_ref(), &alert).await;
        }
        Ok(outcome)
    }

    /// Calendar confirmation of a booked meeting.
    pub async fn meeting_confirmed(&self, email: &str) -> Result<StageOutcome, ApplicationError> {
        let lead = load_lead(&self.ctx, email).await?;
        let now = self.ctx.clock.now_utc();
        commit_signal(&self.ctx, lead, |_| {}, LeadTrigger::MeetingScheduled, "meeting_scheduled", json!({}), now)
            .await
    }

    pub async fn meeting_outcome(
        &self,
        email: &str,
        outcome: MeetingOutcome,
    ) -> Result<StageOutcome, ApplicationError> {
        let lead = load_lead(&self.ctx, email).await?;
        let now = self.ctx.clock.now_utc();
        commit_signal(
            &self.ctx,
            lead,
            |next| next.meeting_outcome = Some(outcome),
            LeadTrigger::MeetingOutcome(outcome),
            "meeting_outcome",
            json!({ "outcome": outcome.as_str() }),
            now,
        )
        .await
    }
}
