//! Stage processors, batch runner and the schedulers that drive them.

pub mod batch;
pub mod discovery;
pub mod followup;
pub mod orchestrator;
pub mod outcome;
pub mod report;
pub mod rotation;
pub mod signals;
pub mod stage;
pub mod stages;
pub mod ticker;

use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::clock::Clock;
use crate::domain::contact::SearchCriteria;
use crate::domain::lead::{EmailStep, Lead, LeadStatus};
use crate::domain::reply::{InboundReply, MeetingOutcome};
use crate::errors::{ApplicationError, PreconditionError, StoreError};
use crate::events::{EventLog, EventSink};
use crate::ports::{
    ContentGenerator, LeadSource, MessageSender, Notifier, ReplyClassifier, ResearchContext,
};
use crate::quarantine::{Quarantine, QuarantinePolicy};
use crate::store::LeadStore;
use crate::window::SendingWindow;

pub use batch::BatchRunner;
pub use discovery::DiscoveryStage;
pub use followup::FollowUpScheduler;
pub use orchestrator::{BatchLimits, Orchestrator};
pub use outcome::StageOutcome;
pub use report::{BatchReport, RunKind, RunSummary};
pub use rotation::SenderRotation;
pub use signals::{BookingHandler, ReplyHandler, ReplyOutcome};
pub use stage::{Pacing, Stage, StageContext};
pub use stages::{OutreachStage, ResearchStage, SendStage};
pub use ticker::Ticker;

/// Collaborators a pipeline is assembled from.
#[derive(Clone)]
pub struct PipelineDeps {
    pub store: Arc<dyn LeadStore>,
    pub events: Arc<dyn EventSink>,
    pub lead_source: Arc<dyn LeadSource>,
    pub generator: Arc<dyn ContentGenerator>,
    pub sender: Arc<dyn MessageSender>,
    pub classifier: Arc<dyn ReplyClassifier>,
    pub notifier: Arc<dyn Notifier>,
    pub clock: Arc<dyn Clock>,
}

#[derive(Clone, Debug, PartialEq)]
pub struct PipelineSettings {
    pub quarantine: QuarantinePolicy,
    pub window: SendingWindow,
    pub limits: BatchLimits,
    pub follow_up_2_delay: chrono::Duration,
    pub follow_up_3_delay: chrono::Duration,
    pub lead_pacing: Pacing,
    pub research_pacing: Pacing,
    pub send_pacing: Pacing,
    pub senders: Vec<String>,
    pub reply_to: Option<String>,
    pub criteria: SearchCriteria,
    pub research_context: ResearchContext,
}

impl Default for PipelineSettings {
    fn default() -> Self {
        Self {
            quarantine: QuarantinePolicy::default(),
            window: SendingWindow::default(),
            limits: BatchLimits::standard(),
            follow_up_2_delay: chrono::Duration::days(3),
            follow_up_3_delay: chrono::Duration::days(4),
            lead_pacing: Pacing::sequential(Duration::from_millis(500)),
            research_pacing: Pacing::fan_out(5, Duration::from_millis(500)),
            send_pacing: Pacing::sequential(Duration::from_millis(600)),
            senders: Vec::new(),
            reply_to: None,
            criteria: SearchCriteria::default(),
            research_context: ResearchContext::default(),
        }
    }
}

/// A stage an operator can run directly.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum StageKind {
    Discovery,
    Research,
    Outreach,
    Send(EmailStep),
}

impl StageKind {
    pub fn parse(value: &str) -> Option<Self> {
        match value.trim().to_ascii_lowercase().replace('_', "-").as_str() {
            "discovery" | "discover" | "scrape" => Some(Self::Discovery),
            "research" => Some(Self::Research),
            "outreach" | "draft" => Some(Self::Outreach),
            "send" | "send-1" | "email-1" => Some(Self::Send(EmailStep::First)),
            "send-2" | "email-2" | "follow-up-1" => Some(Self::Send(EmailStep::Second)),
            "send-3" | "email-3" | "follow-up-2" => Some(Self::Send(EmailStep::Third)),
            _ => None,
        }
    }
}

/// Operator view of the lead table.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize)]
pub struct QueueView {
    pub by_status: BTreeMap<String, u64>,
    pub total: u64,
    pub quarantined: u64,
}

pub struct Pipeline {
    ctx: StageContext,
    orchestrator: Orchestrator,
    follow_ups: FollowUpScheduler,
    discovery: DiscoveryStage,
    research: Arc<ResearchStage>,
    outreach: Arc<OutreachStage>,
    sends: [Arc<SendStage>; 3],
    replies: ReplyHandler,
    bookings: BookingHandler,
    criteria: SearchCriteria,
    limits: BatchLimits,
}

impl Pipeline {
    pub fn new(deps: PipelineDeps, settings: PipelineSettings) -> Self {
        let events = EventLog::new(deps.events.clone());
        let quarantine = Quarantine::new(deps.store.clone(), events.clone(), settings.quarantine);
        let ctx = StageContext {
            store: deps.store.clone(),
            events,
            quarantine,
            clock: deps.clock.clone(),
        };

        let research = Arc::new(ResearchStage::new(
            ctx.clone(),
            deps.generator.clone(),
            settings.research_context.clone(),
            settings.research_pacing,
        ));
        let outreach = Arc::new(OutreachStage::new(
            ctx.clone(),
            deps.generator.clone(),
            SenderRotation::new(settings.senders.clone()),
            settings.lead_pacing,
        ));
        let send = |step: EmailStep| {
            SendStage::new(ctx.clone(), deps.sender.clone(), step, settings.window)
                .with_reply_to(settings.reply_to.clone())
                .with_pacing(settings.send_pacing)
        };
        let sends = [
            Arc::new(send(EmailStep::First)),
            Arc::new(send(EmailStep::Second).with_follow_up_delay(settings.follow_up_2_delay)),
            Arc::new(send(EmailStep::Third).with_follow_up_delay(settings.follow_up_3_delay)),
        ];

        let orchestrator = Orchestrator::new(
            ctx.clone(),
            DiscoveryStage::new(ctx.clone(), deps.lead_source.clone()),
            research.clone(),
            outreach.clone(),
            sends[0].clone(),
            deps.notifier.clone(),
            settings.criteria.clone(),
            settings.limits,
        );
        let follow_ups = FollowUpScheduler::new(
            ctx.clone(),
            sends[1].clone(),
            sends[2].clone(),
            deps.notifier.clone(),
            settings.limits.follow_up,
        );

        Self {
            discovery: DiscoveryStage::new(ctx.clone(), deps.lead_source),
            replies: ReplyHandler::new(ctx.clone(), deps.classifier, deps.notifier.clone()),
            bookings: BookingHandler::new(ctx.clone(), deps.notifier),
            ctx,
            orchestrator,
            follow_ups,
            research,
            outreach,
            sends,
            criteria: settings.criteria,
            limits: settings.limits,
        }
    }

    /// Switches every batch size to `limits`, e.g. the fast preset.
    pub fn with_limits(mut self, limits: BatchLimits) -> Self {
        self.orchestrator = self.orchestrator.with_limits(limits);
        self.follow_ups = self.follow_ups.with_limit(limits.follow_up);
        self.limits = limits;
        self
    }

    pub fn limits(&self) -> BatchLimits {
        self.limits
    }

    pub fn now(&self) -> DateTime<Utc> {
        self.ctx.clock.now_utc()
    }

    pub async fn run_once(&self) -> RunSummary {
        self.orchestrator.run_once().await
    }

    pub async fn run_follow_ups(&self) -> RunSummary {
        self.follow_ups.run_once().await
    }

    pub async fn run_batch(&self, kind: StageKind, limit: u32) -> Result<BatchReport, ApplicationError> {
        match kind {
            StageKind::Discovery => self.discovery.discover(&self.criteria, limit).await,
            other => {
                let runner = BatchRunner::new(self.ctx.clone());
                runner.run(self.stage(other)?, limit).await
            }
        }
    }

    /// Runs one stage for the lead with `email`. Preconditions are reported in the outcome.
    pub async fn process_email(
        &self,
        kind: StageKind,
        email: &str,
    ) -> Result<StageOutcome, ApplicationError> {
        let stage = self.stage(kind)?;
        let Some(lead) = self.ctx.store.find_by_email(email).await? else {
            return Ok(StageOutcome::Rejected(PreconditionError::NotFound(email.to_owned())));
        };
        BatchRunner::new(self.ctx.clone()).run_single(stage, lead).await
    }

    pub async fn handle_reply(&self, reply: &InboundReply) -> Result<ReplyOutcome, ApplicationError> {
        self.replies.handle(reply).await
    }

    pub async fn meeting_booked(
        &self,
        email: &str,
        scheduled_at: DateTime<Utc>,
    ) -> Result<StageOutcome, ApplicationError> {
        self.bookings.meeting_booked(email, scheduled_at).await
    }

    pub async fn meeting_confirmed(&self, email: &str) -> Result<StageOutcome, ApplicationError> {
        self.bookings.meeting_confirmed(email).await
    }

    pub async fn meeting_outcome(
        &self,
        email: &str,
        outcome: MeetingOutcome,
    ) -> Result<StageOutcome, ApplicationError> {
        self.bookings.meeting_outcome(email, outcome).await
    }

    pub async fn queue(&self) -> Result<QueueView, StoreError> {
        let counts = self.ctx.store.count_by_status().await?;
        let quarantined = self.ctx.quarantine.count_quarantined().await?;
        let total = counts.values().sum();
        let by_status =
            counts.into_iter().map(|(status, count)| (status.as_str().to_owned(), count)).collect();
        Ok(QueueView { by_status, total, quarantined })
    }

    pub async fn leads_with_errors(&self, limit: u32) -> Result<Vec<Lead>, StoreError> {
        self.ctx.quarantine.find_with_errors(limit).await
    }

    pub async fn clear_errors(
        &self,
        email: &str,
        reset_to: Option<LeadStatus>,
    ) -> Result<Lead, ApplicationError> {
        let lead = self
            .ctx
            .store
            .find_by_email(email)
            .await?
            .ok_or_else(|| PreconditionError::NotFound(email.to_owned()))?;
        Ok(self.ctx.quarantine.clear_error(&lead.id, reset_to, self.now()).await?)
    }

    fn stage(&self, kind: StageKind) -> Result<&dyn Stage, ApplicationError> {
        let stage: &dyn Stage = match kind {
            StageKind::Discovery => {
                return Err(ApplicationError::Configuration(
                    "discovery runs as a batch, not per lead".to_owned(),
                ))
            }
            StageKind::Research => self.research.as_ref(),
            StageKind::Outreach => self.outreach.as_ref(),
            StageKind::Send(EmailStep::First) => self.sends[0].as_ref(),
            StageKind::Send(EmailStep::Second) => self.sends[1].as_ref(),
            StageKind::Send(EmailStep::Third) => self.sends[2].as_ref(),
        };
        Ok(stage)
    }
}
