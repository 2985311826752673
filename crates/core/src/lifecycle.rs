//! Lead lifecycle transition table.
//!
//! Every status change in the pipeline goes through [`transition`]. Stages never
//! assign `Lead::status` directly; they apply a [`LeadTrigger`] and persist the result.

use crate::domain::lead::{EmailStep, Lead, LeadStatus};
use crate::domain::reply::{MeetingOutcome, ReplyCategory};
use crate::errors::DomainError;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum LeadTrigger {
    Discovered,
    ResearchCompleted,
    SequenceDrafted,
    EmailSent(EmailStep),
    ReplyClassified(ReplyCategory),
    MeetingBooked,
    MeetingScheduled,
    MeetingOutcome(MeetingOutcome),
    Bounced,
    OptedOut,
    MarkedInvalid,
}

impl LeadTrigger {
    pub fn name(&self) -> String {
        match self {
            Self::Discovered => "discovered".to_owned(),
            Self::ResearchCompleted => "research_completed".to_owned(),
            Self::SequenceDrafted => "sequence_drafted".to_owned(),
            Self::EmailSent(step) => step.sent_event().to_owned(),
            Self::ReplyClassified(category) => format!("reply_{}", category.as_str()),
            Self::MeetingBooked => "meeting_booked".to_owned(),
            Self::MeetingScheduled => "meeting_scheduled".to_owned(),
            Self::MeetingOutcome(outcome) => format!("meeting_{}", outcome.as_str()),
            Self::Bounced => "bounced".to_owned(),
            Self::OptedOut => "opted_out".to_owned(),
            Self::MarkedInvalid => "marked_invalid".to_owned(),
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct TransitionOutcome {
    pub from: LeadStatus,
    pub to: LeadStatus,
    pub trigger: LeadTrigger,
}

impl TransitionOutcome {
    pub fn changed(&self) -> bool {
        self.from != self.to
    }
}

pub fn transition(current: LeadStatus, trigger: LeadTrigger) -> Result<TransitionOutcome, DomainError> {
    use LeadStatus::{
        Bounced, ClosedLost, Converted, Email1Sent, Email2Sent, Email3Sent, Engaged, Invalid,
        MeetingBooked, MeetingNegotiation, MeetingScheduled, New, OptedOut, Ready, Researched,
        Scraped, Unsubscribed,
    };

    let to = match (current, trigger) {
        (New, LeadTrigger::Discovered) => Some(Scraped),
        (Scraped, LeadTrigger::ResearchCompleted) => Some(Researched),
        (Researched, LeadTrigger::SequenceDrafted) => Some(Ready),
        (status, LeadTrigger::EmailSent(step)) if status == step.entry_status() => {
            Some(step.sent_status())
        }

        (status, LeadTrigger::ReplyClassified(category))
            if status.is_in_sequence() || status.is_conversation() =>
        {
            Some(reply_target(status, category))
        }

        (
            Ready | Email1Sent | Email2Sent | Email3Sent | Engaged | MeetingNegotiation,
            LeadTrigger::MeetingBooked,
        ) => Some(MeetingBooked),
        (MeetingBooked, LeadTrigger::MeetingScheduled) => Some(MeetingScheduled),
        (MeetingScheduled, LeadTrigger::MeetingScheduled) => Some(MeetingScheduled),
        (MeetingBooked | MeetingScheduled, LeadTrigger::MeetingOutcome(outcome)) => {
            Some(match outcome {
                MeetingOutcome::Completed | MeetingOutcome::Converted => Converted,
                MeetingOutcome::NoShow | MeetingOutcome::Rescheduled => MeetingNegotiation,
                MeetingOutcome::Lost => ClosedLost,
            })
        }

        (Email1Sent | Email2Sent | Email3Sent, LeadTrigger::Bounced) => Some(Bounced),
        (status, LeadTrigger::OptedOut) if !status.is_terminal() => Some(OptedOut),
        (status, LeadTrigger::MarkedInvalid) if !status.is_terminal() => Some(Invalid),
        (Unsubscribed, LeadTrigger::OptedOut) => Some(OptedOut),
        _ => None,
    };

    to.map(|to| TransitionOutcome { from: current, to, trigger }).ok_or_else(|| {
        DomainError::InvalidTransition { from: current, trigger: trigger.name() }
    })
}

/// Where a classified reply moves a lead. Replies never pull a lead back out of a
/// later conversation state, and automatic replies leave the status alone.
fn reply_target(current: LeadStatus, category: ReplyCategory) -> LeadStatus {
    use LeadStatus::{
        Bounced, ClosedLost, Engaged, MeetingBooked, MeetingNegotiation, MeetingScheduled,
        Unsubscribed,
    };

    match category {
        ReplyCategory::OutOfOffice => current,
        ReplyCategory::Interested | ReplyCategory::Question => {
            if current.is_conversation() {
                current
            } else {
                Engaged
            }
        }
        ReplyCategory::MeetingRequest => match current {
            MeetingBooked | MeetingScheduled => current,
            _ => MeetingNegotiation,
        },
        ReplyCategory::NotNow | ReplyCategory::NotInterested => ClosedLost,
        ReplyCategory::Unsubscribe => Unsubscribed,
        ReplyCategory::Bounce => Bounced,
    }
}

/// Applies `trigger` to the lead's status in place.
pub fn apply(lead: &mut Lead, trigger: LeadTrigger) -> Result<TransitionOutcome, DomainError> {
    let outcome = transition(lead.status, trigger)?;
    lead.status = outcome.to;
    Ok(outcome)
}

/// Statuses reachable from `current` through any trigger.
pub fn reachable_from(current: LeadStatus) -> Vec<LeadStatus> {
    let mut triggers = vec![
        LeadTrigger::Discovered,
        LeadTrigger::ResearchCompleted,
        LeadTrigger::SequenceDrafted,
        LeadTrigger::MeetingBooked,
        LeadTrigger::MeetingScheduled,
        LeadTrigger::Bounced,
        LeadTrigger::OptedOut,
        LeadTrigger::MarkedInvalid,
    ];
    triggers.extend(EmailStep::ALL.map(LeadTrigger::EmailSent));
    triggers.extend(ReplyCategory::ALL.map(LeadTrigger::ReplyClassified));
    triggers.extend(
        [
            MeetingOutcome::Completed,
            MeetingOutcome::Converted,
            MeetingOutcome::NoShow,
            MeetingOutcome::Rescheduled,
            MeetingOutcome::Lost,
        ]
        .map(LeadTrigger::MeetingOutcome),
    );

    let mut reachable: Vec<LeadStatus> = triggers
        .into_iter()
        .filter_map(|trigger| transition(current, trigger).ok())
        .filter(|outcome| outcome.changed())
        .map(|outcome| outcome.to)
        .collect();
    reachable.sort();
    reachable.dedup();
    reachable
}
