use crate::domain::lead::Lead;
use crate::errors::PreconditionError;

/// Result of running one stage against one lead.
#[derive(Clone, Debug, PartialEq)]
pub enum StageOutcome {
    /// The lead moved forward and was persisted.
    Advanced(Lead),
    /// Nothing was done and nothing counts against the lead, e.g. outside the sending window.
    Skipped(String),
    /// The lead did not meet the stage's preconditions. State is unchanged.
    Rejected(PreconditionError),
    /// The collaborator call failed after retries; the error is already recorded on the lead.
    Failed(String),
}

impl StageOutcome {
    pub fn lead(&self) -> Option<&Lead> {
        match self {
            Self::Advanced(lead) => Some(lead),
            _ => None,
        }
    }

    pub fn is_advanced(&self) -> bool {
        matches!(self, Self::Advanced(_))
    }

    pub fn describe(&self) -> String {
        match self {
            Self::Advanced(lead) => format!("{} is now {}", lead.email, lead.status),
            Self::Skipped(reason) => format!("skipped: {reason}"),
            Self::Rejected(error) => format!("rejected: {error}"),
            Self::Failed(message) => format!("failed: {message}"),
        }
    }
}
