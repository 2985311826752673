use thiserror::Error;

use crate::domain::lead::LeadStatus;

#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum DomainError {
    #[error("invalid lead transition from {from} on {trigger}")]
    InvalidTransition { from: LeadStatus, trigger: String },
    #[error("domain invariant violation: {0}")]
    InvariantViolation(String),
}

/// A stage declined to act on a lead. Returned as a value, never raised.
#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum PreconditionError {
    #[error("lead is `{actual}` but `{expected}` is required")]
    WrongStatus { expected: LeadStatus, actual: LeadStatus },
    #[error("lead is missing {0}")]
    MissingContent(String),
    #[error("lead is quarantined after {error_count} errors")]
    Quarantined { error_count: u32 },
    #[error("lead has already replied")]
    AlreadyReplied,
    #[error("no lead found for {0}")]
    NotFound(String),
    #[error(transparent)]
    Transition(#[from] DomainError),
}

/// Failure reported by an external collaborator.
#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum IntegrationError {
    #[error("network failure: {0}")]
    Network(String),
    #[error("request timed out: {0}")]
    Timeout(String),
    #[error("http status {status}: {message}")]
    Http { status: u16, message: String },
    #[error("provider overloaded: {0}")]
    Overloaded(String),
    #[error("invalid response: {0}")]
    InvalidResponse(String),
    #[error("request rejected: {0}")]
    Rejected(String),
}

pub trait Retryable {
    fn is_retryable(&self) -> bool;
}

impl Retryable for IntegrationError {
    fn is_retryable(&self) -> bool {
        match self {
            Self::Network(_) | Self::Timeout(_) | Self::Overloaded(_) => true,
            Self::Http { status, .. } => *status == 429 || (500..600).contains(status),
            Self::InvalidResponse(_) | Self::Rejected(_) => false,
        }
    }
}

#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum StoreError {
    /// The lead changed since it was read; another worker claimed it first.
    #[error("lead {lead_id} was modified concurrently")]
    Conflict { lead_id: String },
    #[error("lead {0} not found")]
    NotFound(String),
    #[error("store failure: {0}")]
    Backend(String),
}

#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum ApplicationError {
    #[error(transparent)]
    Domain(#[from] DomainError),
    #[error(transparent)]
    Precondition(#[from] PreconditionError),
    #[error("integration failure: {0}")]
    Integration(#[from] IntegrationError),
    #[error("persistence failure: {0}")]
    Persistence(#[from] StoreError),
    #[error("configuration failure: {0}")]
    Configuration(String),
}

#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum InterfaceError {
    #[error("bad request: {message}")]
    BadRequest { message: String, correlation_id: String },
    #[error("not found: {message}")]
    NotFound { message: String, correlation_id: String },
    #[error("service unavailable: {message}")]
    ServiceUnavailable { message: String, correlation_id: String },
    #[error("internal error: {message}")]
    Internal { message: String, correlation_id: String },
}

impl InterfaceError {
    pub fn user_message(&self) -> &'static str {
        match self {
            Self::BadRequest { .. } => {
                "The request could not be processed. Check inputs and try again."
            }
            Self::NotFound { .. } => "No matching lead was found.",
            Self::ServiceUnavailable { .. } => {
                "The service is temporarily unavailable. Please retry shortly."
            }
            Self::Internal { .. } => "An unexpected internal error occurred.",
        }
    }

    pub fn correlation_id(&self) -> &str {
        match self {
            Self::BadRequest { correlation_id, .. }
            | Self::NotFound { correlation_id, .. }
            | Self::ServiceUnavailable { correlation_id, .. }
            | Self::Internal { correlation_id, .. } => correlation_id,
        }
    }
}

impl ApplicationError {
    pub fn into_interface(self, correlation_id: impl Into<String>) -> InterfaceError {
        let correlation_id = correlation_id.into();
        let mut mapped = InterfaceError::from(self);
        match &mut mapped {
            InterfaceError::BadRequest { correlation_id: id, .. }
            | InterfaceError::NotFound { correlation_id: id, .. }
            | InterfaceError::ServiceUnavailable { correlation_id: id, .. }
            | InterfaceError::Internal { correlation_id: id, .. } => *id = correlation_id,
        }
        mapped
    }
}

impl From<ApplicationError> for InterfaceError {
    fn from(value: ApplicationError) -> Self {
        let unassigned = || "unassigned".to_owned();
        match value {
            ApplicationError::Precondition(PreconditionError::NotFound(message))
            | ApplicationError::Persistence(StoreError::NotFound(message)) => {
                Self::NotFound { message, correlation_id: unassigned() }
            }
            ApplicationError::Domain(error) => {
                Self::BadRequest { message: error.to_string(), correlation_id: unassigned() }
            }
            ApplicationError::Precondition(error) => {
                Self::BadRequest { message: error.to_string(), correlation_id: unassigned() }
            }
            ApplicationError::Persistence(error) => Self::ServiceUnavailable {
                message: error.to_string(),
                correlation_id: unassigned(),
            },
            ApplicationError::Integration(error) => Self::ServiceUnavailable {
                message: error.to_string(),
                correlation_id: unassigned(),
            },
            ApplicationError::Configuration(message) => {
                Self::Internal { message, correlation_id: unassigned() }
            }
        }
    }
}
