pub mod clock;
pub mod config;
pub mod domain;
pub mod errors;
pub mod events;
pub mod lifecycle;
pub mod pipeline;
pub mod ports;
pub mod quarantine;
pub mod retry;
pub mod store;
pub mod window;

pub use chrono;

pub use clock::{Clock, FixedClock, SystemClock};
pub use domain::contact::{RawContact, SearchCriteria, SearchResult};
pub use domain::event::PipelineEvent;
pub use domain::lead::{
    EmailDraft, EmailSequence, EmailStep, Lead, LeadId, LeadStatus, TimezoneBucket,
};
pub use domain::reply::{InboundReply, MeetingOutcome, ReplyCategory, ReplyClassification, Sentiment};
pub use errors::{
    ApplicationError, DomainError, IntegrationError, InterfaceError, PreconditionError, Retryable,
    StoreError,
};
pub use events::{EventLog, EventSink, InMemoryEventSink};
pub use lifecycle::{LeadTrigger, TransitionOutcome};
pub use pipeline::{Pipeline, PipelineDeps, PipelineSettings, QueueView, RunSummary, StageKind};
pub use quarantine::QuarantinePolicy;
pub use retry::RetryPolicy;
pub use store::{InMemoryLeadStore, LeadQuery, LeadStore};
pub use window::SendingWindow;
