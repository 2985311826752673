use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReplyCategory {
    Interested,
    Question,
    MeetingRequest,
    NotNow,
    NotInterested,
    Unsubscribe,
    OutOfOffice,
    Bounce,
}

impl ReplyCategory {
    pub const ALL: [ReplyCategory; 8] = [
        Self::Interested,
        Self::Question,
        Self::MeetingRequest,
        Self::NotNow,
        Self::NotInterested,
        Self::Unsubscribe,
        Self::OutOfOffice,
        Self::Bounce,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Interested => "interested",
            Self::Question => "question",
            Self::MeetingRequest => "meeting_request",
            Self::NotNow => "not_now",
            Self::NotInterested => "not_interested",
            Self::Unsubscribe => "unsubscribe",
            Self::OutOfOffice => "out_of_office",
            Self::Bounce => "bounce",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        let normalized = value.trim().to_ascii_lowercase().replace([' ', '-'], "_");
        Self::ALL.into_iter().find(|category| category.as_str() == normalized)
    }

    /// Automatic replies do not count as a human response and leave the sequence running.
    pub fn is_automatic(&self) -> bool {
        matches!(self, Self::OutOfOffice)
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Sentiment {
    Positive,
    Neutral,
    Negative,
}

impl Sentiment {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Positive => "positive",
            Self::Neutral => "neutral",
            Self::Negative => "negative",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value.trim().to_ascii_lowercase().as_str() {
            "positive" => Some(Self::Positive),
            "neutral" => Some(Self::Neutral),
            "negative" => Some(Self::Negative),
            _ => None,
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MeetingOutcome {
    Completed,
    Converted,
    NoShow,
    Rescheduled,
    Lost,
}

impl MeetingOutcome {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Completed => "completed",
            Self::Converted => "converted",
            Self::NoShow => "no_show",
            Self::Rescheduled => "rescheduled",
            Self::Lost => "lost",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value.trim().to_ascii_lowercase().replace('-', "_").as_str() {
            "completed" => Some(Self::Completed),
            "converted" => Some(Self::Converted),
            "no_show" => Some(Self::NoShow),
            "rescheduled" => Some(Self::Rescheduled),
            "lost" => Some(Self::Lost),
            _ => None,
        }
    }
}

/// An email received from a lead, as handed over by the inbound webhook.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct InboundReply {
    pub from_email: String,
    pub subject: String,
    pub body: String,
    pub received_at: DateTime<Utc>,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReplyClassification {
    pub category: ReplyCategory,
    pub sentiment: Sentiment,
    pub summary: Option<String>,
}
