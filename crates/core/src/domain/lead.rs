use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::domain::reply::{MeetingOutcome, ReplyCategory, Sentiment};
use crate::errors::DomainError;

#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct LeadId(pub String);

impl LeadId {
    pub fn generate() -> Self {
        Self(Uuid::new_v4().to_string())
    }
}

impl std::fmt::Display for LeadId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

/// Lowercases and trims an email so it can serve as the natural key.
pub fn normalize_email(email: &str) -> String {
    email.trim().to_ascii_lowercase()
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LeadStatus {
    New,
    Scraped,
    Researched,
    Ready,
    #[serde(rename = "email_1_sent")]
    Email1Sent,
    #[serde(rename = "email_2_sent")]
    Email2Sent,
    #[serde(rename = "email_3_sent")]
    Email3Sent,
    Engaged,
    MeetingNegotiation,
    MeetingBooked,
    MeetingScheduled,
    Converted,
    ClosedLost,
    Unsubscribed,
    OptedOut,
    Bounced,
    Invalid,
}

impl LeadStatus {
    pub const ALL: [LeadStatus; 17] = [
        Self::New,
        Self::Scraped,
        Self::Researched,
        Self::Ready,
        Self::Email1Sent,
        Self::Email2Sent,
        Self::Email3Sent,
        Self::Engaged,
        Self::MeetingNegotiation,
        Self::MeetingBooked,
        Self::MeetingScheduled,
        Self::Converted,
        Self::ClosedLost,
        Self::Unsubscribed,
        Self::OptedOut,
        Self::Bounced,
        Self::Invalid,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::New => "new",
            Self::Scraped => "scraped",
            Self::Researched => "researched",
            Self::Ready => "ready",
            Self::Email1Sent => "email_1_sent",
            Self::Email2Sent => "email_2_sent",
            Self::Email3Sent => "email_3_sent",
            Self::Engaged => "engaged",
            Self::MeetingNegotiation => "meeting_negotiation",
            Self::MeetingBooked => "meeting_booked",
            Self::MeetingScheduled => "meeting_scheduled",
            Self::Converted => "converted",
            Self::ClosedLost => "closed_lost",
            Self::Unsubscribed => "unsubscribed",
            Self::OptedOut => "opted_out",
            Self::Bounced => "bounced",
            Self::Invalid => "invalid",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        let normalized = value.trim().to_ascii_lowercase();
        Self::ALL.into_iter().find(|status| status.as_str() == normalized)
    }

    /// Statuses on the automated sequence path, from `ready` through `email_3_sent`.
    pub fn is_in_sequence(&self) -> bool {
        matches!(self, Self::Ready | Self::Email1Sent | Self::Email2Sent | Self::Email3Sent)
    }

    /// Side states a lead enters once a human has responded.
    pub fn is_conversation(&self) -> bool {
        matches!(
            self,
            Self::Engaged | Self::MeetingNegotiation | Self::MeetingBooked | Self::MeetingScheduled
        )
    }

    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            Self::Converted
                | Self::ClosedLost
                | Self::Unsubscribed
                | Self::OptedOut
                | Self::Bounced
                | Self::Invalid
        )
    }
}

impl std::fmt::Display for LeadStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for LeadStatus {
    type Err = DomainError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        Self::parse(value)
            .ok_or_else(|| DomainError::InvariantViolation(format!("unknown lead status `{value}`")))
    }
}

/// One of the three emails in an outreach sequence.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum EmailStep {
    First,
    Second,
    Third,
}

impl EmailStep {
    pub const ALL: [EmailStep; 3] = [Self::First, Self::Second, Self::Third];

    pub fn number(&self) -> u8 {
        match self {
            Self::First => 1,
            Self::Second => 2,
            Self::Third => 3,
        }
    }

    pub fn from_number(number: u8) -> Option<Self> {
        match number {
            1 => Some(Self::First),
            2 => Some(Self::Second),
            3 => Some(Self::Third),
            _ => None,
        }
    }

    /// Status a lead must hold before this step may be sent.
    pub fn entry_status(&self) -> LeadStatus {
        match self {
            Self::First => LeadStatus::Ready,
            Self::Second => LeadStatus::Email1Sent,
            Self::Third => LeadStatus::Email2Sent,
        }
    }

    /// Status a lead holds after this step has been delivered.
    pub fn sent_status(&self) -> LeadStatus {
        match self {
            Self::First => LeadStatus::Email1Sent,
            Self::Second => LeadStatus::Email2Sent,
            Self::Third => LeadStatus::Email3Sent,
        }
    }

    pub fn previous(&self) -> Option<Self> {
        match self {
            Self::First => None,
            Self::Second => Some(Self::First),
            Self::Third => Some(Self::Second),
        }
    }

    /// Event name written when this step is delivered, e.g. `email_2_sent`.
    pub fn sent_event(&self) -> &'static str {
        self.sent_status().as_str()
    }
}

/// Coarse regional grouping used to shift the sending window. Not a real timezone.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TimezoneBucket {
    Local,
    Apac,
    Europe,
}

const APAC_COUNTRIES: &[&str] = &[
    "australia",
    "new zealand",
    "singapore",
    "japan",
    "south korea",
    "hong kong",
    "india",
    "indonesia",
    "malaysia",
    "philippines",
    "vietnam",
    "thailand",
    "taiwan",
    "china",
];

const EUROPE_COUNTRIES: &[&str] = &[
    "united kingdom",
    "uk",
    "ireland",
    "germany",
    "france",
    "spain",
    "portugal",
    "italy",
    "netherlands",
    "belgium",
    "switzerland",
    "austria",
    "sweden",
    "norway",
    "denmark",
    "finland",
    "poland",
    "czech republic",
];

impl TimezoneBucket {
    pub const ALL: [TimezoneBucket; 3] = [Self::Local, Self::Apac, Self::Europe];

    /// Hours added to the operator's local clock to approximate the bucket's business day.
    pub fn hour_offset(&self) -> i64 {
        match self {
            Self::Local => 0,
            Self::Apac => 14,
            Self::Europe => 5,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Local => "local",
            Self::Apac => "apac",
            Self::Europe => "europe",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value.trim().to_ascii_lowercase().as_str() {
            "local" => Some(Self::Local),
            "apac" | "+14h" => Some(Self::Apac),
            "europe" | "+5h" => Some(Self::Europe),
            _ => None,
        }
    }

    pub fn from_country(country: Option<&str>) -> Self {
        let Some(country) = country.map(|value| value.trim().to_ascii_lowercase()) else {
            return Self::Local;
        };
        if APAC_COUNTRIES.contains(&country.as_str()) {
            Self::Apac
        } else if EUROPE_COUNTRIES.contains(&country.as_str()) {
            Self::Europe
        } else {
            Self::Local
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct EmailDraft {
    pub subject: Option<String>,
    pub body: String,
}

impl EmailDraft {
    pub fn new(subject: Option<String>, body: impl Into<String>) -> Self {
        Self { subject, body: body.into() }
    }

    pub fn is_empty(&self) -> bool {
        self.body.trim().is_empty()
    }
}

/// The three drafted emails. Email 2 is a reply in the same thread and carries no subject.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct EmailSequence {
    pub email_1: EmailDraft,
    pub email_2: EmailDraft,
    pub email_3: EmailDraft,
}

impl EmailSequence {
    pub fn draft(&self, step: EmailStep) -> &EmailDraft {
        match step {
            EmailStep::First => &self.email_1,
            EmailStep::Second => &self.email_2,
            EmailStep::Third => &self.email_3,
        }
    }

    /// Subject used for `step`; follow-ups without their own subject reuse the opener's as `Re:`.
    pub fn subject_for(&self, step: EmailStep) -> String {
        match self.draft(step).subject.as_deref().filter(|subject| !subject.trim().is_empty()) {
            Some(subject) => subject.to_string(),
            None => {
                let opener = self.email_1.subject.as_deref().unwrap_or_default();
                format!("Re: {opener}")
            }
        }
    }

    pub fn is_complete(&self) -> bool {
        let openers_have_subjects = [&self.email_1, &self.email_3]
            .iter()
            .all(|draft| draft.subject.as_deref().is_some_and(|s| !s.trim().is_empty()));
        openers_have_subjects && EmailStep::ALL.iter().all(|step| !self.draft(*step).is_empty())
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Delivery {
    pub sent_at: DateTime<Utc>,
    pub message_id: String,
}

#[derive(Clone, Debug, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct Deliveries {
    pub email_1: Option<Delivery>,
    pub email_2: Option<Delivery>,
    pub email_3: Option<Delivery>,
}

impl Deliveries {
    pub fn get(&self, step: EmailStep) -> Option<&Delivery> {
        match step {
            EmailStep::First => self.email_1.as_ref(),
            EmailStep::Second => self.email_2.as_ref(),
            EmailStep::Third => self.email_3.as_ref(),
        }
    }

    pub fn set(&mut self, step: EmailStep, delivery: Delivery) {
        match step {
            EmailStep::First => self.email_1 = Some(delivery),
            EmailStep::Second => self.email_2 = Some(delivery),
            EmailStep::Third => self.email_3 = Some(delivery),
        }
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Lead {
    pub id: LeadId,
    pub email: String,
    pub profile_url: Option<String>,
    pub name: String,
    pub company: Option<String>,
    pub title: Option<String>,
    pub industry: Option<String>,
    pub location: Option<String>,
    pub country: Option<String>,
    pub seniority: Option<String>,
    pub status: LeadStatus,
    pub research: Option<serde_json::Value>,
    pub researched_at: Option<DateTime<Utc>>,
    pub sequence: Option<EmailSequence>,
    pub sender: Option<String>,
    pub timezone_bucket: Option<TimezoneBucket>,
    pub deliveries: Deliveries,
    pub replied_at: Option<DateTime<Utc>>,
    pub reply_category: Option<ReplyCategory>,
    pub reply_sentiment: Option<Sentiment>,
    pub meeting_at: Option<DateTime<Utc>>,
    pub meeting_outcome: Option<MeetingOutcome>,
    pub error_count: u32,
    pub last_error: Option<String>,
    pub last_error_at: Option<DateTime<Utc>>,
    pub version: u32,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Lead {
    /// A freshly discovered lead. Discovery persists it directly as `scraped`.
    pub fn discovered(email: &str, name: impl Into<String>, now: DateTime<Utc>) -> Self {
        Self {
            id: LeadId::generate(),
            email: normalize_email(email),
            profile_url: None,
            name: name.into(),
            company: None,
            title: None,
            industry: None,
            location: None,
            country: None,
            seniority: None,
            status: LeadStatus::Scraped,
            research: None,
            researched_at: None,
            sequence: None,
            sender: None,
            timezone_bucket: None,
            deliveries: Deliveries::default(),
            replied_at: None,
            reply_category: None,
            reply_sentiment: None,
            meeting_at: None,
            meeting_outcome: None,
            error_count: 0,
            last_error: None,
            last_error_at: None,
            version: 1,
            created_at: now,
            updated_at: now,
        }
    }

    pub fn first_name(&self) -> &str {
        self.name.split_whitespace().next().unwrap_or(self.name.as_str())
    }

    pub fn has_research(&self) -> bool {
        self.research.is_some() && self.researched_at.is_some()
    }

    pub fn is_quarantined(&self, threshold: u32) -> bool {
        self.error_count >= threshold
    }

    /// Checks that the populated content fields agree with the status.
    pub fn check_consistency(&self) -> Result<(), DomainError> {
        let status = self.status;

        if status == LeadStatus::Researched && !self.has_research() {
            return Err(DomainError::InvariantViolation(format!(
                "lead {} is `researched` without enrichment data",
                self.id
            )));
        }

        let drafted = self.sequence.as_ref().is_some_and(|sequence| !sequence.email_1.is_empty());
        if status.is_in_sequence() && !drafted {
            return Err(DomainError::InvariantViolation(format!(
                "lead {} is `{status}` without email 1 content",
                self.id
            )));
        }

        let mut previous: Option<&Delivery> = None;
        for step in EmailStep::ALL {
            let delivery = self.deliveries.get(step);
            if status == step.sent_status() && delivery.is_none() {
                return Err(DomainError::InvariantViolation(format!(
                    "lead {} is `{status}` without a recorded send time for email {}",
                    self.id,
                    step.number()
                )));
            }
            match (previous, delivery) {
                (None, Some(_)) if step != EmailStep::First => {
                    return Err(DomainError::InvariantViolation(format!(
                        "lead {} has email {} sent without email {}",
                        self.id,
                        step.number(),
                        step.number() - 1
                    )));
                }
                (Some(before), Some(current)) if before.sent_at > current.sent_at => {
                    return Err(DomainError::InvariantViolation(format!(
                        "lead {} has email {} timestamped before email {}",
                        self.id,
                        step.number(),
                        step.number() - 1
                    )));
                }
                _ => {}
            }
            previous = delivery;
        }

        Ok(())
    }
}
