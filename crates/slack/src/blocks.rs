use outreach_core::chrono::{DateTime, Utc};
use outreach_core::domain::reply::ReplyCategory;
use outreach_core::pipeline::report::RunSummary;
use outreach_core::ports::Notification;
use serde::Serialize;

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum TextObject {
    #[serde(rename = "plain_text")]
    Plain { text: String },
    Mrkdwn { text: String },
}

impl TextObject {
    pub fn plain(text: impl Into<String>) -> Self {
        Self::Plain { text: text.into() }
    }

    pub fn mrkdwn(text: impl Into<String>) -> Self {
        Self::Mrkdwn { text: text.into() }
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Block {
    Header { block_id: String, text: TextObject },
    Section { block_id: String, text: TextObject },
    Context { block_id: String, elements: Vec<TextObject> },
    Divider { block_id: String },
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct MessageTemplate {
    #[serde(rename = "text")]
    pub fallback_text: String,
    pub blocks: Vec<Block>,
}

pub struct MessageBuilder {
    fallback_text: String,
    blocks: Vec<Block>,
}

impl MessageBuilder {
    pub fn new(fallback_text: impl Into<String>) -> Self {
        Self { fallback_text: fallback_text.into(), blocks: Vec::new() }
    }

    pub fn header(mut self, block_id: impl Into<String>, text: impl Into<String>) -> Self {
        self.blocks.push(Block::Header { block_id: block_id.into(), text: TextObject::plain(text) });
        self
    }

    pub fn section<F>(mut self, block_id: impl Into<String>, build: F) -> Self
    where
        F: FnOnce(&mut SectionBuilder),
    {
        let mut builder = SectionBuilder::default();
        build(&mut builder);
        self.blocks.push(Block::Section { block_id: block_id.into(), text: builder.build() });
        self
    }

    pub fn context<F>(mut self, block_id: impl Into<String>, build: F) -> Self
    where
        F: FnOnce(&mut ContextBuilder),
    {
        let mut builder = ContextBuilder::default();
        build(&mut builder);
        self.blocks.push(Block::Context { block_id: block_id.into(), elements: builder.build() });
        self
    }

    pub fn divider(mut self, block_id: impl Into<String>) -> Self {
        self.blocks.push(Block::Divider { block_id: block_id.into() });
        self
    }

    pub fn build(self) -> MessageTemplate {
        MessageTemplate { fallback_text: self.fallback_text, blocks: self.blocks }
    }
}

#[derive(Default)]
pub struct SectionBuilder {
    text: Option<TextObject>,
}

impl SectionBuilder {
    pub fn plain(&mut self, text: impl Into<String>) -> &mut Self {
        self.text = Some(TextObject::plain(text));
        self
    }

    pub fn mrkdwn(&mut self, text: impl Into<String>) -> &mut Self {
        self.text = Some(TextObject::mrkdwn(text));
        self
    }

    fn build(self) -> TextObject {
        self.text.unwrap_or_else(|| TextObject::plain(""))
    }
}

#[derive(Default)]
pub struct ContextBuilder {
    elements: Vec<TextObject>,
}

impl ContextBuilder {
    pub fn plain(&mut self, text: impl Into<String>) -> &mut Self {
        self.elements.push(TextObject::plain(text));
        self
    }

    pub fn mrkdwn(&mut self, text: impl Into<String>) -> &mut Self {
        self.elements.push(TextObject::mrkdwn(text));
        self
    }

    fn build(self) -> Vec<TextObject> {
        self.elements
    }
}

pub fn notification_message(notification: &Notification) -> MessageTemplate {
    match notification {
        Notification::RunSummary(summary) => run_summary_message(summary),
        Notification::ReplyReceived { email, name, company, category, summary } => {
            reply_alert_message(email, name, company.as_deref(), *category, summary.as_deref())
        }
        Notification::MeetingBooked { email, name, company, scheduled_at } => {
            meeting_booked_message(email, name, company.as_deref(), *scheduled_at)
        }
    }
}

pub fn run_summary_message(summary: &RunSummary) -> MessageTemplate {
    let status = if summary.has_errors() { "with errors" } else { "ok" };
    let fallback = format!(
        "Outreach {} run finished {status}: {} processed, {} failed",
        summary.kind.as_str(),
        summary.processed(),
        summary.failed()
    );

    let stage_lines = summary
        .stages
        .iter()
        .filter(|stage| !stage.is_noop())
        .map(|stage| {
            format!(
                "• *{}*: {} ok · {} failed · {} skipped",
                stage.stage, stage.successful, stage.failed, stage.skipped
            )
        })
        .collect::<Vec<_>>();
    let stage_text = if stage_lines.is_empty() {
        "Nothing to do this run.".to_string()
    } else {
        stage_lines.join("\n")
    };

    let mut builder = MessageBuilder::new(fallback)
        .header(
            "outreach.run.header.v1",
            format!("Outreach {} run ({status})", summary.kind.as_str()),
        )
        .section("outreach.run.stages.v1", |section| {
            section.mrkdwn(stage_text);
        });

    let (errors, omitted) = summary.capped_errors();
    if !errors.is_empty() {
        let mut text = format!(
            ":warning: *Errors*\n{}",
            errors.iter().map(|error| format!("• {error}")).collect::<Vec<_>>().join("\n")
        );
        if omitted > 0 {
            text.push_str(&format!("\n_…and {omitted} more_"));
        }
        builder = builder.divider("outreach.run.divider.v1").section(
            "outreach.run.errors.v1",
            |section| {
                section.mrkdwn(text);
            },
        );
    }

    builder
        .context("outreach.run.context.v1", |context| {
            context.plain(format!(
                "Started {} · took {:.1}s",
                summary.started_at.format("%Y-%m-%d %H:%M UTC"),
                summary.duration.as_secs_f64()
            ));
        })
        .build()
}

fn category_emoji(category: ReplyCategory) -> &'static str {
    match category {
        ReplyCategory::Interested | ReplyCategory::MeetingRequest => ":fire:",
        ReplyCategory::Question => ":speech_balloon:",
        ReplyCategory::NotNow => ":hourglass:",
        ReplyCategory::NotInterested | ReplyCategory::Unsubscribe => ":no_entry:",
        ReplyCategory::OutOfOffice => ":palm_tree:",
        ReplyCategory::Bounce => ":boom:",
    }
}

fn who(name: &str, email: &str, company: Option<&str>) -> String {
    match company {
        Some(company) => format!("*{name}* ({company}) <mailto:{email}|{email}>"),
        None => format!("*{name}* <mailto:{email}|{email}>"),
    }
}

pub fn reply_alert_message(
    email: &str,
    name: &str,
    company: Option<&str>,
    category: ReplyCategory,
    summary: Option<&str>,
) -> MessageTemplate {
    let label = category.as_str().replace('_', " ");
    MessageBuilder::new(format!("Reply from {name} <{email}>: {label}"))
        .section("outreach.reply.summary.v1", |section| {
            section.mrkdwn(format!(
                "{} {} replied: *{label}*",
                category_emoji(category),
                who(name, email, company)
            ));
        })
        .context("outreach.reply.context.v1", |context| {
            context.plain(summary.unwrap_or("No summary available."));
        })
        .build()
}

pub fn meeting_booked_message(
    email: &str,
    name: &str,
    company: Option<&str>,
    scheduled_at: DateTime<Utc>,
) -> MessageTemplate {
    let when = scheduled_at.format("%a %d %b %Y, %H:%M UTC").to_string();
    MessageBuilder::new(format!("Meeting booked with {name} <{email}> for {when}"))
        .section("outreach.meeting.summary.v1", |section| {
            section.mrkdwn(format!(":calendar: Meeting booked with {}", who(name, email, company)));
        })
        .context("outreach.meeting.context.v1", |context| {
            context.plain(format!("Scheduled for {when}"));
        })
        .build()
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use outreach_core::chrono::{TimeZone, Utc};
    use outreach_core::domain::reply::ReplyCategory;
    use outreach_core::pipeline::report::{BatchReport, RunKind, RunSummary};
    use outreach_core::ports::Notification;
    use serde_json::json;

    use super::{
        meeting_booked_message, notification_message, reply_alert_message, run_summary_message,
        Block, MessageBuilder, TextObject,
    };

    fn summary_with_errors(count: usize) -> RunSummary {
        let started_at = Utc.with_ymd_and_hms(2026, 3, 2, 10, 0, 0).single().expect("timestamp");
        let mut summary = RunSummary::new(RunKind::Pipeline, started_at);
        summary.duration = Duration::from_millis(2_500);
        let mut research = BatchReport::empty("research");
        research.record_success();
        for index in 0..count {
            research.record_failure(&format!("lead-{index}@x.test"), "timeout");
        }
        summary.stages.push(research);
        summary.stages.push(BatchReport::empty("sending"));
        summary
    }

    #[test]
    fn message_builder_creates_typed_block_structure() {
        let message = MessageBuilder::new("fallback")
            .header("run.header.v1", "Header")
            .section("run.summary.v1", |section| {
                section.mrkdwn("*Summary*");
            })
            .build();

        assert_eq!(message.blocks.len(), 2);
        assert!(matches!(
            &message.blocks[1],
            Block::Section { block_id, text: TextObject::Mrkdwn { .. } } if block_id == "run.summary.v1"
        ));
    }

    #[test]
    fn serializes_to_slack_block_kit_shape() {
        let message = MessageBuilder::new("hello")
            .section("a.v1", |section| {
                section.plain("plain");
            })
            .build();
        let value = serde_json::to_value(&message).expect("serialize");
        assert_eq!(
            value,
            json!({
                "text": "hello",
                "blocks": [
                    { "type": "section", "block_id": "a.v1", "text": { "type": "plain_text", "text": "plain" } }
                ]
            })
        );
    }

    #[test]
    fn run_summary_lists_active_stages_and_caps_errors() {
        let message = run_summary_message(&summary_with_errors(12));
        assert!(message.fallback_text.contains("with errors"));

        let stages = message.blocks.iter().find_map(|block| match block {
            Block::Section { block_id, text: TextObject::Mrkdwn { text } }
                if block_id == "outreach.run.stages.v1" =>
            {
                Some(text.clone())
            }
            _ => None,
        });
        let stages = stages.expect("stages section");
        assert!(stages.contains("*research*: 1 ok · 12 failed · 0 skipped"));
        assert!(!stages.contains("sending"));

        let errors = message.blocks.iter().find_map(|block| match block {
            Block::Section { block_id, text: TextObject::Mrkdwn { text } }
                if block_id == "outreach.run.errors.v1" =>
            {
                Some(text.clone())
            }
            _ => None,
        });
        let errors = errors.expect("errors section");
        assert_eq!(errors.matches("• ").count(), 10);
        assert!(errors.contains("and 2 more"));
    }

    #[test]
    fn clean_run_has_no_error_section() {
        let message = run_summary_message(&summary_with_errors(0));
        assert!(message.fallback_text.contains("finished ok"));
        assert!(!message.blocks.iter().any(
            |block| matches!(block, Block::Section { block_id, .. } if block_id == "outreach.run.errors.v1")
        ));
    }

    #[test]
    fn reply_and_meeting_alerts_name_the_lead() {
        let reply = reply_alert_message(
            "ada@example.com",
            "Ada Lovelace",
            Some("Analytical Engines"),
            ReplyCategory::MeetingRequest,
            Some("Wants a call"),
        );
        assert_eq!(reply.fallback_text, "Reply from Ada Lovelace <ada@example.com>: meeting request");
        assert!(matches!(
            &reply.blocks[1],
            Block::Context { elements, .. }
                if matches!(elements.first(), Some(TextObject::Plain { text }) if text == "Wants a call")
        ));

        let at = Utc.with_ymd_and_hms(2026, 3, 4, 15, 30, 0).single().expect("timestamp");
        let meeting = meeting_booked_message("ada@example.com", "Ada Lovelace", None, at);
        assert!(meeting.fallback_text.ends_with("Wed 04 Mar 2026, 15:30 UTC"));

        let via_notification = notification_message(&Notification::MeetingBooked {
            email: "ada@example.com".to_string(),
            name: "Ada Lovelace".to_string(),
            company: None,
            scheduled_at: at,
        });
        assert_eq!(via_notification, meeting);
    }
}
