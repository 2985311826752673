//! Operator notifications for the outreach pipeline.
//!
//! Run summaries, reply alerts and meeting alerts are rendered as Block Kit
//! messages (`blocks`) and posted to a Slack incoming webhook (`notifier`).
//! Without a configured webhook the [`LogNotifier`] writes them to the log.

pub mod blocks;
pub mod notifier;

pub use blocks::{notification_message, MessageBuilder, MessageTemplate};
pub use notifier::{notifier_from_config, LogNotifier, SlackWebhookNotifier};
