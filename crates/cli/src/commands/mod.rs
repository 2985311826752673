pub mod batch;
pub mod clear;
pub mod config;
pub mod doctor;
pub mod migrate;
pub mod quarantine;
pub mod queue;
pub mod session;
pub mod stage;

use outreach_core::errors::{ApplicationError, PreconditionError};
use serde::Serialize;

pub const EXIT_CONFIG: u8 = 2;
pub const EXIT_RUNTIME: u8 = 3;
pub const EXIT_DB: u8 = 4;
pub const EXIT_MIGRATION: u8 = 5;
pub const EXIT_COMMAND: u8 = 6;

#[derive(Debug, Clone)]
pub struct CommandResult {
    pub exit_code: u8,
    pub output: String,
}

#[derive(Debug, Serialize)]
struct CommandOutcome<'a> {
    command: &'a str,
    status: &'a str,
    error_class: Option<&'a str>,
    message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    data: Option<serde_json::Value>,
}

impl CommandResult {
    pub fn success(command: &str, message: impl Into<String>) -> Self {
        Self::success_with(command, message, None)
    }

    /// Success carrying a structured `data` payload alongside the message.
    pub fn success_with(
        command: &str,
        message: impl Into<String>,
        data: Option<serde_json::Value>,
    ) -> Self {
        let payload = CommandOutcome {
            command,
            status: "ok",
            error_class: None,
            message: message.into(),
            data,
        };
        Self { exit_code: 0, output: serialize_payload(&payload) }
    }

    pub fn failure(
        command: &str,
        error_class: &str,
        message: impl Into<String>,
        exit_code: u8,
    ) -> Self {
        let payload = CommandOutcome {
            command,
            status: "error",
            error_class: Some(error_class),
            message: message.into(),
            data: None,
        };
        Self { exit_code, output: serialize_payload(&payload) }
    }

    pub fn from_application_error(command: &str, error: &ApplicationError) -> Self {
        let error_class = match error {
            ApplicationError::Precondition(PreconditionError::NotFound(_)) => "not_found",
            ApplicationError::Precondition(_) | ApplicationError::Domain(_) => "precondition",
            ApplicationError::Integration(_) => "integration",
            ApplicationError::Persistence(_) => "persistence",
            ApplicationError::Configuration(_) => "usage",
        };
        Self::failure(command, error_class, error.to_string(), EXIT_COMMAND)
    }
}

fn serialize_payload(payload: &CommandOutcome<'_>) -> String {
    serde_json::to_string(payload).unwrap_or_else(|error| {
        format!(
            "{{\"command\":\"unknown\",\"status\":\"error\",\"error_class\":\"serialization\",\"message\":\"{}\"}}",
            error.to_string().replace('\\', "\\\\").replace('"', "\\\"")
        )
    })
}
