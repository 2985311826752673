use outreach_core::domain::lead::LeadStatus;
use serde_json::json;

use crate::commands::session::Session;
use crate::commands::{CommandResult, EXIT_COMMAND};

/// Resets a lead's error count, optionally moving it back to `status`.
pub fn run(email: &str, status: Option<&str>) -> CommandResult {
    let reset_to = match status.map(|value| (value, LeadStatus::parse(value))) {
        None => None,
        Some((_, Some(status))) => Some(status),
        Some((value, None)) => {
            return CommandResult::failure(
                "clear",
                "usage",
                format!("unknown lead status `{value}`"),
                EXIT_COMMAND,
            )
        }
    };

    let session = match Session::open("clear") {
        Ok(session) => session,
        Err(result) => return result,
    };
    let result = session.block_on(session.pipeline.clear_errors(email, reset_to));
    session.close();

    match result {
        Ok(lead) => CommandResult::success_with(
            "clear",
            format!("cleared errors for {} ({})", lead.email, lead.status),
            Some(json!({ "email": lead.email, "status": lead.status.as_str() })),
        ),
        Err(error) => CommandResult::from_application_error("clear", &error),
    }
}
