use outreach_core::domain::lead::EmailStep;
use outreach_core::errors::PreconditionError;
use outreach_core::pipeline::{StageKind, StageOutcome};
use serde_json::json;

use crate::commands::session::Session;
use crate::commands::{CommandResult, EXIT_COMMAND};

pub fn research(email: &str) -> CommandResult {
    run("research", StageKind::Research, email)
}

pub fn draft(email: &str) -> CommandResult {
    run("draft", StageKind::Outreach, email)
}

pub fn send(email: &str, step: u8) -> CommandResult {
    match EmailStep::from_number(step) {
        Some(step) => run("send", StageKind::Send(step), email),
        None => CommandResult::failure(
            "send",
            "usage",
            format!("--step must be 1, 2 or 3 (got {step})"),
            EXIT_COMMAND,
        ),
    }
}

fn run(command: &str, kind: StageKind, email: &str) -> CommandResult {
    let session = match Session::open(command) {
        Ok(session) => session,
        Err(result) => return result,
    };
    let result = session.block_on(session.pipeline.process_email(kind, email));
    session.close();

    let outcome = match result {
        Ok(outcome) => outcome,
        Err(error) => return CommandResult::from_application_error(command, &error),
    };

    match outcome {
        StageOutcome::Advanced(lead) => CommandResult::success_with(
            command,
            format!("{} is now {}", lead.email, lead.status),
            Some(json!({ "email": lead.email, "status": lead.status.as_str() })),
        ),
        StageOutcome::Skipped(reason) => {
            CommandResult::success_with(command, format!("skipped: {reason}"), None)
        }
        StageOutcome::Rejected(PreconditionError::NotFound(email)) => CommandResult::failure(
            command,
            "not_found",
            format!("no lead found for {email}"),
            EXIT_COMMAND,
        ),
        StageOutcome::Rejected(error) => {
            CommandResult::failure(command, "precondition", error.to_string(), EXIT_COMMAND)
        }
        StageOutcome::Failed(message) => {
            CommandResult::failure(command, "integration", message, EXIT_COMMAND)
        }
    }
}
