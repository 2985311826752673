use outreach_core::domain::lead::EmailStep;
use outreach_core::pipeline::{BatchLimits, StageKind};

use crate::commands::session::Session;
use crate::commands::{CommandResult, EXIT_COMMAND};

/// Runs one stage as a batch. Without `limit` the standard batch size applies.
pub fn run(stage: &str, limit: Option<u32>) -> CommandResult {
    let Some(kind) = StageKind::parse(stage) else {
        return CommandResult::failure(
            "batch",
            "usage",
            format!("unknown stage `{stage}` (expected discovery|research|outreach|send-1|send-2|send-3)"),
            EXIT_COMMAND,
        );
    };
    let limit = limit.unwrap_or_else(|| default_limit(kind, BatchLimits::standard()));

    let session = match Session::open("batch") {
        Ok(session) => session,
        Err(result) => return result,
    };
    let result = session.block_on(session.pipeline.run_batch(kind, limit));
    session.close();

    match result {
        Ok(report) => {
            let message = format!(
                "{}: {} ok, {} failed, {} skipped",
                report.stage, report.successful, report.failed, report.skipped
            );
            let data = serde_json::to_value(&report).ok();
            if report.errors.is_empty() {
                CommandResult::success_with("batch", message, data)
            } else {
                let errors = report.errors.join("; ");
                CommandResult::failure("batch", "batch_errors", format!("{message}: {errors}"), EXIT_COMMAND)
            }
        }
        Err(error) => CommandResult::from_application_error("batch", &error),
    }
}

fn default_limit(kind: StageKind, limits: BatchLimits) -> u32 {
    match kind {
        StageKind::Discovery => limits.discovery,
        StageKind::Research => limits.research,
        StageKind::Outreach => limits.outreach,
        StageKind::Send(EmailStep::First) => limits.sending,
        StageKind::Send(_) => limits.follow_up,
    }
}
