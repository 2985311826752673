use serde_json::json;

use crate::commands::session::Session;
use crate::commands::{CommandResult, EXIT_COMMAND};

/// Lists leads that have recorded errors, most errors first.
pub fn run(limit: u32) -> CommandResult {
    let session = match Session::open("quarantine") {
        Ok(session) => session,
        Err(result) => return result,
    };
    let threshold = session.config.pipeline.quarantine_threshold;

    let result = session.block_on(session.pipeline.leads_with_errors(limit));
    session.close();

    let leads = match result {
        Ok(leads) => leads,
        Err(error) => {
            return CommandResult::failure(
                "quarantine",
                "persistence",
                error.to_string(),
                EXIT_COMMAND,
            )
        }
    };

    let quarantined = leads.iter().filter(|lead| lead.is_quarantined(threshold)).count();
    let rows: Vec<_> = leads
        .iter()
        .map(|lead| {
            json!({
                "email": lead.email,
                "status": lead.status.as_str(),
                "error_count": lead.error_count,
                "quarantined": lead.is_quarantined(threshold),
                "last_error": lead.last_error,
                "last_error_at": lead.last_error_at,
            })
        })
        .collect();

    CommandResult::success_with(
        "quarantine",
        format!("{} leads with errors, {quarantined} at or above threshold {threshold}", leads.len()),
        Some(json!({ "leads": rows })),
    )
}
