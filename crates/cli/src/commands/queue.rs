use crate::commands::session::Session;
use crate::commands::{CommandResult, EXIT_COMMAND};

pub fn run() -> CommandResult {
    let session = match Session::open("queue") {
        Ok(session) => session,
        Err(result) => return result,
    };

    let result = session.block_on(session.pipeline.queue());
    session.close();

    match result {
        Ok(view) => {
            let message = format!("{} leads, {} quarantined", view.total, view.quarantined);
            CommandResult::success_with("queue", message, serde_json::to_value(&view).ok())
        }
        Err(error) => {
            CommandResult::failure("queue", "persistence", error.to_string(), EXIT_COMMAND)
        }
    }
}
