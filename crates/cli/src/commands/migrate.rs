use crate::commands::session::{connect_and_migrate, current_thread_runtime, load_config};
use crate::commands::CommandResult;

pub fn run() -> CommandResult {
    let config = match load_config("migrate") {
        Ok(config) => config,
        Err(result) => return result,
    };
    let runtime = match current_thread_runtime("migrate") {
        Ok(runtime) => runtime,
        Err(result) => return result,
    };

    let result = runtime.block_on(async {
        let pool = connect_and_migrate("migrate", &config).await?;
        pool.close().await;
        Ok::<(), CommandResult>(())
    });

    match result {
        Ok(()) => CommandResult::success("migrate", "applied pending migrations"),
        Err(failure) => failure,
    }
}
