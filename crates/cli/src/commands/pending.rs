use serde_json::json;
use tally_agent::SessionStore;
use tally_core::config::LoadOptions;

use crate::bootstrap;
use crate::commands::{async_runtime, load_config, CommandResult, Failure};

const COMMAND: &str = "pending";

/// Lists threads suspended on a review with the call each one waits on.
pub fn run(options: &LoadOptions) -> CommandResult {
    match execute(options) {
        Ok(result) => result,
        Err(failure) => failure.into_result(COMMAND),
    }
}

fn execute(options: &LoadOptions) -> Result<CommandResult, Failure> {
    let config = load_config(options)?;
    let runtime = async_runtime()?;

    runtime.block_on(async {
        let store = bootstrap::session_store(&config);
        let mut threads = Vec::new();
        for thread_id in store.list().await.map_err(Failure::from_store)? {
            let Some(state) =
                store.load(&thread_id).await.map_err(Failure::from_store)?
            else {
                continue;
            };
            threads.push(json!({"threadId": thread_id, "pendingReview": state.pending_review}));
        }

        Ok::<CommandResult, Failure>(CommandResult::success_with(
            COMMAND,
            format!("{} thread(s) awaiting review", threads.len()),
            Some(json!({"threads": threads})),
        ))
    })
}
