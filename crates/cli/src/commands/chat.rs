use std::sync::Arc;

use chrono::Local;
use tally_agent::{AnthropicChatModel, Message, SessionStore};
use tally_core::config::LoadOptions;
use uuid::Uuid;

use crate::bootstrap::{self, TracingAuditSink};
use crate::commands::{async_runtime, load_config, outcome_result, CommandResult, Failure};

const COMMAND: &str = "chat";

/// Starts a thread from one human message. The run either completes or stops
/// at the first call that needs review.
pub fn run(options: &LoadOptions, message: &str, thread_id: Option<String>) -> CommandResult {
    match execute(options, message, thread_id) {
        Ok(result) => result,
        Err(failure) => failure.into_result(COMMAND),
    }
}

fn execute(
    options: &LoadOptions,
    message: &str,
    thread_id: Option<String>,
) -> Result<CommandResult, Failure> {
    if message.trim().is_empty() {
        return Err(Failure::new("invalid_input", "message must not be empty", 2));
    }
    let config = load_config(options)?;
    let thread_id = thread_id.unwrap_or_else(|| Uuid::new_v4().simple().to_string());
    let runtime = async_runtime()?;

    runtime.block_on(async {
        let store = bootstrap::session_store(&config);
        let existing = store.load(&thread_id).await.map_err(Failure::from_store)?;
        if existing.is_some() {
            return Err(Failure::new(
                "review_pending",
                format!("thread `{thread_id}` has a stored checkpoint; resume it first"),
                2,
            ));
        }

        let model = AnthropicChatModel::from_config(&config.llm)
            .map_err(|error| Failure::new("model_unavailable", format!("{error:#}"), 2))?;
        let transport = bootstrap::http_transport(&config)
            .map_err(|error| Failure::new("transport_init", error.to_string(), 3))?;
        let passthrough = bootstrap::query_passthrough(&config.database)
            .await
            .map_err(|error| Failure::new("db_connectivity", error.to_string(), 4))?;
        let system = bootstrap::system_message(&config, Local::now().date_naive())
            .map_err(|error| Failure::new("prompt", error.to_string(), 2))?;

        let agent = bootstrap::build_runtime(
            &config,
            model,
            transport,
            passthrough,
            Arc::new(TracingAuditSink),
        );
        let outcome = agent
            .start_thread(&store, &thread_id, vec![system, Message::human(message)])
            .await
            .map_err(Failure::from_application)?;

        Ok::<CommandResult, Failure>(outcome_result(COMMAND, &thread_id, &outcome))
    })
}
