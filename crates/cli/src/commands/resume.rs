use std::sync::Arc;

use serde_json::Value;
use tally_agent::{parse_decision, AnthropicChatModel, ReviewDecision, SessionStore};
use tally_core::config::LoadOptions;

use crate::bootstrap::{self, TracingAuditSink};
use crate::commands::{async_runtime, load_config, outcome_result, CommandResult, Failure};

const COMMAND: &str = "resume";

/// Applies a human decision to a suspended thread, e.g.
/// `{"action":"edit","revised_arguments":{"hours":4}}`.
pub fn run(options: &LoadOptions, thread_id: &str, decision: &str) -> CommandResult {
    match execute(options, thread_id, decision) {
        Ok(result) => result,
        Err(failure) => failure.into_result(COMMAND),
    }
}

pub fn decode_decision(raw: &str) -> Result<ReviewDecision, String> {
    let value: Value =
        serde_json::from_str(raw).map_err(|error| format!("decision is not valid JSON: {error}"))?;
    parse_decision(&value).map_err(|error| error.to_string())
}

fn execute(options: &LoadOptions, thread_id: &str, raw: &str) -> Result<CommandResult, Failure> {
    let decision =
        decode_decision(raw).map_err(|message| Failure::new("malformed_decision", message, 2))?;
    let config = load_config(options)?;
    let runtime = async_runtime()?;

    runtime.block_on(async {
        let store = bootstrap::session_store(&config);
        let suspended = store.load(thread_id).await.map_err(Failure::from_store)?;
        if suspended.is_none() {
            return Err(Failure::new(
                "thread_not_found",
                format!("no suspended review found for thread `{thread_id}`"),
                4,
            ));
        }

        let model = AnthropicChatModel::from_config(&config.llm)
            .map_err(|error| Failure::new("model_unavailable", format!("{error:#}"), 2))?;
        let transport = bootstrap::http_transport(&config)
            .map_err(|error| Failure::new("transport_init", error.to_string(), 3))?;
        let passthrough = bootstrap::query_passthrough(&config.database)
            .await
            .map_err(|error| Failure::new("db_connectivity", error.to_string(), 4))?;

        let agent = bootstrap::build_runtime(
            &config,
            model,
            transport,
            passthrough,
            Arc::new(TracingAuditSink),
        );
        let outcome = agent
            .resume_thread(&store, thread_id, decision)
            .await
            .map_err(Failure::from_application)?;

        Ok::<CommandResult, Failure>(outcome_result(COMMAND, thread_id, &outcome))
    })
}
