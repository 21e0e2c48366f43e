pub mod chat;
pub mod config;
pub mod pending;
pub mod resume;

use serde::Serialize;
use serde_json::{json, Value};
use tally_agent::{OrchestratorError, RunOutcome, SessionError};
use tally_core::config::{AppConfig, LoadOptions};
use tally_core::errors::{ApplicationError, InterfaceError};
use uuid::Uuid;

#[derive(Debug, Clone)]
pub struct CommandResult {
    pub exit_code: u8,
    pub output: String,
}

#[derive(Debug, Serialize)]
struct CommandOutcome {
    command: String,
    status: String,
    error_class: Option<String>,
    message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    details: Option<Value>,
}

impl CommandResult {
    pub fn success_with(command: &str, message: impl Into<String>, details: Option<Value>) -> Self {
        let payload = CommandOutcome {
            command: command.to_string(),
            status: "ok".to_string(),
            error_class: None,
            message: message.into(),
            details,
        };
        Self { exit_code: 0, output: serialize_payload(payload) }
    }

    pub fn failure(
        command: &str,
        error_class: &str,
        message: impl Into<String>,
        exit_code: u8,
    ) -> Self {
        let payload = CommandOutcome {
            command: command.to_string(),
            status: "error".to_string(),
            error_class: Some(error_class.to_string()),
            message: message.into(),
            details: None,
        };
        Self { exit_code, output: serialize_payload(payload) }
    }
}

fn serialize_payload(payload: CommandOutcome) -> String {
    serde_json::to_string(&payload).unwrap_or_else(|error| {
        format!(
            "{{\"command\":\"unknown\",\"status\":\"error\",\"error_class\":\"serialization\",\"message\":\"{}\"}}",
            error.to_string().replace('\\', "\\\\").replace('"', "\\\"")
        )
    })
}

/// A command that stopped early; carried through `?` inside command bodies.
#[derive(Debug)]
pub(crate) struct Failure {
    error_class: &'static str,
    message: String,
    exit_code: u8,
}

impl Failure {
    pub(crate) fn new(error_class: &'static str, message: impl Into<String>, exit_code: u8) -> Self {
        Self { error_class, message: message.into(), exit_code }
    }

    /// Maps a workflow error to a user-safe failure with a fresh correlation id.
    pub(crate) fn from_application(error: impl Into<ApplicationError>) -> Self {
        let correlation_id = Uuid::new_v4().to_string();
        let application: ApplicationError = error.into();
        let interface = application.into_interface(correlation_id);
        let (error_class, exit_code, message) = match &interface {
            InterfaceError::BadRequest { message, .. } => ("workflow", 4, message.clone()),
            InterfaceError::ServiceUnavailable { .. } => {
                ("service_unavailable", 5, interface.user_message().to_string())
            }
            InterfaceError::Internal { .. } => ("internal", 6, interface.user_message().to_string()),
        };
        tracing::warn!(
            event_name = "cli.command.failed",
            error_class,
            correlation_id = interface.correlation_id(),
            error = %interface,
            "command failed"
        );
        Self::new(
            error_class,
            format!("{message} (correlation id {})", interface.correlation_id()),
            exit_code,
        )
    }

    pub(crate) fn from_store(error: SessionError) -> Self {
        Self::from_application(OrchestratorError::Store(error))
    }

    pub(crate) fn into_result(self, command: &str) -> CommandResult {
        CommandResult::failure(command, self.error_class, self.message, self.exit_code)
    }
}

pub(crate) fn load_config(options: &LoadOptions) -> Result<AppConfig, Failure> {
    AppConfig::load(options.clone())
        .map_err(|error| Failure::new("config_validation", format!("configuration issue: {error}"), 2))
}

pub(crate) fn async_runtime() -> Result<tokio::runtime::Runtime, Failure> {
    tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
        .map_err(|error| {
            Failure::new("runtime_init", format!("failed to initialize async runtime: {error}"), 3)
        })
}

/// Success payload for a run that either finished or stopped for review.
pub(crate) fn outcome_result(command: &str, thread_id: &str, outcome: &RunOutcome) -> CommandResult {
    match outcome {
        RunOutcome::Completed(_) => CommandResult::success_with(
            command,
            outcome.final_reply().unwrap_or_default(),
            Some(json!({"threadId": thread_id, "state": "completed"})),
        ),
        RunOutcome::AwaitingReview(state) => {
            let pending = state.pending_review.as_ref();
            let message = match pending {
                Some(call) => format!(
                    "awaiting review of `{}` (call {}); resume with `tally resume {thread_id} --decision '<json>'`",
                    call.name, call.call_id
                ),
                None => "awaiting review".to_string(),
            };
            CommandResult::success_with(
                command,
                message,
                Some(json!({
                    "threadId": thread_id,
                    "state": "awaiting_review",
                    "reply": outcome.final_reply(),
                    "pendingReview": pending,
                })),
            )
        }
    }
}
