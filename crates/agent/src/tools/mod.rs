use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::{Map, Value};
use tally_client::{ApiError, TimeTrackingClient};
use tally_core::domain::time_entry::UserId;
use tally_core::wire::{self, WireRecord};
use tally_db::QueryPassthrough;
use thiserror::Error;
use tracing::{info, warn};

use crate::conversation::{Message, ProposedToolCall};
use crate::guardrails::QueryGuard;

pub mod projects;
pub mod query;
pub mod time_entries;

pub use projects::{GetClientsTool, GetProjectsTool};
pub use query::{ExecuteQueryTool, GetDatabaseSchemaTool};
pub use time_entries::{
    BookTimeEntryTool, DeleteTimeEntryTool, GetTimeEntriesTool, GetTimeEntryTool,
    UpdateTimeEntryTool,
};

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ToolAccess {
    ReadOnly,
    Mutating,
}

/// Dependencies handed to every tool invocation.
#[derive(Clone)]
pub struct ToolContext {
    pub client: TimeTrackingClient,
    pub user_id: UserId,
}

impl ToolContext {
    pub fn new(client: TimeTrackingClient, user_id: UserId) -> Self {
        Self { client, user_id }
    }
}

#[derive(Debug, Error)]
pub enum ToolError {
    #[error(transparent)]
    Api(#[from] ApiError),
    #[error("invalid arguments: {0}")]
    InvalidArguments(String),
    #[error("unknown tool `{0}`")]
    UnknownTool(String),
    #[error("query failed: {0}")]
    Query(String),
}

impl ToolError {
    /// Text placed in the tool result. Carries no wire payloads beyond the
    /// service's own validation message.
    pub fn user_message(&self) -> String {
        match self {
            Self::Api(ApiError::BadRequest { message }) => {
                format!("The time-tracking service rejected the request: {message}")
            }
            Self::Api(ApiError::NotFound) => "The requested record was not found.".to_string(),
            Self::Api(ApiError::UnexpectedResponse { status_code, .. }) => {
                format!("The time-tracking service returned an unexpected status ({status_code}).")
            }
            Self::Api(ApiError::Connection { .. }) => {
                "The time-tracking service could not be reached.".to_string()
            }
            Self::Api(ApiError::Decode(_)) => {
                "The time-tracking service returned data that could not be read.".to_string()
            }
            Self::InvalidArguments(reason) => format!("Invalid arguments: {reason}"),
            Self::UnknownTool(name) => format!("There is no tool named `{name}`."),
            Self::Query(reason) => reason.clone(),
        }
    }

    fn kind(&self) -> &'static str {
        match self {
            Self::Api(_) => "api",
            Self::InvalidArguments(_) => "invalid_arguments",
            Self::UnknownTool(_) => "unknown_tool",
            Self::Query(_) => "query",
        }
    }
}

/// Name, description and JSON schema advertised to the model.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct ToolSpec {
    pub name: String,
    pub description: String,
    pub input_schema: Value,
}

#[async_trait]
pub trait Tool: Send + Sync {
    fn name(&self) -> &'static str;
    fn description(&self) -> &'static str;
    fn input_schema(&self) -> Value;
    fn access(&self) -> ToolAccess;
    async fn invoke(
        &self,
        arguments: &Map<String, Value>,
        context: &ToolContext,
    ) -> Result<Value, ToolError>;
}

/// Decides which calls must wait for a human.
pub trait ReviewPolicy: Send + Sync {
    fn requires_review(&self, tool_name: &str) -> bool;
}

#[derive(Default)]
pub struct ToolRegistry {
    tools: HashMap<String, Box<dyn Tool>>,
}

impl ToolRegistry {
    /// The booking and lookup tools backed by the time-tracking client.
    pub fn time_tracking() -> Self {
        let mut registry = Self::default();
        registry.register(GetProjectsTool);
        registry.register(GetClientsTool);
        registry.register(GetTimeEntriesTool);
        registry.register(GetTimeEntryTool);
        registry.register(BookTimeEntryTool);
        registry.register(UpdateTimeEntryTool);
        registry.register(DeleteTimeEntryTool);
        registry
    }

    /// Adds the schema and query tools over a read-only passthrough.
    pub fn with_query_tools(mut self, passthrough: Arc<dyn QueryPassthrough>) -> Self {
        self.register(GetDatabaseSchemaTool::new(passthrough.clone()));
        self.register(ExecuteQueryTool::new(passthrough, QueryGuard::default()));
        self
    }

    pub fn register<T>(&mut self, tool: T)
    where
        T: Tool + 'static,
    {
        self.tools.insert(tool.name().to_string(), Box::new(tool));
    }

    pub fn len(&self) -> usize {
        self.tools.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tools.is_empty()
    }

    pub fn contains(&self, name: &str) -> bool {
        self.tools.contains_key(name)
    }

    pub fn access(&self, name: &str) -> Option<ToolAccess> {
        self.tools.get(name).map(|tool| tool.access())
    }

    /// Sorted by name so the advertised tool list is stable.
    pub fn specs(&self) -> Vec<ToolSpec> {
        let mut specs: Vec<ToolSpec> = self
            .tools
            .values()
            .map(|tool| ToolSpec {
                name: tool.name().to_string(),
                description: tool.description().to_string(),
                input_schema: tool.input_schema(),
            })
            .collect();
        specs.sort_by(|left, right| left.name.cmp(&right.name));
        specs
    }

    pub async fn invoke(
        &self,
        call: &ProposedToolCall,
        context: &ToolContext,
    ) -> Result<Value, ToolError> {
        let tool =
            self.tools.get(&call.name).ok_or_else(|| ToolError::UnknownTool(call.name.clone()))?;
        tool.invoke(&call.arguments, context).await
    }

    /// Runs `call` and always produces its tool-result message; failures are
    /// reported to the model instead of aborting the conversation.
    pub async fn execute(&self, call: &ProposedToolCall, context: &ToolContext) -> Message {
        match self.invoke(call, context).await {
            Ok(output) => {
                info!(
                    event_name = "tools.call.succeeded",
                    tool = %call.name,
                    call_id = %call.call_id,
                    "tool call succeeded"
                );
                Message::tool_result(call, output.to_string(), false)
            }
            Err(error) => {
                warn!(
                    event_name = "tools.call.failed",
                    tool = %call.name,
                    call_id = %call.call_id,
                    error_kind = error.kind(),
                    error = %error,
                    "tool call failed"
                );
                Message::tool_result(call, error.user_message(), true)
            }
        }
    }
}

impl ReviewPolicy for ToolRegistry {
    /// Mutating tools always wait for a human. Unknown names pass through and
    /// fail at execution.
    fn requires_review(&self, tool_name: &str) -> bool {
        matches!(self.access(tool_name), Some(ToolAccess::Mutating))
    }
}

pub(crate) fn parse_arguments<T: DeserializeOwned>(
    arguments: &Map<String, Value>,
) -> Result<T, ToolError> {
    serde_json::from_value(Value::Object(arguments.clone()))
        .map_err(|error| ToolError::InvalidArguments(error.to_string()))
}

pub(crate) fn wire_value<T: WireRecord>(record: &T) -> Result<Value, ToolError> {
    wire::encode(record)
        .map_err(|error| ToolError::Api(ApiError::BadRequest { message: error.to_string() }))
}

pub(crate) fn wire_list<T: WireRecord>(records: &[T]) -> Result<Value, ToolError> {
    records.iter().map(wire_value).collect::<Result<Vec<_>, _>>().map(Value::Array)
}
