use std::sync::Arc;

use async_trait::async_trait;
use serde::Deserialize;
use serde_json::{json, Map, Value};
use tally_db::QueryPassthrough;

use super::{parse_arguments, Tool, ToolAccess, ToolContext, ToolError};
use crate::guardrails::{QueryDecision, QueryGuard};

pub struct GetDatabaseSchemaTool {
    passthrough: Arc<dyn QueryPassthrough>,
}

impl GetDatabaseSchemaTool {
    pub fn new(passthrough: Arc<dyn QueryPassthrough>) -> Self {
        Self { passthrough }
    }
}

#[async_trait]
impl Tool for GetDatabaseSchemaTool {
    fn name(&self) -> &'static str {
        "getDatabaseSchema"
    }

    fn description(&self) -> &'static str {
        "Returns the tables and columns of the reporting database."
    }

    fn input_schema(&self) -> Value {
        json!({"type": "object", "properties": {}})
    }

    fn access(&self) -> ToolAccess {
        ToolAccess::ReadOnly
    }

    async fn invoke(
        &self,
        _arguments: &Map<String, Value>,
        _context: &ToolContext,
    ) -> Result<Value, ToolError> {
        let tables =
            self.passthrough.schema().await.map_err(|error| ToolError::Query(error.to_string()))?;
        serde_json::to_value(tables)
            .map(|tables| json!({"tables": tables}))
            .map_err(|error| ToolError::Query(error.to_string()))
    }
}

#[derive(Debug, Deserialize)]
struct ExecuteQueryArgs {
    query: String,
}

pub struct ExecuteQueryTool {
    passthrough: Arc<dyn QueryPassthrough>,
    guard: QueryGuard,
}

impl ExecuteQueryTool {
    pub fn new(passthrough: Arc<dyn QueryPassthrough>, guard: QueryGuard) -> Self {
        Self { passthrough, guard }
    }
}

#[async_trait]
impl Tool for ExecuteQueryTool {
    fn name(&self) -> &'static str {
        "executeQuery"
    }

    fn description(&self) -> &'static str {
        "Runs one read-only SQL SELECT statement against the reporting database and returns \
         the rows. Statements that modify data are refused."
    }

    fn input_schema(&self) -> Value {
        json!({
            "type": "object",
            "properties": {"query": {"type": "string", "description": "A single SELECT statement."}},
            "required": ["query"]
        })
    }

    fn access(&self) -> ToolAccess {
        ToolAccess::ReadOnly
    }

    async fn invoke(
        &self,
        arguments: &Map<String, Value>,
        _context: &ToolContext,
    ) -> Result<Value, ToolError> {
        let args: ExecuteQueryArgs = parse_arguments(arguments)?;
        if let QueryDecision::Deny { reason_code, user_message } = self.guard.evaluate(&args.query)
        {
            tracing::warn!(
                event_name = "tools.execute_query.denied",
                reason_code,
                "query refused by guard"
            );
            return Err(ToolError::Query(user_message));
        }

        let result = self
            .passthrough
            .execute(&args.query)
            .await
            .map_err(|error| ToolError::Query(format!("The query could not be run: {error}")))?;
        let mut output = json!({"rowCount": result.rows.len(), "rows": result.rows});
        if result.truncated {
            output["truncated"] = json!(true);
        }
        Ok(output)
    }
}
