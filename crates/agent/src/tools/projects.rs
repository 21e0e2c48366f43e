use async_trait::async_trait;
use serde_json::{json, Map, Value};

use super::{wire_list, Tool, ToolAccess, ToolContext, ToolError};

pub struct GetProjectsTool;

#[async_trait]
impl Tool for GetProjectsTool {
    fn name(&self) -> &'static str {
        "getProjects"
    }

    fn description(&self) -> &'static str {
        "Lists every project with its project id, project name and client name. \
         Use it to resolve a project id before booking time."
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
        context: &ToolContext,
    ) -> Result<Value, ToolError> {
        let projects = context.client.list_projects().await?;
        Ok(json!({"projects": wire_list(&projects)?}))
    }
}

pub struct GetClientsTool;

#[async_trait]
impl Tool for GetClientsTool {
    fn name(&self) -> &'static str {
        "getClients"
    }

    fn description(&self) -> &'static str {
        "Lists every client together with the projects it owns."
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
        context: &ToolContext,
    ) -> Result<Value, ToolError> {
        let clients = context.client.list_clients().await?;
        Ok(json!({"clients": wire_list(&clients)?}))
    }
}
