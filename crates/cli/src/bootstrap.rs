use std::sync::Arc;
use std::time::Duration;

use chrono::NaiveDate;
use tally_agent::prompt::{load_template, render_system_prompt, PromptError};
use tally_agent::{AgentRuntime, ChatModel, FileSessionStore, Message, ToolContext, ToolRegistry};
use tally_client::{HttpTransport, ReqwestTransport, TimeTrackingClient, TransportError};
use tally_core::audit::{AuditEvent, AuditSink};
use tally_core::config::{AppConfig, DatabaseConfig};
use tally_core::domain::time_entry::UserId;
use tally_db::{connect_read_only, PassthroughError, QueryPassthrough, SqlQueryPassthrough};
use tracing::info;

/// Writes audit events to the log stream.
#[derive(Clone, Copy, Debug, Default)]
pub struct TracingAuditSink;

impl AuditSink for TracingAuditSink {
    fn emit(&self, event: AuditEvent) {
        info!(
            event_name = "audit.recorded",
            audit_event = %event.event_type,
            category = ?event.category,
            outcome = ?event.outcome,
            actor = %event.actor,
            thread_id = event.thread_id.as_deref().unwrap_or("-"),
            call_id = event.call_id.as_deref().unwrap_or("-"),
            correlation_id = %event.correlation_id,
            metadata = ?event.metadata,
            "audit event"
        );
    }
}

pub fn http_transport(config: &AppConfig) -> Result<Arc<dyn HttpTransport>, TransportError> {
    let transport = ReqwestTransport::new(
        config.api.base_url.clone(),
        Duration::from_secs(config.api.timeout_secs),
    )?;
    Ok(Arc::new(transport))
}

/// Opens the reporting database read-only when one is configured.
pub async fn query_passthrough(
    config: &DatabaseConfig,
) -> Result<Option<Arc<dyn QueryPassthrough>>, PassthroughError> {
    let Some(url) = config.url.as_deref() else {
        return Ok(None);
    };
    let pool = connect_read_only(url, config.max_connections, config.timeout_secs).await?;
    Ok(Some(Arc::new(SqlQueryPassthrough::new(pool))))
}

pub fn build_runtime<M: ChatModel>(
    config: &AppConfig,
    model: M,
    transport: Arc<dyn HttpTransport>,
    passthrough: Option<Arc<dyn QueryPassthrough>>,
    audit: Arc<dyn AuditSink>,
) -> AgentRuntime<M> {
    let registry = match passthrough {
        Some(passthrough) => ToolRegistry::time_tracking().with_query_tools(passthrough),
        None => ToolRegistry::time_tracking(),
    };
    let context = ToolContext::new(
        TimeTrackingClient::new(transport),
        UserId(config.api.user_id.clone()),
    );
    AgentRuntime::new(model, Arc::new(registry), context, audit)
        .with_max_steps(config.agent.max_steps)
}

pub fn session_store(config: &AppConfig) -> FileSessionStore {
    FileSessionStore::new(config.agent.session_dir.clone())
}

pub fn system_message(config: &AppConfig, today: NaiveDate) -> Result<Message, PromptError> {
    let template = load_template(config.agent.prompt_path.as_deref())?;
    let prompt = render_system_prompt(&template, today, &UserId(config.api.user_id.clone()))?;
    Ok(Message::system(prompt))
}
