use std::collections::VecDeque;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use anyhow::{anyhow, bail, Context, Result};
use async_trait::async_trait;
use reqwest::header::HeaderValue;
use secrecy::{ExposeSecret, SecretString};
use serde::Deserialize;
use serde_json::{json, Value};
use tally_core::config::LlmConfig;
use tracing::{debug, error};
use uuid::Uuid;

use crate::conversation::{Message, ProposedToolCall};
use crate::tools::ToolSpec;

const ANTHROPIC_VERSION: &str = "2023-06-01";

/// One assistant message as produced by the model.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct AssistantTurn {
    pub id: Option<String>,
    pub content: String,
    pub tool_calls: Vec<ProposedToolCall>,
}

impl AssistantTurn {
    pub fn text(content: impl Into<String>) -> Self {
        Self { id: None, content: content.into(), tool_calls: Vec::new() }
    }

    pub fn with_call(mut self, call: ProposedToolCall) -> Self {
        self.tool_calls.push(call);
        self
    }

    pub fn into_message(self) -> Message {
        Message::Assistant {
            id: self.id.unwrap_or_else(|| Uuid::new_v4().to_string()),
            content: self.content,
            tool_calls: self.tool_calls,
        }
    }
}

/// Conversation in, next assistant message out.
#[async_trait]
pub trait ChatModel: Send + Sync {
    async fn invoke(&self, messages: &[Message], tools: &[ToolSpec]) -> Result<AssistantTurn>;
}

/// Replays queued turns and records the conversations it was shown.
#[derive(Clone, Default)]
pub struct ScriptedChatModel {
    turns: Arc<Mutex<VecDeque<AssistantTurn>>>,
    seen: Arc<Mutex<Vec<Vec<Message>>>>,
}

impl ScriptedChatModel {
    pub fn new(turns: impl IntoIterator<Item = AssistantTurn>) -> Self {
        Self { turns: Arc::new(Mutex::new(turns.into_iter().collect())), seen: Arc::default() }
    }

    pub fn push(&self, turn: AssistantTurn) -> &Self {
        match self.turns.lock() {
            Ok(mut turns) => turns.push_back(turn),
            Err(poisoned) => poisoned.into_inner().push_back(turn),
        }
        self
    }

    pub fn invocations(&self) -> Vec<Vec<Message>> {
        match self.seen.lock() {
            Ok(seen) => seen.clone(),
            Err(poisoned) => poisoned.into_inner().clone(),
        }
    }
}

#[async_trait]
impl ChatModel for ScriptedChatModel {
    async fn invoke(&self, messages: &[Message], _tools: &[ToolSpec]) -> Result<AssistantTurn> {
        match self.seen.lock() {
            Ok(mut seen) => seen.push(messages.to_vec()),
            Err(poisoned) => poisoned.into_inner().push(messages.to_vec()),
        }
        let next = match self.turns.lock() {
            Ok(mut turns) => turns.pop_front(),
            Err(poisoned) => poisoned.into_inner().pop_front(),
        };
        next.ok_or_else(|| anyhow!("scripted model has no turns left"))
    }
}

/// Anthropic Messages API binding with tool use.
pub struct AnthropicChatModel {
    http: reqwest::Client,
    api_key: SecretString,
    base_url: String,
    model: String,
    max_tokens: u32,
}

impl AnthropicChatModel {
    pub fn from_config(config: &LlmConfig) -> Result<Self> {
        let api_key = config
            .api_key
            .clone()
            .context("no model API key configured (set TALLY_LLM_API_KEY or ANTHROPIC_API_KEY)")?;
        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .context("failed to build model HTTP client")?;

        Ok(Self {
            http,
            api_key,
            base_url: config.base_url.clone(),
            model: config.model.clone(),
            max_tokens: config.max_tokens,
        })
    }

    pub fn model(&self) -> &str {
        &self.model
    }
}

#[async_trait]
impl ChatModel for AnthropicChatModel {
    async fn invoke(&self, messages: &[Message], tools: &[ToolSpec]) -> Result<AssistantTurn> {
        let body = build_request(&self.model, self.max_tokens, messages, tools);

        let mut api_key = HeaderValue::try_from(self.api_key.expose_secret())
            .context("model API key contains invalid header characters")?;
        api_key.set_sensitive(true);

        debug!(
            event_name = "llm.request.sent",
            model = %self.model,
            messages = messages.len(),
            tools = tools.len(),
            "sending model request"
        );
        let response = self
            .http
            .post(&self.base_url)
            .header("x-api-key", api_key)
            .header("anthropic-version", ANTHROPIC_VERSION)
            .header("content-type", "application/json")
            .json(&body)
            .send()
            .await
            .context("model request failed")?;

        let status = response.status();
        let text = response.text().await.context("failed to read model response")?;
        if !status.is_success() {
            error!(event_name = "llm.request.failed", status = %status, "model API error");
            bail!("model API returned status {status}: {text}");
        }

        let turn = parse_response(&text)?;
        debug!(
            event_name = "llm.response.received",
            tool_calls = turn.tool_calls.len(),
            "model response received"
        );
        Ok(turn)
    }
}

/// Builds a Messages API body. System messages are folded into `system` and
/// consecutive tool results share one user message.
pub fn build_request(
    model: &str,
    max_tokens: u32,
    messages: &[Message],
    tools: &[ToolSpec],
) -> Value {
    let mut system = Vec::new();
    let mut wire: Vec<Value> = Vec::new();

    for message in messages {
        match message {
            Message::System { content } => system.push(content.clone()),
            Message::Human { content } => {
                wire.push(json!({"role": "user", "content": content}));
            }
            Message::Assistant { content, tool_calls, .. } => {
                let mut blocks = Vec::new();
                if !content.is_empty() {
                    blocks.push(json!({"type": "text", "text": content}));
                }
                for call in tool_calls {
                    blocks.push(json!({
                        "type": "tool_use",
                        "id": call.call_id,
                        "name": call.name,
                        "input": call.arguments,
                    }));
                }
                if blocks.is_empty() {
                    blocks.push(json!({"type": "text", "text": "(no content)"}));
                }
                wire.push(json!({"role": "assistant", "content": blocks}));
            }
            Message::ToolResult { call_id, content, is_error, .. } => {
                let block = json!({
                    "type": "tool_result",
                    "tool_use_id": call_id,
                    "content": content,
                    "is_error": is_error,
                });
                match wire.last_mut().and_then(tool_result_blocks) {
                    Some(blocks) => blocks.push(block),
                    None => wire.push(json!({"role": "user", "content": [block]})),
                }
            }
        }
    }

    let mut request = json!({
        "model": model,
        "max_tokens": max_tokens,
        "messages": wire,
    });
    if !system.is_empty() {
        request["system"] = Value::String(system.join("\n\n"));
    }
    if !tools.is_empty() {
        request["tools"] = json!(tools);
    }
    request
}

fn tool_result_blocks(message: &mut Value) -> Option<&mut Vec<Value>> {
    if message.get("role").and_then(Value::as_str) != Some("user") {
        return None;
    }
    let blocks = message.get_mut("content")?.as_array_mut()?;
    let all_results = blocks
        .iter()
        .all(|block| block.get("type").and_then(Value::as_str) == Some("tool_result"));
    all_results.then_some(blocks)
}

#[derive(Debug, Deserialize)]
struct ApiResponse {
    id: Option<String>,
    content: Vec<ContentBlock>,
}

#[derive(Debug, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
enum ContentBlock {
    Text {
        text: String,
    },
    ToolUse {
        id: String,
        name: String,
        input: Value,
    },
    #[serde(other)]
    Other,
}

pub fn parse_response(body: &str) -> Result<AssistantTurn> {
    let response: ApiResponse =
        serde_json::from_str(body).context("model response is not a Messages API object")?;

    let mut text = Vec::new();
    let mut tool_calls = Vec::new();
    for block in response.content {
        match block {
            ContentBlock::Text { text: part } => text.push(part),
            ContentBlock::ToolUse { id, name, input } => {
                let arguments = match input {
                    Value::Object(arguments) => arguments,
                    Value::Null => Default::default(),
                    other => bail!("tool_use `{id}` input must be an object, got {other}"),
                };
                tool_calls.push(ProposedToolCall::new(name, id, arguments));
            }
            ContentBlock::Other => {}
        }
    }

    Ok(AssistantTurn { id: response.id, content: text.join("\n"), tool_calls })
}
