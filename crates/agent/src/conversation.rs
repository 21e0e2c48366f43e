use std::collections::HashSet;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use thiserror::Error;

/// A tool invocation proposed by the model. Never mutated after creation;
/// edits produce a new call with the same `call_id`.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ProposedToolCall {
    pub name: String,
    pub call_id: String,
    #[serde(default)]
    pub arguments: Map<String, Value>,
}

impl ProposedToolCall {
    pub fn new(
        name: impl Into<String>,
        call_id: impl Into<String>,
        arguments: Map<String, Value>,
    ) -> Self {
        Self { name: name.into(), call_id: call_id.into(), arguments }
    }

    /// Returns a copy with `revised` laid over the current arguments.
    pub fn with_revised_arguments(&self, revised: &Map<String, Value>) -> Self {
        let mut arguments = self.arguments.clone();
        for (key, value) in revised {
            arguments.insert(key.clone(), value.clone());
        }
        Self { name: self.name.clone(), call_id: self.call_id.clone(), arguments }
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "role", rename_all = "snake_case")]
pub enum Message {
    System {
        content: String,
    },
    Human {
        content: String,
    },
    Assistant {
        id: String,
        #[serde(default)]
        content: String,
        #[serde(default)]
        tool_calls: Vec<ProposedToolCall>,
    },
    ToolResult {
        call_id: String,
        name: String,
        content: String,
        #[serde(default)]
        is_error: bool,
    },
}

impl Message {
    pub fn system(content: impl Into<String>) -> Self {
        Self::System { content: content.into() }
    }

    pub fn human(content: impl Into<String>) -> Self {
        Self::Human { content: content.into() }
    }

    pub fn tool_result(call: &ProposedToolCall, content: impl Into<String>, is_error: bool) -> Self {
        Self::ToolResult {
            call_id: call.call_id.clone(),
            name: call.name.clone(),
            content: content.into(),
            is_error,
        }
    }

    pub fn role(&self) -> &'static str {
        match self {
            Self::System { .. } => "system",
            Self::Human { .. } => "human",
            Self::Assistant { .. } => "assistant",
            Self::ToolResult { .. } => "tool_result",
        }
    }
}

#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum PairingError {
    #[error("tool result `{call_id}` does not answer a call of the preceding assistant message")]
    OrphanResult { call_id: String },
    #[error("tool call `{call_id}` was answered more than once")]
    DuplicateResult { call_id: String },
    #[error("tool call `{call_id}` was not answered before the conversation moved on")]
    UnansweredCall { call_id: String },
    #[error("pending review `{call_id}` does not match an open call of the latest assistant message")]
    DanglingReview { call_id: String },
}

/// The checkpointable state of one conversation thread.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct ConversationState {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub thread_id: Option<String>,
    pub messages: Vec<Message>,
    #[serde(default)]
    pub pending_review: Option<ProposedToolCall>,
}

impl ConversationState {
    pub fn new(messages: Vec<Message>) -> Self {
        Self { thread_id: None, messages, pending_review: None }
    }

    pub fn with_thread_id(mut self, thread_id: impl Into<String>) -> Self {
        self.thread_id = Some(thread_id.into());
        self
    }

    pub fn push(&mut self, message: Message) {
        self.messages.push(message);
    }

    pub fn last_message(&self) -> Option<&Message> {
        self.messages.last()
    }

    fn latest_assistant_index(&self) -> Option<usize> {
        self.messages.iter().rposition(|message| matches!(message, Message::Assistant { .. }))
    }

    /// Calls of the latest assistant message that have no tool result yet, in
    /// proposal order.
    pub fn open_calls(&self) -> Vec<&ProposedToolCall> {
        let Some(index) = self.latest_assistant_index() else {
            return Vec::new();
        };
        let Message::Assistant { tool_calls, .. } = &self.messages[index] else {
            return Vec::new();
        };
        let answered: HashSet<&str> = self.messages[index + 1..]
            .iter()
            .filter_map(|message| match message {
                Message::ToolResult { call_id, .. } => Some(call_id.as_str()),
                _ => None,
            })
            .collect();
        tool_calls.iter().filter(|call| !answered.contains(call.call_id.as_str())).collect()
    }

    pub fn next_open_call(&self) -> Option<&ProposedToolCall> {
        self.open_calls().into_iter().next()
    }

    /// Rewrites the arguments of `call_id` inside the latest assistant
    /// message, keeping the message id and call id. Returns `false` when the
    /// call is not open.
    pub fn replace_call(&mut self, revised: &ProposedToolCall) -> bool {
        let open = self.open_calls().iter().any(|call| call.call_id == revised.call_id);
        if !open {
            return false;
        }
        let Some(index) = self.latest_assistant_index() else {
            return false;
        };
        if let Message::Assistant { tool_calls, .. } = &mut self.messages[index] {
            if let Some(call) = tool_calls.iter_mut().find(|call| call.call_id == revised.call_id) {
                call.arguments = revised.arguments.clone();
                return true;
            }
        }
        false
    }

    /// Verifies that every tool call is answered exactly once, by results that
    /// sit directly after its assistant message, and that a pending review
    /// points at an open call.
    pub fn check_pairing(&self) -> Result<(), PairingError> {
        let mut expected: Vec<&str> = Vec::new();
        let mut answered: HashSet<&str> = HashSet::new();

        for message in &self.messages {
            match message {
                Message::ToolResult { call_id, .. } => {
                    if !expected.contains(&call_id.as_str()) {
                        return Err(PairingError::OrphanResult { call_id: call_id.clone() });
                    }
                    if !answered.insert(call_id.as_str()) {
                        return Err(PairingError::DuplicateResult { call_id: call_id.clone() });
                    }
                }
                other => {
                    if let Some(open) = expected.iter().find(|id| !answered.contains(*id)) {
                        return Err(PairingError::UnansweredCall { call_id: (*open).to_string() });
                    }
                    expected.clear();
                    answered.clear();
                    if let Message::Assistant { tool_calls, .. } = other {
                        expected = tool_calls.iter().map(|call| call.call_id.as_str()).collect();
                    }
                }
            }
        }

        if let Some(pending) = &self.pending_review {
            let open = self.open_calls().iter().any(|call| call.call_id == pending.call_id);
            if !open {
                return Err(PairingError::DanglingReview { call_id: pending.call_id.clone() });
            }
        }

        Ok(())
    }
}
