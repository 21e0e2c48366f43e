//! Conversational time-tracking agent with a human review gate.
//!
//! The runtime loops model turns through the review state machine:
//! read-only tool calls run directly, mutating ones suspend the thread until
//! a human approves, edits, rejects or answers them with feedback. A
//! suspended thread is a serializable `ConversationState` that can be resumed
//! from a `SessionStore` in a later process.

pub mod conversation;
pub mod guardrails;
pub mod llm;
pub mod prompt;
pub mod review;
pub mod runtime;
pub mod session;
pub mod tools;

pub use conversation::{ConversationState, Message, PairingError, ProposedToolCall};
pub use llm::{AnthropicChatModel, AssistantTurn, ChatModel, ScriptedChatModel};
pub use review::{parse_decision, ReviewDecision, ReviewError, ReviewGate};
pub use runtime::{AgentRuntime, OrchestratorError, RunOutcome};
pub use session::{FileSessionStore, InMemorySessionStore, SessionError, SessionStore};
pub use tools::{ToolContext, ToolRegistry};
