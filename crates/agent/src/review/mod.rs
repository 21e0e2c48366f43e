//! Human approval gate for proposed tool calls.
//!
//! `engine::transition` holds the state table; `ReviewGate` applies it to a
//! [`ConversationState`](crate::conversation::ConversationState), routing one
//! open call at a time and reconciling history when a human decides.

pub mod engine;
pub mod gate;
pub mod states;

pub use engine::{transition, ReviewTransitionError};
pub use gate::{parse_decision, Resolution, ReviewDecision, ReviewError, ReviewGate, Route};
pub use states::{ReviewEvent, ReviewState, TransitionOutcome};
