use std::sync::Arc;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use tally_core::audit::{AuditCategory, AuditEvent, AuditOutcome, AuditSink};
use thiserror::Error;
use tracing::info;
use uuid::Uuid;

use crate::conversation::{ConversationState, Message, ProposedToolCall};
use crate::review::engine::{transition, ReviewTransitionError};
use crate::review::states::{ReviewEvent, ReviewState};
use crate::tools::ReviewPolicy;

const SKIPPED_CALL_MESSAGE: &str =
    "Not executed: the reviewer declined another call proposed in the same turn.";

/// What the orchestrator should do next for the latest assistant message.
#[derive(Clone, Debug, PartialEq)]
pub enum Route {
    Terminal,
    Execute(ProposedToolCall),
    Review(ProposedToolCall),
    ResumeModel,
}

/// Continuation after a human decision.
#[derive(Clone, Debug, PartialEq)]
pub enum Resolution {
    Execute(ProposedToolCall),
    ResumeModel,
}

/// A human decision on the pending call, tagged by `action` on the wire.
/// `continue`, `update` and `cancel` are accepted for older review surfaces.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "action", rename_all = "snake_case")]
pub enum ReviewDecision {
    #[serde(alias = "continue")]
    Approve,
    #[serde(alias = "update")]
    Edit {
        #[serde(alias = "data", alias = "revisedArguments")]
        revised_arguments: Map<String, Value>,
    },
    #[serde(alias = "cancel")]
    Reject {
        #[serde(default = "default_reject_reason", alias = "data")]
        reason: String,
    },
    Feedback {
        #[serde(alias = "data")]
        message: String,
    },
}

fn default_reject_reason() -> String {
    "The reviewer cancelled this action.".to_string()
}

impl ReviewDecision {
    pub fn event(&self) -> ReviewEvent {
        match self {
            Self::Approve => ReviewEvent::Approved,
            Self::Edit { .. } => ReviewEvent::Edited,
            Self::Reject { .. } => ReviewEvent::Rejected,
            Self::Feedback { .. } => ReviewEvent::FeedbackGiven,
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            Self::Approve => "approve",
            Self::Edit { .. } => "edit",
            Self::Reject { .. } => "reject",
            Self::Feedback { .. } => "feedback",
        }
    }
}

#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum ReviewError {
    #[error("malformed review decision: {0}")]
    MalformedDecision(String),
    #[error("no review is pending")]
    NoPendingReview,
    #[error("a review is already pending for call `{call_id}`")]
    ReviewAlreadyPending { call_id: String },
    #[error("pending call `{call_id}` is no longer open in the conversation")]
    StaleReview { call_id: String },
    #[error(transparent)]
    Transition(#[from] ReviewTransitionError),
}

/// Parses a decision from the review surface. Unknown actions fail loudly.
pub fn parse_decision(value: &Value) -> Result<ReviewDecision, ReviewError> {
    serde_json::from_value(value.clone())
        .map_err(|error| ReviewError::MalformedDecision(error.to_string()))
}

pub struct ReviewGate {
    policy: Arc<dyn ReviewPolicy>,
    audit: Arc<dyn AuditSink>,
}

impl ReviewGate {
    pub fn new(policy: Arc<dyn ReviewPolicy>, audit: Arc<dyn AuditSink>) -> Self {
        Self { policy, audit }
    }

    pub fn requires_review(&self, tool_name: &str) -> bool {
        self.policy.requires_review(tool_name)
    }

    /// Picks the next step from the tail of the conversation. Calls are routed
    /// one at a time in proposal order.
    pub fn route(&self, state: &ConversationState) -> Route {
        match state.last_message() {
            None | Some(Message::System { .. }) | Some(Message::Human { .. }) => Route::ResumeModel,
            Some(Message::Assistant { tool_calls, .. }) if tool_calls.is_empty() => Route::Terminal,
            _ => match state.next_open_call() {
                Some(call) if self.requires_review(&call.name) => Route::Review(call.clone()),
                Some(call) => Route::Execute(call.clone()),
                None => Route::ResumeModel,
            },
        }
    }

    pub fn suspend(
        &self,
        state: &mut ConversationState,
        call: ProposedToolCall,
    ) -> Result<(), ReviewError> {
        if let Some(pending) = &state.pending_review {
            return Err(ReviewError::ReviewAlreadyPending { call_id: pending.call_id.clone() });
        }

        info!(
            event_name = "review.suspended",
            thread_id = state.thread_id.as_deref().unwrap_or("-"),
            call_id = %call.call_id,
            tool = %call.name,
            "awaiting human review"
        );
        self.audit.emit(
            AuditEvent::new(
                state.thread_id.clone(),
                Some(call.call_id.clone()),
                Uuid::new_v4().to_string(),
                "review.suspended",
                AuditCategory::Review,
                "review-gate",
                AuditOutcome::Success,
            )
            .with_metadata("tool", call.name.clone()),
        );
        state.pending_review = Some(call);
        Ok(())
    }

    /// Applies a human decision to the pending call and clears it.
    pub fn resolve(
        &self,
        state: &mut ConversationState,
        decision: ReviewDecision,
    ) -> Result<Resolution, ReviewError> {
        let pending = state.pending_review.clone().ok_or(ReviewError::NoPendingReview)?;
        if !state.open_calls().iter().any(|call| call.call_id == pending.call_id) {
            return Err(ReviewError::StaleReview { call_id: pending.call_id });
        }
        let outcome = transition(&ReviewState::AwaitingReview, &decision.event())?;
        let label = decision.label();

        let resolution = match decision {
            ReviewDecision::Approve => Resolution::Execute(pending.clone()),
            ReviewDecision::Edit { revised_arguments } => {
                let revised = pending.with_revised_arguments(&revised_arguments);
                if !state.replace_call(&revised) {
                    return Err(ReviewError::StaleReview { call_id: pending.call_id });
                }
                Resolution::Execute(revised)
            }
            ReviewDecision::Reject { reason } => {
                state.push(Message::tool_result(&pending, reason, true));
                skip_remaining_calls(state);
                Resolution::ResumeModel
            }
            ReviewDecision::Feedback { message } => {
                state.push(Message::tool_result(&pending, message, false));
                skip_remaining_calls(state);
                Resolution::ResumeModel
            }
        };
        state.pending_review = None;

        info!(
            event_name = "review.decision_applied",
            thread_id = state.thread_id.as_deref().unwrap_or("-"),
            call_id = %pending.call_id,
            tool = %pending.name,
            decision = label,
            next_state = ?outcome.to,
            "review decision applied"
        );
        let audit_outcome = match resolution {
            Resolution::Execute(_) => AuditOutcome::Success,
            Resolution::ResumeModel => AuditOutcome::Rejected,
        };
        self.audit.emit(
            AuditEvent::new(
                state.thread_id.clone(),
                Some(pending.call_id.clone()),
                Uuid::new_v4().to_string(),
                "review.decision_applied",
                AuditCategory::Review,
                "review-gate",
                audit_outcome,
            )
            .with_metadata("decision", label)
            .with_metadata("tool", pending.name.clone()),
        );

        Ok(resolution)
    }
}

/// Answers the calls still open after a declined one so the turn stays
/// fully paired before the model runs again.
fn skip_remaining_calls(state: &mut ConversationState) {
    let remaining: Vec<ProposedToolCall> = state.open_calls().into_iter().cloned().collect();
    for call in remaining {
        state.push(Message::tool_result(&call, SKIPPED_CALL_MESSAGE, true));
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use serde_json::{json, Map, Value};
    use tally_core::audit::{AuditOutcome, InMemoryAuditSink};

    use super::{parse_decision, Resolution, ReviewDecision, ReviewError, ReviewGate, Route};
    use crate::conversation::{ConversationState, Message, ProposedToolCall};
    use crate::tools::ToolRegistry;

    fn args(value: Value) -> Map<String, Value> {
        match value {
            Value::Object(map) => map,
            _ => Map::new(),
        }
    }

    fn gate() -> (ReviewGate, InMemoryAuditSink) {
        let sink = InMemoryAuditSink::default();
        (ReviewGate::new(Arc::new(ToolRegistry::time_tracking()), Arc::new(sink.clone())), sink)
    }

    fn booking_call() -> ProposedToolCall {
        ProposedToolCall::new(
            "bookTimeEntry",
            "c1",
            args(json!({"projectId": "P", "date": "2025-04-16", "hours": 8})),
        )
    }

    fn state_with(calls: Vec<ProposedToolCall>) -> ConversationState {
        ConversationState::new(vec![
            Message::human("Book 8 hours on project P for Wednesday"),
            Message::Assistant { id: "m1".to_string(), content: String::new(), tool_calls: calls },
        ])
        .with_thread_id("thread-1")
    }

    fn suspended(calls: Vec<ProposedToolCall>) -> (ReviewGate, InMemoryAuditSink, ConversationState) {
        let (gate, sink) = gate();
        let mut state = state_with(calls);
        let Route::Review(call) = gate.route(&state) else {
            panic!("booking should require review");
        };
        gate.suspend(&mut state, call).expect("suspend");
        (gate, sink, state)
    }

    #[test]
    fn read_only_call_is_executed_without_review() {
        let (gate, _) = gate();
        let state = state_with(vec![ProposedToolCall::new("getProjects", "c0", Map::new())]);

        assert!(matches!(gate.route(&state), Route::Execute(call) if call.call_id == "c0"));
    }

    #[test]
    fn tail_of_conversation_decides_route() {
        let (gate, _) = gate();
        let answered = {
            let mut state = state_with(vec![ProposedToolCall::new("getProjects", "c0", Map::new())]);
            state.push(Message::ToolResult {
                call_id: "c0".to_string(),
                name: "getProjects".to_string(),
                content: "{}".to_string(),
                is_error: false,
            });
            state
        };
        let final_answer = ConversationState::new(vec![Message::Assistant {
            id: "m2".to_string(),
            content: "Done.".to_string(),
            tool_calls: Vec::new(),
        }]);

        assert_eq!(gate.route(&ConversationState::new(vec![Message::human("hi")])), Route::ResumeModel);
        assert_eq!(gate.route(&answered), Route::ResumeModel);
        assert_eq!(gate.route(&final_answer), Route::Terminal);
    }

    #[test]
    fn booking_always_requires_review() {
        let (_, _, state) = suspended(vec![booking_call()]);

        assert_eq!(state.pending_review, Some(booking_call()));
        assert!(state.check_pairing().is_ok());
    }

    #[test]
    fn approve_executes_original_arguments() {
        let (gate, sink, mut state) = suspended(vec![booking_call()]);

        let resolution = gate.resolve(&mut state, ReviewDecision::Approve).expect("approve");

        assert_eq!(resolution, Resolution::Execute(booking_call()));
        assert!(state.pending_review.is_none());
        let events = sink.events();
        assert_eq!(events.last().map(|event| event.event_type.as_str()), Some("review.decision_applied"));
        assert_eq!(events.last().and_then(|event| event.metadata.get("decision")).map(String::as_str), Some("approve"));
    }

    #[test]
    fn edit_overlays_arguments_and_keeps_call_identity() {
        let (gate, _, mut state) = suspended(vec![booking_call()]);

        let resolution = gate
            .resolve(&mut state, ReviewDecision::Edit { revised_arguments: args(json!({"hours": 4})) })
            .expect("edit");

        let Resolution::Execute(call) = resolution else {
            panic!("edit should execute");
        };
        assert_eq!(call.call_id, "c1");
        assert_eq!(call.arguments.get("hours"), Some(&json!(4)));
        assert_eq!(call.arguments.get("projectId"), Some(&json!("P")));
        let Some(Message::Assistant { id, tool_calls, .. }) = state.last_message() else {
            panic!("assistant message should be rewritten in place");
        };
        assert_eq!(id, "m1");
        assert_eq!(tool_calls, &vec![call]);
    }

    #[test]
    fn reject_appends_reason_as_tool_result() {
        let (gate, sink, mut state) = suspended(vec![booking_call()]);

        let resolution = gate
            .resolve(&mut state, ReviewDecision::Reject { reason: "budget exceeded".to_string() })
            .expect("reject");

        assert_eq!(resolution, Resolution::ResumeModel);
        assert_eq!(
            state.last_message(),
            Some(&Message::ToolResult {
                call_id: "c1".to_string(),
                name: "bookTimeEntry".to_string(),
                content: "budget exceeded".to_string(),
                is_error: true,
            })
        );
        assert!(state.check_pairing().is_ok());
        assert_eq!(sink.events().last().map(|event| event.outcome.clone()), Some(AuditOutcome::Rejected));
    }

    #[test]
    fn feedback_appends_guidance_and_answers_remaining_calls() {
        let second = ProposedToolCall::new("getProjects", "c2", Map::new());
        let (gate, _, mut state) = suspended(vec![booking_call(), second]);

        let resolution = gate
            .resolve(&mut state, ReviewDecision::Feedback { message: "use Thursday".to_string() })
            .expect("feedback");

        assert_eq!(resolution, Resolution::ResumeModel);
        assert!(state.open_calls().is_empty());
        assert!(state.check_pairing().is_ok());
        assert!(matches!(
            &state.messages[2],
            Message::ToolResult { call_id, content, is_error: false, .. }
                if call_id == "c1" && content == "use Thursday"
        ));
        assert!(matches!(&state.messages[3], Message::ToolResult { call_id, is_error: true, .. } if call_id == "c2"));
    }

    #[test]
    fn resolving_without_pending_review_fails() {
        let (gate, _) = gate();
        let mut state = state_with(vec![booking_call()]);

        assert_eq!(gate.resolve(&mut state, ReviewDecision::Approve), Err(ReviewError::NoPendingReview));
    }

    #[test]
    fn second_suspension_is_refused() {
        let (gate, _, mut state) = suspended(vec![booking_call()]);

        let error = gate.suspend(&mut state, booking_call()).expect_err("already pending");

        assert_eq!(error, ReviewError::ReviewAlreadyPending { call_id: "c1".to_string() });
    }

    #[test]
    fn decisions_parse_with_historical_aliases() {
        assert_eq!(parse_decision(&json!({"action": "approve"})), Ok(ReviewDecision::Approve));
        assert_eq!(parse_decision(&json!({"action": "continue"})), Ok(ReviewDecision::Approve));
        assert_eq!(
            parse_decision(&json!({"action": "update", "data": {"hours": 4}})),
            Ok(ReviewDecision::Edit { revised_arguments: args(json!({"hours": 4})) })
        );
        assert_eq!(
            parse_decision(&json!({"action": "reject", "reason": "budget exceeded"})),
            Ok(ReviewDecision::Reject { reason: "budget exceeded".to_string() })
        );
        assert!(matches!(
            parse_decision(&json!({"action": "cancel"})),
            Ok(ReviewDecision::Reject { .. })
        ));
        assert_eq!(
            parse_decision(&json!({"action": "feedback", "message": "wrong day"})),
            Ok(ReviewDecision::Feedback { message: "wrong day".to_string() })
        );
    }

    #[test]
    fn unknown_decision_tag_is_malformed() {
        for raw in [json!({"action": "maybe"}), json!({"verdict": "approve"}), json!("approve")] {
            assert!(matches!(parse_decision(&raw), Err(ReviewError::MalformedDecision(_))), "{raw}");
        }
    }
}
