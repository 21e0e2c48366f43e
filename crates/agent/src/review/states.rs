use serde::{Deserialize, Serialize};

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum ReviewState {
    Assistant,
    Routing,
    AwaitingReview,
    Executing,
    Terminal,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum ReviewEvent {
    MessageProduced,
    NoToolCalls,
    ReadOnlyCallProposed,
    ReviewRequired,
    CallsResolved,
    Approved,
    Edited,
    Rejected,
    FeedbackGiven,
    ToolCompleted,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransitionOutcome {
    pub from: ReviewState,
    pub to: ReviewState,
    pub event: ReviewEvent,
}
