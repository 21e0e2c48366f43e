use thiserror::Error;

use crate::review::states::{ReviewEvent, ReviewState, TransitionOutcome};

#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum ReviewTransitionError {
    #[error("invalid review transition from {state:?} using event {event:?}")]
    InvalidTransition { state: ReviewState, event: ReviewEvent },
}

pub fn transition(
    current: &ReviewState,
    event: &ReviewEvent,
) -> Result<TransitionOutcome, ReviewTransitionError> {
    use ReviewEvent::{
        Approved, CallsResolved, Edited, FeedbackGiven, MessageProduced, NoToolCalls,
        ReadOnlyCallProposed, Rejected, ReviewRequired, ToolCompleted,
    };
    use ReviewState::{Assistant, AwaitingReview, Executing, Routing, Terminal};

    let to = match (current, event) {
        (Assistant, MessageProduced) => Routing,
        (Routing, NoToolCalls) => Terminal,
        (Routing, ReadOnlyCallProposed) => Executing,
        (Routing, ReviewRequired) => AwaitingReview,
        (Routing, CallsResolved) => Assistant,
        (AwaitingReview, Approved) | (AwaitingReview, Edited) => Executing,
        (AwaitingReview, Rejected) | (AwaitingReview, FeedbackGiven) => Assistant,
        (Executing, ToolCompleted) => Routing,
        _ => {
            return Err(ReviewTransitionError::InvalidTransition {
                state: *current,
                event: *event,
            });
        }
    };

    Ok(TransitionOutcome { from: *current, to, event: *event })
}
