use std::sync::Arc;

use tally_core::audit::{AuditCategory, AuditEvent, AuditOutcome, AuditSink};
use tally_core::errors::ApplicationError;
use thiserror::Error;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::conversation::{ConversationState, Message, PairingError, ProposedToolCall};
use crate::llm::ChatModel;
use crate::review::{
    transition, Resolution, ReviewDecision, ReviewError, ReviewEvent, ReviewGate, ReviewState,
    Route,
};
use crate::session::{SessionError, SessionStore};
use crate::tools::{ToolContext, ToolRegistry, ToolSpec};

pub const DEFAULT_MAX_STEPS: u32 = 25;

#[derive(Clone, Debug, PartialEq)]
pub enum RunOutcome {
    Completed(ConversationState),
    AwaitingReview(ConversationState),
}

impl RunOutcome {
    pub fn state(&self) -> &ConversationState {
        match self {
            Self::Completed(state) | Self::AwaitingReview(state) => state,
        }
    }

    pub fn into_state(self) -> ConversationState {
        match self {
            Self::Completed(state) | Self::AwaitingReview(state) => state,
        }
    }

    pub fn pending_review(&self) -> Option<&ProposedToolCall> {
        match self {
            Self::AwaitingReview(state) => state.pending_review.as_ref(),
            Self::Completed(_) => None,
        }
    }

    /// Text of the last assistant message, if any.
    pub fn final_reply(&self) -> Option<&str> {
        self.state().messages.iter().rev().find_map(|message| match message {
            Message::Assistant { content, .. } if !content.is_empty() => Some(content.as_str()),
            _ => None,
        })
    }
}

#[derive(Debug, Error)]
pub enum OrchestratorError {
    #[error(transparent)]
    Review(#[from] ReviewError),
    #[error("model invocation failed: {0:#}")]
    Model(anyhow::Error),
    #[error("step limit of {max_steps} model turns reached without a final answer")]
    StepLimitExceeded { max_steps: u32 },
    #[error(transparent)]
    Store(#[from] SessionError),
    #[error("no suspended review found for thread `{0}`")]
    ThreadNotFound(String),
    #[error("checkpoint is inconsistent: {0}")]
    InvalidCheckpoint(#[from] PairingError),
}

impl From<OrchestratorError> for ApplicationError {
    fn from(error: OrchestratorError) -> Self {
        match error {
            OrchestratorError::Model(error) => Self::Integration(format!("{error:#}")),
            OrchestratorError::Store(error) => Self::Persistence(error.to_string()),
            OrchestratorError::InvalidCheckpoint(error) => Self::Persistence(error.to_string()),
            other => Self::Workflow(other.to_string()),
        }
    }
}

/// Drives one conversation through the review workflow. Business decisions
/// stay with the gate and the tools.
pub struct AgentRuntime<M: ChatModel> {
    model: M,
    registry: Arc<ToolRegistry>,
    tool_specs: Vec<ToolSpec>,
    gate: ReviewGate,
    context: ToolContext,
    audit: Arc<dyn AuditSink>,
    max_steps: u32,
}

impl<M: ChatModel> AgentRuntime<M> {
    pub fn new(
        model: M,
        registry: Arc<ToolRegistry>,
        context: ToolContext,
        audit: Arc<dyn AuditSink>,
    ) -> Self {
        let tool_specs = registry.specs();
        let gate = ReviewGate::new(registry.clone(), audit.clone());
        Self { model, registry, tool_specs, gate, context, audit, max_steps: DEFAULT_MAX_STEPS }
    }

    pub fn with_max_steps(mut self, max_steps: u32) -> Self {
        self.max_steps = max_steps;
        self
    }

    pub fn gate(&self) -> &ReviewGate {
        &self.gate
    }

    pub async fn run(&self, initial_messages: Vec<Message>) -> Result<RunOutcome, OrchestratorError> {
        self.run_state(ConversationState::new(initial_messages)).await
    }

    async fn run_state(&self, state: ConversationState) -> Result<RunOutcome, OrchestratorError> {
        info!(
            event_name = "agent.run.started",
            thread_id = state.thread_id.as_deref().unwrap_or("-"),
            messages = state.messages.len(),
            "conversation run started"
        );
        let phase = match state.last_message() {
            Some(Message::Assistant { .. }) | Some(Message::ToolResult { .. }) => ReviewState::Routing,
            _ => ReviewState::Assistant,
        };
        self.drive(state, phase, None, None).await
    }

    /// Continues a suspended conversation with the human decision.
    pub async fn resume(
        &self,
        state: ConversationState,
        decision: ReviewDecision,
    ) -> Result<RunOutcome, OrchestratorError> {
        self.resume_with(state, decision, None).await
    }

    async fn resume_with(
        &self,
        mut state: ConversationState,
        decision: ReviewDecision,
        checkpoint: Option<Checkpoint<'_>>,
    ) -> Result<RunOutcome, OrchestratorError> {
        state.check_pairing()?;
        match self.gate.resolve(&mut state, decision)? {
            Resolution::Execute(call) => {
                self.drive(state, ReviewState::Executing, Some(call), checkpoint).await
            }
            Resolution::ResumeModel => {
                if let Some(checkpoint) = checkpoint {
                    checkpoint.save(&state).await?;
                }
                self.drive(state, ReviewState::Assistant, None, checkpoint).await
            }
        }
    }

    /// Starts a thread and checkpoints it if it suspends.
    pub async fn start_thread(
        &self,
        store: &dyn SessionStore,
        thread_id: &str,
        initial_messages: Vec<Message>,
    ) -> Result<RunOutcome, OrchestratorError> {
        let state = ConversationState::new(initial_messages).with_thread_id(thread_id);
        let outcome = self.run_state(state).await?;
        Checkpoint { store, thread_id }.finish(&outcome).await?;
        Ok(outcome)
    }

    /// Loads a suspended thread, applies `decision` and checkpoints again.
    ///
    /// Every tool result is saved before the model is invoked again, so a run
    /// that fails after an approved call leaves a snapshot with no pending
    /// review. Resuming such a snapshot continues the run without replaying
    /// the call; `decision` no longer applies to anything and is ignored.
    pub async fn resume_thread(
        &self,
        store: &dyn SessionStore,
        thread_id: &str,
        decision: ReviewDecision,
    ) -> Result<RunOutcome, OrchestratorError> {
        let state = store
            .load(thread_id)
            .await?
            .ok_or_else(|| OrchestratorError::ThreadNotFound(thread_id.to_string()))?;
        let checkpoint = Checkpoint { store, thread_id };

        let outcome = if state.pending_review.is_none() {
            state.check_pairing()?;
            warn!(
                event_name = "agent.run.recovered",
                thread_id,
                decision = decision.label(),
                "continuing an interrupted run; the decision was already applied"
            );
            self.drive(state, ReviewState::Routing, None, Some(checkpoint)).await?
        } else {
            self.resume_with(state, decision, Some(checkpoint)).await?
        };
        checkpoint.finish(&outcome).await?;
        Ok(outcome)
    }

    async fn drive(
        &self,
        mut state: ConversationState,
        mut phase: ReviewState,
        mut queued: Option<ProposedToolCall>,
        checkpoint: Option<Checkpoint<'_>>,
    ) -> Result<RunOutcome, OrchestratorError> {
        let mut model_turns = 0_u32;

        loop {
            match phase {
                ReviewState::Assistant => {
                    if model_turns >= self.max_steps {
                        return Err(OrchestratorError::StepLimitExceeded { max_steps: self.max_steps });
                    }
                    model_turns += 1;
                    let turn = self
                        .model
                        .invoke(&state.messages, &self.tool_specs)
                        .await
                        .map_err(OrchestratorError::Model)?;
                    debug!(
                        event_name = "agent.model.turn",
                        thread_id = state.thread_id.as_deref().unwrap_or("-"),
                        tool_calls = turn.tool_calls.len(),
                        "model produced a message"
                    );
                    state.push(turn.into_message());
                    phase = advance(&state, phase, ReviewEvent::MessageProduced)?;
                }
                ReviewState::Routing => match self.gate.route(&state) {
                    Route::Terminal => phase = advance(&state, phase, ReviewEvent::NoToolCalls)?,
                    Route::ResumeModel => phase = advance(&state, phase, ReviewEvent::CallsResolved)?,
                    Route::Execute(call) => {
                        queued = Some(call);
                        phase = advance(&state, phase, ReviewEvent::ReadOnlyCallProposed)?;
                    }
                    Route::Review(call) => {
                        phase = advance(&state, phase, ReviewEvent::ReviewRequired)?;
                        self.gate.suspend(&mut state, call)?;
                    }
                },
                ReviewState::Executing => {
                    if let Some(call) = queued.take() {
                        let result = self.registry.execute(&call, &self.context).await;
                        if self.gate.requires_review(&call.name) {
                            self.audit_execution(&state, &call, &result);
                        }
                        state.push(result);
                        if let Some(checkpoint) = checkpoint {
                            checkpoint.save(&state).await?;
                        }
                    }
                    phase = advance(&state, phase, ReviewEvent::ToolCompleted)?;
                }
                ReviewState::AwaitingReview => {
                    info!(
                        event_name = "agent.run.suspended",
                        thread_id = state.thread_id.as_deref().unwrap_or("-"),
                        call_id = state.pending_review.as_ref().map(|call| call.call_id.as_str()),
                        "conversation suspended for review"
                    );
                    return Ok(RunOutcome::AwaitingReview(state));
                }
                ReviewState::Terminal => {
                    info!(
                        event_name = "agent.run.completed",
                        thread_id = state.thread_id.as_deref().unwrap_or("-"),
                        model_turns,
                        "conversation completed"
                    );
                    return Ok(RunOutcome::Completed(state));
                }
            }
        }
    }

    /// Records the outcome of a call that went through review.
    fn audit_execution(&self, state: &ConversationState, call: &ProposedToolCall, result: &Message) {
        let outcome = match result {
            Message::ToolResult { is_error: true, .. } => AuditOutcome::Failed,
            _ => AuditOutcome::Success,
        };
        self.audit.emit(
            AuditEvent::new(
                state.thread_id.clone(),
                Some(call.call_id.clone()),
                Uuid::new_v4().to_string(),
                "tool.executed",
                AuditCategory::Tool,
                "agent-runtime",
                outcome,
            )
            .with_metadata("tool", call.name.clone()),
        );
    }
}

fn advance(
    state: &ConversationState,
    phase: ReviewState,
    event: ReviewEvent,
) -> Result<ReviewState, OrchestratorError> {
    let outcome = transition(&phase, &event).map_err(ReviewError::from)?;
    debug!(
        event_name = "review.transition",
        thread_id = state.thread_id.as_deref().unwrap_or("-"),
        from = ?outcome.from,
        to = ?outcome.to,
        event = ?outcome.event,
        "review state advanced"
    );
    Ok(outcome.to)
}

#[derive(Clone, Copy)]
struct Checkpoint<'a> {
    store: &'a dyn SessionStore,
    thread_id: &'a str,
}

impl Checkpoint<'_> {
    async fn save(&self, state: &ConversationState) -> Result<(), OrchestratorError> {
        self.store.save(self.thread_id, state).await?;
        Ok(())
    }

    /// Only suspended threads are kept; completed ones are dropped.
    async fn finish(&self, outcome: &RunOutcome) -> Result<(), OrchestratorError> {
        match outcome {
            RunOutcome::AwaitingReview(state) => self.save(state).await,
            RunOutcome::Completed(_) => {
                self.store.clear(self.thread_id).await?;
                Ok(())
            }
        }
    }
}
