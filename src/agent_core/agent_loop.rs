//! Conversation loop — the model/tool state machine behind one `ask`.
//!
//! ```text
//!   AwaitingModel ──final text──────────────▶ Done
//!        │  ▲
//!   tool │  │ results appended (rounds < ceiling)
//!  calls ▼  │
//!   ExecutingTools ──rounds == ceiling──────▶ Aborted
//!
//!   AwaitingModel ──model error / unexpected reply──▶ Aborted
//! ```
//!
//! Each tool round is one model reply that requested tools plus the
//! execution of every requested call. The ceiling counts rounds: once it is
//! reached the loop aborts without asking the model again, so a query never
//! costs more than `max_rounds` model calls.

use std::fmt;
use std::time::Instant;

use crate::inference::client::ChatModel;
use crate::inference::errors::InferenceError;
use crate::inference::types::{ChatMessage, ModelReply, ToolCall, ToolDefinition};
use crate::mcp_client::catalog::ToolCatalog;
use crate::mcp_client::session::ToolSession;

use super::conversation::ConversationHistory;
use super::errors::AgentError;
use super::tool_router::ToolRouter;
use super::types::ToolCallResult;

// ─── States and decisions ────────────────────────────────────────────────────

/// Where the loop is. `Done` and `Aborted` are terminal.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoopState {
    AwaitingModel,
    ExecutingTools,
    Done,
    Aborted,
}

impl LoopState {
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Done | Self::Aborted)
    }
}

impl fmt::Display for LoopState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::AwaitingModel => "awaiting_model",
            Self::ExecutingTools => "executing_tools",
            Self::Done => "done",
            Self::Aborted => "aborted",
        };
        f.write_str(s)
    }
}

/// Why a conversation ended without a final answer.
#[derive(Debug, Clone, PartialEq)]
pub enum AbortReason {
    /// The model still wanted tools after `rounds` tool rounds.
    TurnLimit { rounds: u32 },
    /// The model ended its turn in a way the loop cannot continue from.
    UnexpectedResponse { finish_reason: Option<String> },
    /// The model call itself failed.
    ModelError { message: String },
    /// A loop event arrived in the wrong state.
    Internal { message: String },
}

impl AbortReason {
    /// User-facing diagnostic returned in place of an answer.
    pub fn diagnostic(&self) -> String {
        match self {
            Self::TurnLimit { rounds } => format!(
                "Sorry, I could not complete your request within the limit of {rounds} tool rounds."
            ),
            Self::UnexpectedResponse { finish_reason } => format!(
                "Sorry, something unexpected happened while processing your query ({}).",
                finish_reason.as_deref().unwrap_or("no finish reason")
            ),
            Self::ModelError { message } => {
                format!("An error occurred while processing your query: {message}")
            }
            Self::Internal { message } => {
                format!("An internal error occurred while processing your query: {message}")
            }
        }
    }
}

/// What the loop should do with one model reply.
#[derive(Debug, Clone, PartialEq)]
pub enum ModelDecision {
    /// Final text answer.
    Final(String),
    /// Run these tools, then ask again.
    ToolCalls {
        content: Option<String>,
        calls: Vec<ToolCall>,
    },
    /// Neither a usable answer nor a tool request.
    Unexpected { finish_reason: Option<String> },
}

/// Classify a reply by its finish reason.
///
/// `"stop"` with text is final; `"tool_calls"` with at least one call is a
/// tool request. Anything else (`"length"`, `"content_filter"`, an empty
/// stop, an empty tool list) is unexpected.
pub fn interpret_reply(reply: ModelReply) -> ModelDecision {
    match reply.finish_reason.as_deref() {
        Some("stop") => match reply.content {
            Some(text) if !text.trim().is_empty() => ModelDecision::Final(text),
            _ => ModelDecision::Unexpected {
                finish_reason: reply.finish_reason,
            },
        },
        Some("tool_calls") if !reply.tool_calls.is_empty() => ModelDecision::ToolCalls {
            content: reply.content,
            calls: reply.tool_calls,
        },
        _ => ModelDecision::Unexpected {
            finish_reason: reply.finish_reason,
        },
    }
}

// ─── Outcome ─────────────────────────────────────────────────────────────────

/// Final status of a conversation.
#[derive(Debug, Clone, PartialEq)]
pub enum LoopStatus {
    Completed,
    Aborted(AbortReason),
}

/// Everything one `ask` produced.
#[derive(Debug, Clone)]
pub struct ConversationOutcome {
    pub status: LoopStatus,
    /// The model's answer, or the diagnostic when aborted.
    pub answer: String,
    /// Completed tool rounds.
    pub rounds: u32,
    pub history: Vec<ChatMessage>,
}

impl ConversationOutcome {
    pub fn is_completed(&self) -> bool {
        self.status == LoopStatus::Completed
    }
}

// ─── ConversationLoop ────────────────────────────────────────────────────────

/// State machine for one query. Consumed by [`run`](Self::run).
#[derive(Debug)]
pub struct ConversationLoop {
    state: LoopState,
    history: ConversationHistory,
    max_rounds: u32,
    rounds: u32,
    pending: Vec<ToolCall>,
    answer: Option<String>,
    abort: Option<AbortReason>,
}

impl ConversationLoop {
    /// A ceiling of zero is treated as one round.
    pub fn new(system_prompt: &str, query: &str, max_rounds: u32) -> Self {
        Self {
            state: LoopState::AwaitingModel,
            history: ConversationHistory::new(system_prompt, query),
            max_rounds: max_rounds.max(1),
            rounds: 0,
            pending: Vec::new(),
            answer: None,
            abort: None,
        }
    }

    pub fn state(&self) -> LoopState {
        self.state
    }

    pub fn rounds(&self) -> u32 {
        self.rounds
    }

    pub fn history(&self) -> &ConversationHistory {
        &self.history
    }

    /// Calls requested by the last model reply, awaiting execution.
    pub fn pending_calls(&self) -> &[ToolCall] {
        &self.pending
    }

    fn expect_state(&self, expected: LoopState) -> Result<(), AgentError> {
        if self.state == expected {
            Ok(())
        } else {
            Err(AgentError::InvalidState {
                expected: expected.to_string(),
                actual: self.state.to_string(),
            })
        }
    }

    fn abort(&mut self, reason: AbortReason) {
        tracing::warn!(
            rounds = self.rounds,
            reason = ?reason,
            "conversation aborted"
        );
        self.abort = Some(reason);
        self.pending.clear();
        self.state = LoopState::Aborted;
    }

    /// Apply a classified model reply. Valid only in `AwaitingModel`.
    pub fn on_model_decision(&mut self, decision: ModelDecision) -> Result<LoopState, AgentError> {
        self.expect_state(LoopState::AwaitingModel)?;
        match decision {
            ModelDecision::Final(text) => {
                self.history.push_assistant_text(&text);
                self.answer = Some(text);
                self.state = LoopState::Done;
            }
            ModelDecision::ToolCalls { content, calls } => {
                self.history.push_assistant_tool_calls(content, &calls);
                self.pending = calls;
                self.state = LoopState::ExecutingTools;
            }
            ModelDecision::Unexpected { finish_reason } => {
                self.abort(AbortReason::UnexpectedResponse { finish_reason });
            }
        }
        Ok(self.state)
    }

    /// Record a failed model call. Valid only in `AwaitingModel`.
    pub fn on_model_error(&mut self, error: &InferenceError) -> Result<LoopState, AgentError> {
        self.expect_state(LoopState::AwaitingModel)?;
        self.abort(AbortReason::ModelError {
            message: error.to_string(),
        });
        Ok(self.state)
    }

    /// Append tool results and close the round. Valid only in `ExecutingTools`.
    ///
    /// Results are appended in the order the calls were requested. A call
    /// with no matching result gets an error result so every requested call
    /// is answered exactly once.
    pub fn on_tools_executed(
        &mut self,
        mut results: Vec<ToolCallResult>,
    ) -> Result<LoopState, AgentError> {
        self.expect_state(LoopState::ExecutingTools)?;

        for call in std::mem::take(&mut self.pending) {
            let result = match results.iter().position(|r| r.call_id == call.id) {
                Some(idx) => results.remove(idx),
                None => ToolCallResult::error(
                    &call.id,
                    &call.name,
                    format!("Error executing tool {}: no result was produced", call.name),
                ),
            };
            self.history.push_tool_result(&result);
        }

        self.rounds += 1;
        if self.rounds >= self.max_rounds {
            self.abort(AbortReason::TurnLimit {
                rounds: self.rounds,
            });
        } else {
            self.state = LoopState::AwaitingModel;
        }
        Ok(self.state)
    }

    /// Drive the loop to a terminal state.
    pub async fn run(
        mut self,
        model: &dyn ChatModel,
        tools: &[ToolDefinition],
        router: &ToolRouter,
        session: &dyn ToolSession,
        catalog: &ToolCatalog,
    ) -> ConversationOutcome {
        let start = Instant::now();

        while !self.state.is_terminal() {
            let step = match self.state {
                LoopState::AwaitingModel => {
                    tracing::debug!(
                        model = model.model_name(),
                        messages = self.history.len(),
                        round = self.rounds + 1,
                        "requesting model reply"
                    );
                    match model.complete(self.history.messages(), tools).await {
                        Ok(reply) => self.on_model_decision(interpret_reply(reply)),
                        Err(e) => self.on_model_error(&e),
                    }
                }
                LoopState::ExecutingTools => {
                    tracing::info!(
                        round = self.rounds + 1,
                        calls = self.pending.len(),
                        "executing tool round"
                    );
                    let results = router
                        .dispatch_tool_calls(&self.pending, session, catalog)
                        .await;
                    self.on_tools_executed(results)
                }
                LoopState::Done | LoopState::Aborted => break,
            };

            if let Err(e) = step {
                self.abort(AbortReason::Internal {
                    message: e.to_string(),
                });
            }
        }

        tracing::info!(
            state = %self.state,
            rounds = self.rounds,
            elapsed_ms = start.elapsed().as_millis() as u64,
            "conversation finished"
        );
        self.into_outcome()
    }

    /// Outcome of a terminal loop.
    pub fn into_outcome(self) -> ConversationOutcome {
        let (status, answer) = match (self.abort, self.answer) {
            (Some(reason), _) => {
                let diagnostic = reason.diagnostic();
                (LoopStatus::Aborted(reason), diagnostic)
            }
            (None, Some(answer)) => (LoopStatus::Completed, answer),
            (None, None) => {
                let reason = AbortReason::Internal {
                    message: format!("conversation stopped in state {}", self.state),
                };
                (LoopStatus::Aborted(reason.clone()), reason.diagnostic())
            }
        };
        ConversationOutcome {
            status,
            answer,
            rounds: self.rounds,
            history: self.history.into_messages(),
        }
    }
}

// ─── Tests ───────────────────────────────────────────────────────────────────
