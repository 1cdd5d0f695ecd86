//! Plan, act and reflect loop driving one agent against one sandbox.
//!
//! Each attempt:
//! 1. Plans (a planning failure is traced and the attempt goes on without a plan)
//! 2. Acts through the agent's sub-loop
//! 3. Asks the critic whether the response satisfies the original goal
//!
//! Approval ends the loop. A rejection folds the critic's feedback into the
//! next attempt's goal. An act or reflect error ends the loop as failed.

use std::sync::{Mutex, PoisonError};

use async_trait::async_trait;
use thiserror::Error;
use tokio_util::sync::CancellationToken;

use super::prompts::{execution_prompt, retry_prompt};
use super::review::{Critic, Planner};
use super::step_protocol::StepProtocolAgent;
use super::tool_calling::ToolCallingAgent;
use super::tools::ToolError;
use super::trace::TraceRecorder;
use crate::error::{AgentClientError, LlmError};
use crate::llm::MockModel;
use crate::models::TraceKind;
use crate::sandbox::{Sandbox, SandboxError};
use crate::storage::StorageError;

/// Default number of top-level attempts.
pub const DEFAULT_MAX_RETRIES: u32 = 3;
/// Default turn budget of each sub-loop.
pub const DEFAULT_MAX_TURNS: u32 = 10;

/// Errors that end an execution.
#[derive(Debug, Error)]
pub enum AgentError {
    #[error("Sandbox error: {0}")]
    Sandbox(#[from] SandboxError),

    #[error("LLM error: {0}")]
    Llm(#[from] LlmError),

    #[error("Agent step failed: {0}")]
    Step(#[from] AgentClientError),

    #[error("Tool error: {0}")]
    Tool(#[from] ToolError),

    #[error("Trace storage failed: {0}")]
    Storage(#[from] StorageError),

    /// The model replied with neither content nor tool calls.
    #[error("Empty reply from agent")]
    EmptyReply,

    #[error("Turn limit exceeded: {max_turns} turns")]
    TurnLimitExceeded { max_turns: u32 },

    #[error("Execution cancelled")]
    Cancelled,
}

impl AgentError {
    /// True when the error stems from the cancellation token.
    pub fn is_cancellation(&self) -> bool {
        matches!(
            self,
            Self::Cancelled
                | Self::Llm(LlmError::Cancelled)
                | Self::Step(AgentClientError::Cancelled)
                | Self::Sandbox(SandboxError::Cancelled)
                | Self::Tool(ToolError::Sandbox(SandboxError::Cancelled))
        )
    }
}

/// What an actor produced for one attempt.
#[derive(Debug, Clone, PartialEq)]
pub struct ActOutcome {
    pub response: String,
    pub cost: f64,
    pub turns: u32,
}

/// Model spend across every attempt of one execution.
///
/// Sub-loops add each billed turn as it happens, so spend survives a
/// sub-loop that later fails.
#[derive(Debug, Default)]
pub struct CostMeter(Mutex<f64>);

impl CostMeter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add(&self, cost: f64) {
        *self.0.lock().unwrap_or_else(PoisonError::into_inner) += cost;
    }

    pub fn total(&self) -> f64 {
        *self.0.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

/// Everything a sub-loop runs against.
pub struct ActContext<'a> {
    pub sandbox: &'a dyn Sandbox,
    pub recorder: &'a TraceRecorder,
    pub cancel: &'a CancellationToken,
    pub spent: &'a CostMeter,
    pub max_turns: u32,
}

/// How the agent acts on a prompt.
pub enum Actor {
    /// Deterministic offline replies, no tools.
    Mock(MockModel),
    /// Chat completions with the tool catalog.
    ToolCalling(ToolCallingAgent),
    /// `POST /agent/step` exchanges.
    StepProtocol(StepProtocolAgent),
}

impl Actor {
    pub async fn act(&self, prompt: &str, ctx: &ActContext<'_>) -> Result<ActOutcome, AgentError> {
        match self {
            Self::Mock(model) => {
                let response = model.act(prompt);
                ctx.recorder.agent_turn(1, response.clone(), 0.0, 0).await?;
                Ok(ActOutcome {
                    response,
                    cost: 0.0,
                    turns: 1,
                })
            }
            Self::ToolCalling(agent) => agent.act(prompt, ctx).await,
            Self::StepProtocol(agent) => agent.act(prompt, ctx).await,
        }
    }
}

/// Receives progress after every attempt.
#[async_trait]
pub trait ProgressSink: Send + Sync {
    async fn attempt_finished(&self, attempt: u32, max_attempts: u32) -> Result<(), StorageError>;
}

/// Discards progress.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoProgress;

#[async_trait]
impl ProgressSink for NoProgress {
    async fn attempt_finished(&self, _attempt: u32, _max: u32) -> Result<(), StorageError> {
        Ok(())
    }
}

/// How the loop ended.
#[derive(Debug)]
pub enum Verdict {
    Approved,
    /// Every attempt was rejected by the critic.
    RetriesExhausted,
    Failed(AgentError),
}

/// Result of [`ExecutionLoop::run`].
#[derive(Debug)]
pub struct LoopOutcome {
    pub verdict: Verdict,
    pub attempts: u32,
    pub cost: f64,
    /// The last response the actor produced.
    pub response: Option<String>,
}

impl LoopOutcome {
    pub fn is_approved(&self) -> bool {
        matches!(self.verdict, Verdict::Approved)
    }

    /// Binary score.
    pub fn score(&self) -> f64 {
        if self.is_approved() {
            1.0
        } else {
            0.0
        }
    }
}

/// Bounded plan, act, reflect driver.
pub struct ExecutionLoop {
    actor: Actor,
    planner: Planner,
    critic: Critic,
    max_retries: u32,
    max_turns: u32,
}

impl ExecutionLoop {
    pub fn new(actor: Actor, planner: Planner, critic: Critic) -> Self {
        Self {
            actor,
            planner,
            critic,
            max_retries: DEFAULT_MAX_RETRIES,
            max_turns: DEFAULT_MAX_TURNS,
        }
    }

    pub fn with_max_retries(mut self, max_retries: u32) -> Self {
        self.max_retries = max_retries.max(1);
        self
    }

    pub fn with_max_turns(mut self, max_turns: u32) -> Self {
        self.max_turns = max_turns.max(1);
        self
    }

    pub fn max_retries(&self) -> u32 {
        self.max_retries
    }

    /// Runs up to `max_retries` attempts at `goal`.
    pub async fn run(
        &self,
        goal: &str,
        sandbox: &dyn Sandbox,
        recorder: &TraceRecorder,
        progress: &dyn ProgressSink,
        cancel: &CancellationToken,
    ) -> LoopOutcome {
        let mut outcome = LoopOutcome {
            verdict: Verdict::RetriesExhausted,
            attempts: 0,
            cost: 0.0,
            response: None,
        };
        let spent = CostMeter::new();
        let ctx = ActContext {
            sandbox,
            recorder,
            cancel,
            spent: &spent,
            max_turns: self.max_turns,
        };
        let mut prompt = goal.to_string();

        for attempt in 1..=self.max_retries {
            outcome.attempts = attempt;
            tracing::info!(
                submission_id = %recorder.submission_id(),
                attempt,
                max_retries = self.max_retries,
                "Starting attempt"
            );

            match self.attempt(goal, &prompt, &ctx, &mut outcome).await {
                Ok(critique) => {
                    if let Err(e) = progress.attempt_finished(attempt, self.max_retries).await {
                        outcome.verdict = Verdict::Failed(e.into());
                        return outcome;
                    }
                    if critique.approved {
                        outcome.verdict = Verdict::Approved;
                        return outcome;
                    }
                    prompt = retry_prompt(goal, &critique.feedback);
                }
                Err((kind, error)) => {
                    tracing::warn!(
                        submission_id = %recorder.submission_id(),
                        attempt,
                        error = %error,
                        "Attempt failed"
                    );
                    if let Err(e) = recorder.failure(kind, &error.to_string()).await {
                        tracing::error!(error = %e, "Failed to record failure trace");
                    }
                    outcome.verdict = Verdict::Failed(error);
                    return outcome;
                }
            }
        }

        tracing::info!(
            submission_id = %recorder.submission_id(),
            attempts = outcome.attempts,
            "Retries exhausted without approval"
        );
        outcome
    }

    /// One plan, act, reflect pass. Errors carry the kind of the failing step.
    async fn attempt(
        &self,
        goal: &str,
        prompt: &str,
        ctx: &ActContext<'_>,
        outcome: &mut LoopOutcome,
    ) -> Result<super::review::Critique, (TraceKind, AgentError)> {
        if ctx.cancel.is_cancelled() {
            return Err((TraceKind::Agent, AgentError::Cancelled));
        }

        let plan = match self.planner.plan(prompt, ctx.cancel).await {
            Ok(plan) => {
                ctx.recorder
                    .plan(&plan)
                    .await
                    .map_err(|e| (TraceKind::Plan, e.into()))?;
                Some(plan)
            }
            Err(LlmError::Cancelled) => {
                return Err((TraceKind::Plan, AgentError::Llm(LlmError::Cancelled)));
            }
            Err(e) => {
                tracing::warn!(error = %e, "Planning failed, continuing without a plan");
                ctx.recorder
                    .plan_skipped(&e.to_string())
                    .await
                    .map_err(|e| (TraceKind::Plan, e.into()))?;
                None
            }
        };

        let act_prompt = match &plan {
            Some(plan) => execution_prompt(prompt, plan),
            None => prompt.to_string(),
        };
        let act = self.actor.act(&act_prompt, ctx).await;
        outcome.cost = ctx.spent.total();
        let act = act.map_err(|e| (TraceKind::Agent, e))?;
        outcome.response = Some(act.response.clone());

        let critique = self
            .critic
            .review(goal, &act.response, ctx.cancel)
            .await
            .map_err(|e| (TraceKind::Reflection, AgentError::from(e)))?;
        ctx.recorder
            .reflection(critique.approved, &critique.feedback)
            .await
            .map_err(|e| (TraceKind::Reflection, e.into()))?;

        Ok(critique)
    }
}
