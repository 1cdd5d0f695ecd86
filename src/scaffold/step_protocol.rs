//! Step-protocol sub-loop against a remote agent.

use std::sync::Arc;
use std::time::Instant;

use serde_json::{json, Value};

use super::agent_loop::{ActContext, ActOutcome, AgentError};
use crate::protocol::{
    AgentClient, EnvironmentInfo, StepRequest, StepResponse, StepTool, ACTION_FINISH,
    ACTION_RUN_COMMAND,
};
use crate::sandbox::{shell, SandboxError};

/// An agent reached over `POST <endpoint>/agent/step`.
pub struct StepProtocolAgent {
    client: Arc<dyn AgentClient>,
    endpoint: String,
    environment: EnvironmentInfo,
}

impl StepProtocolAgent {
    pub fn new(client: Arc<dyn AgentClient>, endpoint: impl Into<String>) -> Self {
        Self {
            client,
            endpoint: endpoint.into(),
            environment: EnvironmentInfo::default(),
        }
    }

    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }

    /// Feeds observations to the agent until it finishes or the turn budget runs out.
    pub async fn act(&self, prompt: &str, ctx: &ActContext<'_>) -> Result<ActOutcome, AgentError> {
        let tools = vec![run_command_tool()];
        let mut observation = prompt.to_string();

        for step in 1..=ctx.max_turns {
            let request = StepRequest {
                task_id: ctx.recorder.submission_id().to_string(),
                step_number: step,
                input: observation.clone(),
                environment: self.environment.clone(),
                tools: tools.clone(),
            };

            let started = Instant::now();
            let response = tokio::select! {
                biased;
                _ = ctx.cancel.cancelled() => return Err(AgentError::Cancelled),
                response = self.client.step(&self.endpoint, &request) => response?,
            };
            let latency_ms = started.elapsed().as_millis() as u64;

            ctx.recorder
                .agent_turn(step, describe(&response), 0.0, latency_ms)
                .await?;

            match response.action.as_str() {
                ACTION_FINISH => {
                    return Ok(ActOutcome {
                        response: response.final_answer(),
                        cost: 0.0,
                        turns: step,
                    });
                }
                ACTION_RUN_COMMAND => {
                    observation = run_command(&response, step, ctx).await?;
                }
                other => {
                    tracing::debug!(action = other, step, "Unknown agent action");
                    observation = format!("Error: Unknown action '{}'", other);
                }
            }
        }

        Err(AgentError::TurnLimitExceeded {
            max_turns: ctx.max_turns,
        })
    }
}

/// Runs the requested command and returns the next observation.
async fn run_command(
    response: &StepResponse,
    step: u32,
    ctx: &ActContext<'_>,
) -> Result<String, AgentError> {
    let Some(command) = response.command() else {
        let observation = "Error: action_input.command must be a string".to_string();
        ctx.recorder
            .tool_call(
                step,
                ACTION_RUN_COMMAND,
                response.action_input.clone(),
                &observation,
                false,
            )
            .await?;
        return Ok(observation);
    };

    let parameters = json!({ "command": command });
    let (observation, success) = match ctx.sandbox.exec(&shell(command), ctx.cancel).await {
        Ok(out) if out.stderr.is_empty() => (out.stdout, true),
        Ok(out) => (format!("{}\nStderr: {}", out.stdout, out.stderr), true),
        Err(SandboxError::NonZeroExit { code, stderr, .. }) => (
            format!("Error: exit code {}\nStderr: {}", code, stderr),
            false,
        ),
        Err(e) => {
            ctx.recorder
                .tool_call(step, ACTION_RUN_COMMAND, parameters, &e.to_string(), false)
                .await?;
            return Err(e.into());
        }
    };

    ctx.recorder
        .tool_call(step, ACTION_RUN_COMMAND, parameters, &observation, success)
        .await?;
    Ok(observation)
}

fn run_command_tool() -> StepTool {
    StepTool {
        name: ACTION_RUN_COMMAND.to_string(),
        description: "Execute a shell command".to_string(),
        parameters: json!({
            "type": "object",
            "properties": {
                "command": {"type": "string"}
            },
            "required": ["command"]
        }),
    }
}

fn describe(response: &StepResponse) -> String {
    let input = match &response.action_input {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    };
    format!(
        "Thought: {}\nAction: {}\nInput: {}",
        response.thought.as_deref().unwrap_or_default(),
        response.action,
        input
    )
}
