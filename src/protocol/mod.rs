//! Step protocol spoken by remote agents.
//!
//! The runner POSTs a [`StepRequest`] to `<endpoint>/agent/step` and the
//! agent answers with a [`StepResponse`] naming its next action:
//! - `run_command` with `action_input.command`: run it in the sandbox
//! - `finish`: stop, `action_input` is the final answer

pub mod client;

pub use client::{AgentClient, AgentClientFactory, HttpAgentClient, HttpAgentClientFactory};

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Action that ends the loop.
pub const ACTION_FINISH: &str = "finish";
/// Action that runs a shell command.
pub const ACTION_RUN_COMMAND: &str = "run_command";

/// Path appended to an agent's endpoint.
pub const STEP_PATH: &str = "/agent/step";

/// One observation sent to the agent.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StepRequest {
    pub task_id: String,
    /// 1-based.
    pub step_number: u32,
    /// The goal on step 1, the previous command's output afterwards.
    pub input: String,
    pub environment: EnvironmentInfo,
    pub tools: Vec<StepTool>,
}

/// Where the agent's commands run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EnvironmentInfo {
    pub cwd: String,
    pub os: String,
}

impl Default for EnvironmentInfo {
    fn default() -> Self {
        Self {
            cwd: "/workspace".to_string(),
            os: "linux".to_string(),
        }
    }
}

/// A tool the agent may name as its action.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StepTool {
    pub name: String,
    pub description: String,
    /// JSON Schema of `action_input`.
    pub parameters: Value,
}

/// The agent's reply to one step.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StepResponse {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub thought: Option<String>,
    pub action: String,
    #[serde(default)]
    pub action_input: Value,
}

impl StepResponse {
    /// `action_input.command` for `run_command`, if it is a string.
    pub fn command(&self) -> Option<&str> {
        self.action_input.get("command").and_then(Value::as_str)
    }

    /// `action_input` rendered as the final answer.
    pub fn final_answer(&self) -> String {
        match &self.action_input {
            Value::String(s) => s.clone(),
            Value::Null => String::new(),
            other => other.to_string(),
        }
    }
}
