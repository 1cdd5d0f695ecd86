//! Tool catalog offered to tool-calling agents.
//!
//! Every tool runs inside the submission's sandbox. A tool that ran but
//! failed (bad exit code, missing file) produces a failed [`ToolResult`] the
//! agent can react to; only sandbox infrastructure failures and
//! cancellation surface as [`ToolError::Sandbox`].

pub mod bash;
pub mod file;

pub use bash::RunCommandTool;
pub use file::{ReadFileTool, WriteFileTool};

use std::sync::Arc;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;
use tokio_util::sync::CancellationToken;

use crate::llm::ToolDefinition;
use crate::sandbox::{Sandbox, SandboxError};

/// Maximum output length kept per stream.
const MAX_OUTPUT_LENGTH: usize = 100_000;

/// Errors that can occur during tool execution.
#[derive(Debug, Error)]
pub enum ToolError {
    /// Arguments missing, mistyped or not valid JSON.
    #[error("Invalid parameters: {0}")]
    InvalidParameters(String),

    /// The agent named a tool that is not in the catalog.
    #[error("Unknown tool: {0}")]
    UnknownTool(String),

    /// The sandbox itself failed or the run was cancelled.
    #[error("Sandbox error: {0}")]
    Sandbox(#[from] SandboxError),
}

impl ToolError {
    /// Whether the agent should see this error as an observation and carry on.
    pub fn is_recoverable(&self) -> bool {
        !matches!(self, ToolError::Sandbox(_))
    }
}

/// Result of a tool execution.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolResult {
    pub success: bool,
    pub output: String,
    pub error: Option<String>,
}

impl ToolResult {
    /// Create a successful tool result.
    pub fn success(output: impl Into<String>) -> Self {
        Self {
            success: true,
            output: output.into(),
            error: None,
        }
    }

    /// Create a failed tool result.
    pub fn failure(error: impl Into<String>) -> Self {
        Self {
            success: false,
            output: String::new(),
            error: Some(error.into()),
        }
    }

    /// Create a result with both output and error (partial success).
    pub fn partial(output: impl Into<String>, error: impl Into<String>) -> Self {
        Self {
            success: false,
            output: output.into(),
            error: Some(error.into()),
        }
    }

    /// Text returned to the agent.
    pub fn render(&self) -> String {
        match (&self.error, self.output.is_empty()) {
            (None, _) => self.output.clone(),
            (Some(error), true) => error.clone(),
            (Some(error), false) => format!("{}\n{}", self.output, error),
        }
    }
}

/// What a tool runs against.
pub struct ToolContext<'a> {
    pub sandbox: &'a dyn Sandbox,
    pub cancel: &'a CancellationToken,
}

impl<'a> ToolContext<'a> {
    pub fn new(sandbox: &'a dyn Sandbox, cancel: &'a CancellationToken) -> Self {
        Self { sandbox, cancel }
    }
}

/// Trait for tools that can be executed by the agent.
#[async_trait]
pub trait Tool: Send + Sync {
    /// Returns the unique name of the tool.
    fn name(&self) -> &str;

    /// Returns a description of what the tool does.
    fn description(&self) -> &str;

    /// Returns the JSON schema for the tool's parameters.
    fn parameters_schema(&self) -> Value;

    /// Execute the tool with parsed JSON arguments.
    async fn execute(&self, args: Value, ctx: &ToolContext<'_>) -> Result<ToolResult, ToolError>;
}

/// Ordered set of tools.
pub struct ToolRegistry {
    tools: Vec<Arc<dyn Tool>>,
}

impl ToolRegistry {
    /// Create a new empty tool registry.
    pub fn new() -> Self {
        Self { tools: Vec::new() }
    }

    /// `read_file`, `write_file`, `run_command`.
    pub fn with_default_tools() -> Self {
        let mut registry = Self::new();
        registry.register(Arc::new(ReadFileTool));
        registry.register(Arc::new(WriteFileTool));
        registry.register(Arc::new(RunCommandTool));
        registry
    }

    /// Register a tool, replacing any tool with the same name.
    pub fn register(&mut self, tool: Arc<dyn Tool>) {
        self.tools.retain(|t| t.name() != tool.name());
        self.tools.push(tool);
    }

    /// Get a tool by name.
    pub fn get(&self, name: &str) -> Option<Arc<dyn Tool>> {
        self.tools.iter().find(|t| t.name() == name).cloned()
    }

    /// List all registered tool names in registration order.
    pub fn list_tools(&self) -> Vec<&str> {
        self.tools.iter().map(|t| t.name()).collect()
    }

    pub fn len(&self) -> usize {
        self.tools.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tools.is_empty()
    }

    /// Function-tool definitions for a chat-completions request.
    pub fn definitions(&self) -> Vec<ToolDefinition> {
        self.tools
            .iter()
            .map(|tool| {
                ToolDefinition::function(tool.name(), tool.description(), tool.parameters_schema())
            })
            .collect()
    }

    /// Runs `name` with JSON-encoded `arguments`.
    pub async fn execute(
        &self,
        name: &str,
        arguments: &str,
        ctx: &ToolContext<'_>,
    ) -> Result<ToolResult, ToolError> {
        let tool = self
            .get(name)
            .ok_or_else(|| ToolError::UnknownTool(name.to_string()))?;

        let args: Value = if arguments.trim().is_empty() {
            Value::Object(Default::default())
        } else {
            serde_json::from_str(arguments)
                .map_err(|e| ToolError::InvalidParameters(format!("invalid arguments: {}", e)))?
        };

        tool.execute(args, ctx).await
    }
}

impl Default for ToolRegistry {
    fn default() -> Self {
        Self::new()
    }
}

/// Reads a required string argument.
pub(crate) fn required_str<'v>(args: &'v Value, key: &str) -> Result<&'v str, ToolError> {
    args.get(key)
        .and_then(Value::as_str)
        .ok_or_else(|| ToolError::InvalidParameters(format!("missing {}", key)))
}

/// Turns a command failure into a failed result, keeping infrastructure
/// errors as errors.
pub(crate) fn exec_failure(err: SandboxError) -> Result<ToolResult, ToolError> {
    match err {
        SandboxError::NonZeroExit {
            code,
            stdout,
            stderr,
        } => Ok(ToolResult::partial(
            truncate(stdout),
            format!("Error: command exited with code {}\nStderr: {}", code, truncate(stderr)),
        )),
        other => Err(ToolError::Sandbox(other)),
    }
}

pub(crate) fn truncate(mut text: String) -> String {
    if text.len() <= MAX_OUTPUT_LENGTH {
        return text;
    }
    let mut end = MAX_OUTPUT_LENGTH;
    while !text.is_char_boundary(end) {
        end -= 1;
    }
    text.truncate(end);
    text.push_str("\n[output truncated]");
    text
}
