//! Shell command tool.

use async_trait::async_trait;
use serde_json::{json, Value};

use super::{exec_failure, required_str, truncate, Tool, ToolContext, ToolError, ToolResult};
use crate::sandbox::shell;

/// `run_command`: runs a shell command in the sandbox.
#[derive(Debug, Default, Clone, Copy)]
pub struct RunCommandTool;

#[async_trait]
impl Tool for RunCommandTool {
    fn name(&self) -> &str {
        "run_command"
    }

    fn description(&self) -> &str {
        "Execute a shell command in the sandbox."
    }

    fn parameters_schema(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "command": {
                    "type": "string",
                    "description": "The command to execute."
                }
            },
            "required": ["command"]
        })
    }

    async fn execute(&self, args: Value, ctx: &ToolContext<'_>) -> Result<ToolResult, ToolError> {
        let command = required_str(&args, "command")?;

        match ctx.sandbox.exec(&shell(command), ctx.cancel).await {
            Ok(out) => Ok(ToolResult::success(format!(
                "Stdout:\n{}\nStderr:\n{}",
                truncate(out.stdout),
                truncate(out.stderr)
            ))),
            Err(e) => exec_failure(e),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sandbox::{ProcessSandbox, Sandbox, SandboxError};
    use tokio_util::sync::CancellationToken;

    #[tokio::test]
    async fn test_run_command_formats_streams() {
        let sandbox = ProcessSandbox::new();
        sandbox.start().await.unwrap();
        let cancel = CancellationToken::new();
        let ctx = ToolContext::new(&sandbox, &cancel);

        let result = RunCommandTool
            .execute(json!({"command": "echo hi; echo warn >&2"}), &ctx)
            .await
            .unwrap();

        assert!(result.success);
        assert_eq!(result.output, "Stdout:\nhi\n\nStderr:\nwarn\n");
        sandbox.stop().await.unwrap();
    }

    #[tokio::test]
    async fn test_failing_command_is_observation() {
        let sandbox = ProcessSandbox::new();
        sandbox.start().await.unwrap();
        let cancel = CancellationToken::new();
        let ctx = ToolContext::new(&sandbox, &cancel);

        let result = RunCommandTool
            .execute(json!({"command": "echo nope >&2; exit 1"}), &ctx)
            .await
            .unwrap();

        assert!(!result.success);
        assert!(result.render().contains("exited with code 1"));
        assert!(result.render().contains("Stderr: nope"));
        sandbox.stop().await.unwrap();
    }

    #[tokio::test]
    async fn test_cancelled_command_is_error() {
        let sandbox = ProcessSandbox::new();
        sandbox.start().await.unwrap();
        let cancel = CancellationToken::new();
        cancel.cancel();
        let ctx = ToolContext::new(&sandbox, &cancel);

        let err = RunCommandTool
            .execute(json!({"command": "sleep 5"}), &ctx)
            .await
            .unwrap_err();

        assert!(matches!(err, ToolError::Sandbox(SandboxError::Cancelled)));
        assert!(!err.is_recoverable());
        sandbox.stop().await.unwrap();
    }
}
