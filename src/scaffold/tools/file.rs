//! File tools.
//!
//! Both go through the sandbox's exec primitive (`cat`, `printf`) so they
//! behave the same on every backend.

use async_trait::async_trait;
use serde_json::{json, Value};

use super::{exec_failure, required_str, truncate, Tool, ToolContext, ToolError, ToolResult};
use crate::sandbox::shell;

/// Quotes `value` for a POSIX shell.
fn shell_quote(value: &str) -> String {
    format!("'{}'", value.replace('\'', r"'\''"))
}

/// `read_file`: returns a file's contents.
#[derive(Debug, Default, Clone, Copy)]
pub struct ReadFileTool;

#[async_trait]
impl Tool for ReadFileTool {
    fn name(&self) -> &str {
        "read_file"
    }

    fn description(&self) -> &str {
        "Read the content of a file from the sandbox."
    }

    fn parameters_schema(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "path": {
                    "type": "string",
                    "description": "The absolute path to the file."
                }
            },
            "required": ["path"]
        })
    }

    async fn execute(&self, args: Value, ctx: &ToolContext<'_>) -> Result<ToolResult, ToolError> {
        let path = required_str(&args, "path")?;
        let command = vec!["cat".to_string(), path.to_string()];

        match ctx.sandbox.exec(&command, ctx.cancel).await {
            Ok(out) if out.stderr.is_empty() => Ok(ToolResult::success(truncate(out.stdout))),
            Ok(out) => Ok(ToolResult::partial(
                truncate(out.stdout),
                format!("Stderr: {}", out.stderr),
            )),
            Err(e) => exec_failure(e),
        }
    }
}

/// `write_file`: creates or overwrites a file.
#[derive(Debug, Default, Clone, Copy)]
pub struct WriteFileTool;

#[async_trait]
impl Tool for WriteFileTool {
    fn name(&self) -> &str {
        "write_file"
    }

    fn description(&self) -> &str {
        "Write content to a file in the sandbox. Overwrites if exists."
    }

    fn parameters_schema(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "path": {
                    "type": "string",
                    "description": "The absolute path to the file."
                },
                "content": {
                    "type": "string",
                    "description": "The content to write."
                }
            },
            "required": ["path", "content"]
        })
    }

    async fn execute(&self, args: Value, ctx: &ToolContext<'_>) -> Result<ToolResult, ToolError> {
        let path = required_str(&args, "path")?;
        let content = required_str(&args, "content")?;
        let script = format!(
            "printf '%s' {} > {}",
            shell_quote(content),
            shell_quote(path)
        );

        match ctx.sandbox.exec(&shell(script), ctx.cancel).await {
            Ok(out) if out.stderr.is_empty() => Ok(ToolResult::success(format!(
                "Successfully wrote to {}",
                path
            ))),
            Ok(out) => Ok(ToolResult::failure(format!("Stderr: {}", out.stderr))),
            Err(e) => exec_failure(e),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sandbox::{ProcessSandbox, Sandbox};
    use tokio_util::sync::CancellationToken;

    #[test]
    fn test_shell_quote() {
        assert_eq!(shell_quote("plain"), "'plain'");
        assert_eq!(shell_quote("it's"), r"'it'\''s'");
    }

    #[tokio::test]
    async fn test_write_then_read() {
        let sandbox = ProcessSandbox::new();
        sandbox.start().await.unwrap();
        let cancel = CancellationToken::new();
        let ctx = ToolContext::new(&sandbox, &cancel);

        let content = "print('it''s $HOME')\n";
        let written = WriteFileTool
            .execute(json!({"path": "script.py", "content": content}), &ctx)
            .await
            .unwrap();
        assert!(written.success);

        let read = ReadFileTool
            .execute(json!({"path": "script.py"}), &ctx)
            .await
            .unwrap();
        assert!(read.success);
        assert_eq!(read.output, content);

        sandbox.stop().await.unwrap();
    }

    #[tokio::test]
    async fn test_read_missing_file_is_observation() {
        let sandbox = ProcessSandbox::new();
        sandbox.start().await.unwrap();
        let cancel = CancellationToken::new();
        let ctx = ToolContext::new(&sandbox, &cancel);

        let result = ReadFileTool
            .execute(json!({"path": "missing.txt"}), &ctx)
            .await
            .unwrap();

        assert!(!result.success);
        assert!(result.render().contains("missing.txt"));
        sandbox.stop().await.unwrap();
    }
}
