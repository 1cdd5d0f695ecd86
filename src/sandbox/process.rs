//! Local subprocess sandbox.
//!
//! Commands run on the host inside a private scratch directory. There is no
//! isolation beyond the working directory, so this backend is meant for
//! development and tests.

use std::process::Stdio;
use std::sync::{Arc, PoisonError, RwLock};

use async_trait::async_trait;
use tempfile::TempDir;
use tokio::process::Command;
use tokio_util::sync::CancellationToken;
use tracing::debug;

use super::{ExecOutput, Sandbox, SandboxError, SandboxProvider};
use crate::execution::ExecutionLimits;

/// Runs commands as child processes of the platform.
#[derive(Default)]
pub struct ProcessSandbox {
    workdir: RwLock<Option<TempDir>>,
}

impl ProcessSandbox {
    pub fn new() -> Self {
        Self::default()
    }

    fn workdir_path(&self) -> Option<std::path::PathBuf> {
        self.workdir
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .as_ref()
            .map(|dir| dir.path().to_path_buf())
    }
}

#[async_trait]
impl Sandbox for ProcessSandbox {
    fn id(&self) -> String {
        self.workdir_path()
            .map(|p| p.display().to_string())
            .unwrap_or_default()
    }

    async fn start(&self) -> Result<(), SandboxError> {
        let dir = tempfile::Builder::new().prefix("agentbench-sbx-").tempdir()?;
        debug!(path = %dir.path().display(), "Process sandbox started");
        *self.workdir.write().unwrap_or_else(PoisonError::into_inner) = Some(dir);
        Ok(())
    }

    async fn exec(
        &self,
        command: &[String],
        cancel: &CancellationToken,
    ) -> Result<ExecOutput, SandboxError> {
        let dir = self.workdir_path().ok_or(SandboxError::NotStarted)?;
        let (program, args) = command.split_first().ok_or_else(|| {
            SandboxError::Io(std::io::Error::new(
                std::io::ErrorKind::InvalidInput,
                "empty command",
            ))
        })?;

        let child = Command::new(program)
            .args(args)
            .current_dir(&dir)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()?;

        // Dropping the wait future on cancel kills the child.
        let output = tokio::select! {
            biased;
            _ = cancel.cancelled() => return Err(SandboxError::Cancelled),
            output = child.wait_with_output() => output?,
        };

        let stdout = String::from_utf8_lossy(&output.stdout).to_string();
        let stderr = String::from_utf8_lossy(&output.stderr).to_string();

        if !output.status.success() {
            return Err(SandboxError::NonZeroExit {
                code: output.status.code().map_or(-1, i64::from),
                stdout,
                stderr,
            });
        }
        Ok(ExecOutput { stdout, stderr })
    }

    async fn stop(&self) -> Result<(), SandboxError> {
        let dir = self
            .workdir
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
        if let Some(dir) = dir {
            dir.close()?;
        }
        Ok(())
    }
}

/// Creates a [`ProcessSandbox`] per submission. Limits are not enforced.
#[derive(Debug, Default)]
pub struct ProcessSandboxProvider;

impl SandboxProvider for ProcessSandboxProvider {
    fn create(
        &self,
        _submission_id: &str,
        _limits: &ExecutionLimits,
    ) -> Result<Arc<dyn Sandbox>, SandboxError> {
        Ok(Arc::new(ProcessSandbox::new()))
    }
}
