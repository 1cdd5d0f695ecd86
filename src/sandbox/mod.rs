//! Isolated command execution for one submission.
//!
//! A [`Sandbox`] moves through `created → started → (exec)* → stopped`.
//! `stop` is idempotent and a no-op if the sandbox never started.
//! [`with_sandbox`] is the scoped form the runner uses: it starts the
//! sandbox, runs the body, and stops the sandbox on every exit path.
//!
//! Backends:
//! - [`DockerSandbox`]: one long-lived container per submission
//! - [`ProcessSandbox`]: `sh` subprocesses in a scratch directory, for local
//!   runs and tests where no Docker daemon is available

pub mod docker;
pub mod process;
pub mod registry;

pub use docker::{DockerSandbox, DockerSandboxProvider};
pub use process::{ProcessSandbox, ProcessSandboxProvider};
pub use registry::{SandboxLease, SandboxRegistry};

use std::future::Future;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;

use async_trait::async_trait;
use futures::FutureExt;
use thiserror::Error;
use tokio_util::sync::CancellationToken;
use tracing::warn;

use crate::error::DockerError;
use crate::execution::ExecutionLimits;

/// Errors that can occur inside a sandbox.
#[derive(Debug, Error)]
pub enum SandboxError {
    #[error("Sandbox is not started")]
    NotStarted,

    #[error("Command exited with code {code}: {stderr}")]
    NonZeroExit {
        code: i64,
        stdout: String,
        stderr: String,
    },

    #[error("Docker error: {0}")]
    Docker(#[from] DockerError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Command cancelled")]
    Cancelled,
}

/// Captured output of a command that exited successfully.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ExecOutput {
    pub stdout: String,
    pub stderr: String,
}

/// An isolated execution environment.
#[async_trait]
pub trait Sandbox: Send + Sync {
    /// Backend identifier (container id, scratch path). Empty before `start`.
    fn id(&self) -> String;

    /// Provisions the environment, pulling its image if absent.
    async fn start(&self) -> Result<(), SandboxError>;

    /// Runs `command` to completion.
    ///
    /// A non-zero exit is `SandboxError::NonZeroExit` carrying both streams.
    /// Cancelling `cancel` aborts the command with `SandboxError::Cancelled`.
    async fn exec(
        &self,
        command: &[String],
        cancel: &CancellationToken,
    ) -> Result<ExecOutput, SandboxError>;

    /// Tears the environment down. Safe to call more than once.
    async fn stop(&self) -> Result<(), SandboxError>;
}

/// Creates one sandbox per submission.
pub trait SandboxProvider: Send + Sync {
    fn create(
        &self,
        submission_id: &str,
        limits: &ExecutionLimits,
    ) -> Result<Arc<dyn Sandbox>, SandboxError>;
}

/// `sh -c <script>` as an argv.
pub fn shell(script: impl Into<String>) -> Vec<String> {
    vec!["sh".to_string(), "-c".to_string(), script.into()]
}

/// Starts `sandbox`, runs `f` with it, then stops it.
///
/// The sandbox is stopped when `f` completes, when it panics (the panic is
/// resumed afterwards) and when `start` itself fails part way.
pub async fn with_sandbox<F, Fut, T>(sandbox: Arc<dyn Sandbox>, f: F) -> Result<T, SandboxError>
where
    F: FnOnce(Arc<dyn Sandbox>) -> Fut,
    Fut: Future<Output = T>,
{
    if let Err(e) = sandbox.start().await {
        stop_quietly(sandbox.as_ref()).await;
        return Err(e);
    }

    let outcome = AssertUnwindSafe(f(Arc::clone(&sandbox)))
        .catch_unwind()
        .await;
    stop_quietly(sandbox.as_ref()).await;

    match outcome {
        Ok(value) => Ok(value),
        Err(panic) => std::panic::resume_unwind(panic),
    }
}

async fn stop_quietly(sandbox: &dyn Sandbox) {
    if let Err(e) = sandbox.stop().await {
        warn!(sandbox_id = %sandbox.id(), error = %e, "Failed to stop sandbox");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

    #[derive(Default)]
    struct Tracked {
        fail_start: bool,
        started: AtomicBool,
        stops: AtomicUsize,
    }

    #[async_trait]
    impl Sandbox for Tracked {
        fn id(&self) -> String {
            "tracked".to_string()
        }

        async fn start(&self) -> Result<(), SandboxError> {
            if self.fail_start {
                return Err(SandboxError::Docker(DockerError::PullFailed("nope".into())));
            }
            self.started.store(true, Ordering::SeqCst);
            Ok(())
        }

        async fn exec(
            &self,
            _command: &[String],
            _cancel: &CancellationToken,
        ) -> Result<ExecOutput, SandboxError> {
            Ok(ExecOutput::default())
        }

        async fn stop(&self) -> Result<(), SandboxError> {
            self.stops.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }
    }

    #[tokio::test]
    async fn test_stops_after_body() {
        let tracked = Arc::new(Tracked::default());
        let value = with_sandbox(tracked.clone(), |_sb| async { 7 }).await.unwrap();

        assert_eq!(value, 7);
        assert!(tracked.started.load(Ordering::SeqCst));
        assert_eq!(tracked.stops.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_stops_when_start_fails() {
        let tracked = Arc::new(Tracked {
            fail_start: true,
            ..Default::default()
        });
        let ran = AtomicBool::new(false);
        let result = with_sandbox(tracked.clone(), |_sb| async {
            ran.store(true, Ordering::SeqCst);
        })
        .await;

        assert!(result.is_err());
        assert!(!ran.load(Ordering::SeqCst));
        assert_eq!(tracked.stops.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_stops_on_panic() {
        let tracked = Arc::new(Tracked::default());
        let sandbox: Arc<dyn Sandbox> = tracked.clone();
        let handle = tokio::spawn(async move {
            with_sandbox(sandbox, |_sb| async { panic!("loop panicked") }).await
        });

        assert!(handle.await.unwrap_err().is_panic());
        assert_eq!(tracked.stops.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_shell_argv() {
        assert_eq!(shell("ls -la"), vec!["sh", "-c", "ls -la"]);
    }
}
