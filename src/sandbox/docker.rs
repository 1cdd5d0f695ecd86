//! Container-per-submission sandbox.

use std::sync::{Arc, PoisonError, RwLock};

use async_trait::async_trait;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

use super::{ExecOutput, Sandbox, SandboxError, SandboxProvider};
use crate::error::DockerError;
use crate::execution::{ContainerSpec, DockerClient, ExecutionLimits};

/// Working directory inside sandbox containers.
const WORKDIR: &str = "/workspace";

/// A long-lived container that commands are exec'd into.
pub struct DockerSandbox {
    client: Arc<DockerClient>,
    spec: ContainerSpec,
    container_id: RwLock<Option<String>>,
}

impl DockerSandbox {
    pub fn new(client: Arc<DockerClient>, name: impl Into<String>, image: impl Into<String>) -> Self {
        let spec = ContainerSpec::new(name, image)
            .with_cmd(vec!["tail".into(), "-f".into(), "/dev/null".into()])
            .with_working_dir(WORKDIR);
        Self {
            client,
            spec,
            container_id: RwLock::new(None),
        }
    }

    pub fn with_limits(mut self, limits: ExecutionLimits) -> Self {
        self.spec = self.spec.with_limits(limits);
        self
    }

    fn current_id(&self) -> Option<String> {
        self.container_id
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }
}

#[async_trait]
impl Sandbox for DockerSandbox {
    fn id(&self) -> String {
        self.current_id().unwrap_or_default()
    }

    async fn start(&self) -> Result<(), SandboxError> {
        self.client.ensure_image(&self.spec.image).await?;

        let id = self.client.create_container(&self.spec).await?;
        // Recorded before start so a failed start is still removed by stop().
        *self
            .container_id
            .write()
            .unwrap_or_else(PoisonError::into_inner) = Some(id.clone());

        self.client.start_container(&id).await?;
        // The image may not ship the working directory.
        self.client
            .exec_command(&id, &super::shell(format!("mkdir -p {WORKDIR}")))
            .await?;

        info!(container_id = %id, image = %self.spec.image, "Sandbox started");
        Ok(())
    }

    async fn exec(
        &self,
        command: &[String],
        cancel: &CancellationToken,
    ) -> Result<ExecOutput, SandboxError> {
        let id = self.current_id().ok_or(SandboxError::NotStarted)?;
        debug!(container_id = %id, command = ?command, "Sandbox exec");

        let result = tokio::select! {
            biased;
            _ = cancel.cancelled() => return Err(SandboxError::Cancelled),
            result = self.client.exec_command(&id, command) => result?,
        };

        if result.exit_code != 0 {
            return Err(SandboxError::NonZeroExit {
                code: result.exit_code,
                stdout: result.stdout,
                stderr: result.stderr,
            });
        }
        Ok(ExecOutput {
            stdout: result.stdout,
            stderr: result.stderr,
        })
    }

    async fn stop(&self) -> Result<(), SandboxError> {
        let id = self
            .container_id
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
        let Some(id) = id else {
            return Ok(());
        };

        match self.client.remove_container(&id, true).await {
            Ok(()) | Err(DockerError::ContainerNotFound { .. }) => {
                info!(container_id = %id, "Sandbox removed");
                Ok(())
            }
            Err(e) => Err(e.into()),
        }
    }
}

/// Creates a [`DockerSandbox`] per submission from one image.
pub struct DockerSandboxProvider {
    client: Arc<DockerClient>,
    image: String,
}

impl DockerSandboxProvider {
    pub fn new(client: Arc<DockerClient>, image: impl Into<String>) -> Self {
        Self {
            client,
            image: image.into(),
        }
    }
}

impl SandboxProvider for DockerSandboxProvider {
    fn create(
        &self,
        submission_id: &str,
        limits: &ExecutionLimits,
    ) -> Result<Arc<dyn Sandbox>, SandboxError> {
        let name = format!("agentbench-sbx-{}", submission_id);
        Ok(Arc::new(
            DockerSandbox::new(Arc::clone(&self.client), name, self.image.clone())
                .with_limits(limits.clone()),
        ))
    }
}
