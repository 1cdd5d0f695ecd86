//! Agent containers: agents shipped as images and reached over HTTP.
//!
//! Lifecycle:
//! ```text
//! ensure image → create (port published, auto-remove) → start
//!   → resolve host port → wait for TCP readiness → [run] → stop
//! ```

use std::collections::HashMap;
use std::future::Future;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use futures::FutureExt;
use tokio::net::TcpStream;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::error::DockerError;
use crate::execution::docker_client::{ContainerSpec, DockerClient};

/// Interval between readiness probes.
const READY_POLL_INTERVAL: Duration = Duration::from_millis(200);

/// A running agent container.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AgentContainer {
    pub container_id: String,
    /// `http://localhost:<host port>`
    pub endpoint: String,
}

/// Starts and tears down agent containers.
#[async_trait]
pub trait ContainerProvisioner: Send + Sync {
    /// Starts `image` with `env` injected and returns a reachable endpoint.
    async fn provision(
        &self,
        image: &str,
        env: &HashMap<String, String>,
        cancel: &CancellationToken,
    ) -> Result<AgentContainer, DockerError>;

    /// Stops the container. Errors are logged, not returned.
    async fn release(&self, container: &AgentContainer);
}

/// [`ContainerProvisioner`] backed by the local Docker daemon.
pub struct DockerAgentProvisioner {
    client: Arc<DockerClient>,
    container_port: u16,
    ready_timeout: Duration,
}

impl DockerAgentProvisioner {
    pub fn new(client: Arc<DockerClient>, container_port: u16, ready_timeout: Duration) -> Self {
        Self {
            client,
            container_port,
            ready_timeout,
        }
    }

    async fn start(
        &self,
        image: &str,
        env: &HashMap<String, String>,
    ) -> Result<AgentContainer, DockerError> {
        self.client.ensure_image(image).await?;

        let spec = ContainerSpec::new(format!("agentbench-agent-{}", Uuid::new_v4()), image)
            .with_env(env)
            .with_published_port(self.container_port)
            .with_auto_remove();

        let container_id = self.client.create_container(&spec).await?;
        let provisioned = async {
            self.client.start_container(&container_id).await?;
            let port = self
                .client
                .published_port(&container_id, self.container_port)
                .await?;
            let address = format!("127.0.0.1:{port}");
            wait_for_port(&address, self.ready_timeout).await?;
            Ok(format!("http://localhost:{port}"))
        }
        .await;

        match provisioned {
            Ok(endpoint) => Ok(AgentContainer {
                container_id,
                endpoint,
            }),
            Err(e) => {
                // A container that never started is not auto-removed.
                if let Err(cleanup) = self.client.remove_container(&container_id, true).await {
                    debug!(container_id = %container_id, error = %cleanup, "Cleanup after failed start");
                }
                Err(e)
            }
        }
    }
}

#[async_trait]
impl ContainerProvisioner for DockerAgentProvisioner {
    async fn provision(
        &self,
        image: &str,
        env: &HashMap<String, String>,
        cancel: &CancellationToken,
    ) -> Result<AgentContainer, DockerError> {
        info!(image = image, "Starting agent container");
        tokio::select! {
            biased;
            _ = cancel.cancelled() => Err(DockerError::Cancelled),
            result = self.start(image, env) => result,
        }
    }

    async fn release(&self, container: &AgentContainer) {
        // Auto-remove deletes the container once stopped.
        if let Err(e) = self.client.stop_container(&container.container_id, 0).await {
            warn!(
                container_id = %container.container_id,
                error = %e,
                "Failed to stop agent container"
            );
        }
    }
}

/// Polls `address` until it accepts TCP connections.
pub async fn wait_for_port(address: &str, timeout: Duration) -> Result<(), DockerError> {
    let deadline = tokio::time::Instant::now() + timeout;
    loop {
        if TcpStream::connect(address).await.is_ok() {
            debug!(address = address, "Agent container ready");
            return Ok(());
        }
        if tokio::time::Instant::now() >= deadline {
            return Err(DockerError::Timeout {
                seconds: timeout.as_secs(),
            });
        }
        tokio::time::sleep(READY_POLL_INTERVAL).await;
    }
}

/// Runs `f` against a freshly provisioned container and releases it on
/// every exit path, panics included.
pub async fn with_agent_container<F, Fut, T>(
    provisioner: &dyn ContainerProvisioner,
    image: &str,
    env: &HashMap<String, String>,
    cancel: &CancellationToken,
    f: F,
) -> Result<T, DockerError>
where
    F: FnOnce(AgentContainer) -> Fut,
    Fut: Future<Output = T>,
{
    let container = provisioner.provision(image, env, cancel).await?;
    let outcome = AssertUnwindSafe(f(container.clone())).catch_unwind().await;
    provisioner.release(&container).await;
    match outcome {
        Ok(value) => Ok(value),
        Err(panic) => std::panic::resume_unwind(panic),
    }
}
