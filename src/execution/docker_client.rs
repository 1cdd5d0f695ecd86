//! Docker API wrapper using the bollard crate.
//!
//! Covers what sandboxes and agent containers need: ensure an image is
//! present, create and start a container (optionally publishing one TCP port
//! on a random host port), exec commands, and tear containers down.

use std::collections::HashMap;

use bollard::container::{
    Config, CreateContainerOptions, InspectContainerOptions, LogOutput, RemoveContainerOptions,
    StartContainerOptions, StopContainerOptions,
};
use bollard::exec::{CreateExecOptions, StartExecResults};
use bollard::image::CreateImageOptions;
use bollard::models::{HostConfig, PortBinding};
use bollard::Docker;
use futures::StreamExt;

use crate::error::DockerError;
use crate::execution::resources::ExecutionLimits;

/// What to create.
#[derive(Debug, Clone)]
pub struct ContainerSpec {
    /// Container name, unique on the host.
    pub name: String,
    pub image: String,
    pub cmd: Option<Vec<String>>,
    /// `KEY=value` entries.
    pub env: Vec<String>,
    pub working_dir: Option<String>,
    pub limits: Option<ExecutionLimits>,
    /// Container TCP port to publish on a random host port.
    pub publish_port: Option<u16>,
    /// Let the daemon remove the container once it stops.
    pub auto_remove: bool,
}

impl ContainerSpec {
    /// Creates a new container spec with the given name and image.
    pub fn new(name: impl Into<String>, image: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            image: image.into(),
            cmd: None,
            env: Vec::new(),
            working_dir: None,
            limits: None,
            publish_port: None,
            auto_remove: false,
        }
    }

    pub fn with_cmd(mut self, cmd: Vec<String>) -> Self {
        self.cmd = Some(cmd);
        self
    }

    /// Adds environment variables from a map.
    pub fn with_env(mut self, env: &HashMap<String, String>) -> Self {
        let mut pairs: Vec<String> = env.iter().map(|(k, v)| format!("{k}={v}")).collect();
        pairs.sort();
        self.env.extend(pairs);
        self
    }

    pub fn with_working_dir(mut self, dir: impl Into<String>) -> Self {
        self.working_dir = Some(dir.into());
        self
    }

    pub fn with_limits(mut self, limits: ExecutionLimits) -> Self {
        self.limits = Some(limits);
        self
    }

    pub fn with_published_port(mut self, port: u16) -> Self {
        self.publish_port = Some(port);
        self
    }

    pub fn with_auto_remove(mut self) -> Self {
        self.auto_remove = true;
        self
    }

    fn host_config(&self) -> HostConfig {
        let mut host_config = HostConfig {
            auto_remove: Some(self.auto_remove),
            ..Default::default()
        };

        if let Some(limits) = &self.limits {
            host_config.memory = Some(limits.memory_bytes());
            host_config.cpu_period = Some(limits.cpu_period());
            host_config.cpu_quota = Some(limits.cpu_quota());
            host_config.pids_limit = Some(limits.max_processes as i64);
        }

        if let Some(port) = self.publish_port {
            // Host port "0" lets the daemon pick a free one.
            host_config.port_bindings = Some(HashMap::from([(
                tcp_port(port),
                Some(vec![PortBinding {
                    host_ip: Some("0.0.0.0".to_string()),
                    host_port: Some("0".to_string()),
                }]),
            )]));
        }

        host_config
    }
}

/// Result of executing a command in a container.
#[derive(Debug, Clone, PartialEq)]
pub struct ExecResult {
    pub exit_code: i64,
    pub stdout: String,
    pub stderr: String,
}

fn tcp_port(port: u16) -> String {
    format!("{port}/tcp")
}

/// Docker client wrapper for container operations.
pub struct DockerClient {
    docker: Docker,
}

impl DockerClient {
    /// Creates a new Docker client for the local Docker daemon.
    ///
    /// # Errors
    ///
    /// Returns `DockerError::DaemonUnavailable` if the connection settings are unusable.
    pub fn new() -> Result<Self, DockerError> {
        let docker = Docker::connect_with_local_defaults()
            .map_err(|e| DockerError::DaemonUnavailable(format!("Failed to connect: {e}")))?;

        Ok(Self { docker })
    }

    /// Creates a container and returns its ID.
    pub async fn create_container(&self, spec: &ContainerSpec) -> Result<String, DockerError> {
        let exposed_ports = spec
            .publish_port
            .map(|port| HashMap::from([(tcp_port(port), HashMap::new())]));

        let container_config = Config {
            image: Some(spec.image.clone()),
            cmd: spec.cmd.clone(),
            env: if spec.env.is_empty() {
                None
            } else {
                Some(spec.env.clone())
            },
            working_dir: spec.working_dir.clone(),
            exposed_ports,
            host_config: Some(spec.host_config()),
            tty: Some(false),
            attach_stdin: Some(false),
            attach_stdout: Some(true),
            attach_stderr: Some(true),
            ..Default::default()
        };

        let options = CreateContainerOptions {
            name: spec.name.clone(),
            platform: None,
        };

        let response = self
            .docker
            .create_container(Some(options), container_config)
            .await
            .map_err(|e| DockerError::RunFailed(format!("Failed to create container: {e}")))?;

        Ok(response.id)
    }

    /// Starts a container by ID.
    pub async fn start_container(&self, id: &str) -> Result<(), DockerError> {
        self.docker
            .start_container(id, None::<StartContainerOptions<String>>)
            .await
            .map_err(|e| DockerError::RunFailed(format!("Failed to start container: {e}")))?;

        Ok(())
    }

    /// Stops a container, killing it after `grace_secs`.
    pub async fn stop_container(&self, id: &str, grace_secs: i64) -> Result<(), DockerError> {
        let options = StopContainerOptions { t: grace_secs };

        self.docker
            .stop_container(id, Some(options))
            .await
            .map_err(|e| DockerError::RunFailed(format!("Failed to stop container: {e}")))?;

        Ok(())
    }

    /// Removes a container by ID, killing it first when `force` is set.
    pub async fn remove_container(&self, id: &str, force: bool) -> Result<(), DockerError> {
        let options = RemoveContainerOptions {
            force,
            v: true,
            ..Default::default()
        };

        self.docker
            .remove_container(id, Some(options))
            .await
            .map_err(|e| {
                if e.to_string().contains("No such container") {
                    DockerError::ContainerNotFound { id: id.to_string() }
                } else {
                    DockerError::RunFailed(format!("Failed to remove container: {e}"))
                }
            })?;

        Ok(())
    }

    /// Executes a command inside a running container and waits for it.
    pub async fn exec_command(&self, id: &str, cmd: &[String]) -> Result<ExecResult, DockerError> {
        let exec_options = CreateExecOptions {
            cmd: Some(cmd.to_vec()),
            attach_stdout: Some(true),
            attach_stderr: Some(true),
            tty: Some(false),
            ..Default::default()
        };

        let exec = self
            .docker
            .create_exec(id, exec_options)
            .await
            .map_err(|e| DockerError::RunFailed(format!("Failed to create exec: {e}")))?;

        let start_result = self
            .docker
            .start_exec(&exec.id, None)
            .await
            .map_err(|e| DockerError::RunFailed(format!("Failed to start exec: {e}")))?;

        let mut stdout = String::new();
        let mut stderr = String::new();

        if let StartExecResults::Attached { mut output, .. } = start_result {
            while let Some(chunk) = output.next().await {
                match chunk {
                    Ok(LogOutput::StdOut { message }) => {
                        stdout.push_str(&String::from_utf8_lossy(&message));
                    }
                    Ok(LogOutput::StdErr { message }) => {
                        stderr.push_str(&String::from_utf8_lossy(&message));
                    }
                    Ok(_) => {}
                    Err(e) => {
                        return Err(DockerError::RunFailed(format!("Error reading output: {e}")));
                    }
                }
            }
        }

        // The attached stream ends when the process exits.
        let exec_info = self
            .docker
            .inspect_exec(&exec.id)
            .await
            .map_err(|e| DockerError::RunFailed(format!("Failed to inspect exec: {e}")))?;

        Ok(ExecResult {
            exit_code: exec_info.exit_code.unwrap_or(-1),
            stdout,
            stderr,
        })
    }

    /// Host port the daemon bound to `container_port`.
    pub async fn published_port(&self, id: &str, container_port: u16) -> Result<u16, DockerError> {
        let info = self
            .docker
            .inspect_container(id, None::<InspectContainerOptions>)
            .await
            .map_err(|e| DockerError::RunFailed(format!("Failed to inspect container: {e}")))?;

        info.network_settings
            .and_then(|settings| settings.ports)
            .and_then(|mut ports| ports.remove(&tcp_port(container_port)))
            .flatten()
            .and_then(|bindings| bindings.into_iter().find_map(|b| b.host_port))
            .and_then(|port| port.parse().ok())
            .ok_or(DockerError::PortNotPublished {
                port: container_port,
            })
    }

    /// Pulls a Docker image from a registry.
    pub async fn pull_image(&self, image: &str) -> Result<(), DockerError> {
        let options = CreateImageOptions {
            from_image: image,
            ..Default::default()
        };

        let mut stream = self.docker.create_image(Some(options), None, None);

        while let Some(result) = stream.next().await {
            result.map_err(|e| DockerError::PullFailed(format!("{image}: {e}")))?;
        }

        Ok(())
    }

    /// Checks if an image exists locally.
    pub async fn image_exists(&self, image: &str) -> bool {
        self.docker.inspect_image(image).await.is_ok()
    }

    /// Pulls `image` unless it is already present.
    pub async fn ensure_image(&self, image: &str) -> Result<(), DockerError> {
        if self.image_exists(image).await {
            return Ok(());
        }
        tracing::info!(image = image, "Pulling image");
        self.pull_image(image).await
    }
}
