//! Docker execution layer.
//!
//! Wraps the bollard crate for the two kinds of containers the platform
//! runs: per-submission sandboxes and agent images served over HTTP.
//!
//! # Example
//!
//! ```ignore
//! use agentbench::execution::{ContainerSpec, DockerClient};
//!
//! let client = DockerClient::new()?;
//! client.ensure_image("python:3.9-slim").await?;
//!
//! let spec = ContainerSpec::new("agentbench-sbx-1", "python:3.9-slim")
//!     .with_cmd(vec!["tail".into(), "-f".into(), "/dev/null".into()]);
//! let id = client.create_container(&spec).await?;
//! client.start_container(&id).await?;
//! let result = client.exec_command(&id, &["python".into(), "-V".into()]).await?;
//! client.remove_container(&id, true).await?;
//! ```

pub mod agent_container;
pub mod docker_client;
pub mod resources;

pub use agent_container::{
    with_agent_container, AgentContainer, ContainerProvisioner, DockerAgentProvisioner,
};
pub use docker_client::{ContainerSpec, DockerClient, ExecResult};
pub use resources::{limits_for_difficulty, ExecutionLimits};
