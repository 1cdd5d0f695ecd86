//! agentbench: benchmark pipeline for LLM agents.
//!
//! Submissions flow through an in-process event bus:
//! orchestrator → runner → scoring → leaderboard. The runner drives each
//! agent through a plan/act/reflect loop inside a sandbox and records every
//! step as a trace.

pub mod bus;
pub mod cli;
pub mod config;
pub mod error;
pub mod execution;
pub mod llm;
pub mod metrics;
pub mod models;
pub mod platform;
pub mod protocol;
pub mod sandbox;
pub mod scaffold;
pub mod services;
pub mod storage;

pub use config::Config;
pub use error::{AgentClientError, BusError, DockerError, LlmError, RegistryError};
pub use platform::{Platform, PlatformBuilder, PlatformError};
