//! Error types for agentbench operations.
//!
//! Defines the error types shared by more than one subsystem:
//! - Event bus delivery
//! - Docker container management
//! - LLM API interactions
//! - Step-protocol agent calls
//! - Agent and benchmark registration

use thiserror::Error;

use crate::storage::StorageError;

/// Boxed error returned by a bus subscriber.
pub type HandlerError = Box<dyn std::error::Error + Send + Sync + 'static>;

/// Errors that can occur while delivering events.
#[derive(Debug, Error)]
pub enum BusError {
    #[error("Handler for '{topic}' failed: {source}")]
    Handler {
        topic: String,
        #[source]
        source: HandlerError,
    },

    #[error("Dispatch queue for '{0}' is closed")]
    QueueClosed(String),
}

impl BusError {
    /// Wraps a subscriber failure for the given topic.
    pub fn handler(topic: impl Into<String>, source: impl Into<HandlerError>) -> Self {
        Self::Handler {
            topic: topic.into(),
            source: source.into(),
        }
    }
}

/// Errors that can occur during Docker operations.
#[derive(Debug, Error)]
pub enum DockerError {
    #[error("Docker image pull failed: {0}")]
    PullFailed(String),

    #[error("Docker run failed: {0}")]
    RunFailed(String),

    #[error("Container '{id}' not found")]
    ContainerNotFound { id: String },

    #[error("Container port {port} is not published")]
    PortNotPublished { port: u16 },

    #[error("Container did not become ready within {seconds} seconds")]
    Timeout { seconds: u64 },

    #[error("Docker daemon not available: {0}")]
    DaemonUnavailable(String),

    #[error("Operation cancelled")]
    Cancelled,
}

/// Errors that can occur during LLM API calls.
#[derive(Debug, Error)]
pub enum LlmError {
    #[error("HTTP request failed: {0}")]
    RequestFailed(String),

    #[error("Failed to parse LLM response: {0}")]
    ParseError(String),

    #[error("Rate limited: {0}")]
    RateLimited(String),

    #[error("API error ({code}): {message}")]
    ApiError { code: u16, message: String },

    #[error("LLM returned no choices")]
    EmptyResponse,

    #[error("Request cancelled")]
    Cancelled,
}

/// Errors that can occur when talking to a step-protocol agent.
#[derive(Debug, Error)]
pub enum AgentClientError {
    #[error("Agent endpoint is not configured")]
    MissingEndpoint,

    #[error("HTTP request failed: {0}")]
    RequestFailed(String),

    #[error("Agent returned status {code}: {body}")]
    Status { code: u16, body: String },

    #[error("Failed to parse agent response: {0}")]
    ParseError(String),

    #[error("Request cancelled")]
    Cancelled,
}

/// Errors that can occur while registering agents and benchmarks.
#[derive(Debug, Error)]
pub enum RegistryError {
    #[error("Name is required")]
    MissingName,

    #[error("Storage error: {0}")]
    Storage(#[from] StorageError),
}
