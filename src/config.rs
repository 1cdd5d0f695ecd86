//! Platform configuration.
//!
//! A single [`Config`] is built at startup and handed to every component
//! constructor. Nothing reads configuration from a global.

use std::time::Duration;
use thiserror::Error;

use crate::llm::PricingTable;

/// Errors that can occur during configuration operations.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// An environment variable has an invalid value.
    #[error("Invalid value for {key}: {message}")]
    InvalidValue { key: String, message: String },

    /// Configuration validation failed.
    #[error("Configuration validation failed: {0}")]
    ValidationFailed(String),
}

/// Which sandbox implementation the runner provisions.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SandboxBackend {
    /// One Docker container per submission.
    Docker,
    /// A scratch directory and local `sh -c` subprocesses.
    Process,
}

impl std::str::FromStr for SandboxBackend {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "docker" => Ok(Self::Docker),
            "process" | "local" => Ok(Self::Process),
            other => Err(format!("unknown sandbox backend '{}'", other)),
        }
    }
}

/// Chat endpoint used to plan and review for agents that do not speak
/// chat completions themselves.
#[derive(Debug, Clone, PartialEq)]
pub struct ReviewerConfig {
    pub endpoint: String,
    pub model: String,
}

/// Configuration for the benchmark platform.
#[derive(Debug, Clone)]
pub struct Config {
    /// Deployment name (`development`, `production`, ...).
    pub environment: String,
    /// `memory://...` or `sqlite:<path>`.
    pub storage_dsn: String,

    // Sandbox settings
    pub sandbox_backend: SandboxBackend,
    /// Image for per-submission Docker sandboxes.
    pub sandbox_image: String,

    // Execution loop settings
    /// Top-level plan/act/reflect attempts.
    pub max_retries: u32,
    /// Turn bound for the tool-calling and step-protocol loops.
    pub max_turns: u32,
    /// Wall-clock limit for one submission.
    pub run_timeout: Duration,
    /// Timeout for every outbound HTTP call.
    pub http_timeout: Duration,

    // LLM settings
    pub default_llm_endpoint: String,
    pub default_model: String,
    pub api_key: Option<String>,
    pub reviewer: Option<ReviewerConfig>,
    pub pricing: PricingTable,

    // Agent container settings
    /// Port the agent image listens on.
    pub agent_container_port: u16,
    pub agent_ready_timeout: Duration,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            environment: "development".to_string(),
            storage_dsn: "memory://default".to_string(),

            sandbox_backend: SandboxBackend::Docker,
            sandbox_image: "python:3.9-slim".to_string(),

            max_retries: 3,
            max_turns: 10,
            run_timeout: Duration::from_secs(1800), // 30 minutes
            http_timeout: Duration::from_secs(60),

            default_llm_endpoint: "https://api.openai.com/v1/chat/completions".to_string(),
            default_model: "gpt-4".to_string(),
            api_key: None,
            reviewer: None,
            pricing: PricingTable::default(),

            agent_container_port: 8080,
            agent_ready_timeout: Duration::from_secs(10),
        }
    }
}

impl Config {
    /// Creates a new configuration with default values.
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates configuration from environment variables.
    ///
    /// # Environment Variables
    ///
    /// - `APP_ENV`: Deployment name (default: development)
    /// - `STORAGE_DSN`: Store location (default: memory://default)
    /// - `SANDBOX_BACKEND`: `docker` or `process` (default: docker)
    /// - `SANDBOX_IMAGE`: Sandbox image (default: python:3.9-slim)
    /// - `RUNNER_MAX_RETRIES`: Attempts per submission (default: 3)
    /// - `RUNNER_MAX_TURNS`: Turns per attempt (default: 10)
    /// - `RUNNER_TIMEOUT_SECS`: Per-submission timeout (default: 1800)
    /// - `AGENT_HTTP_TIMEOUT_SECS`: Outbound HTTP timeout (default: 60)
    /// - `LLM_ENDPOINT`: Chat completions URL (default: OpenAI)
    /// - `LLM_DEFAULT_MODEL`: Model when an agent names none (default: gpt-4)
    /// - `OPENAI_API_KEY`: Bearer credential for chat endpoints
    /// - `REVIEWER_ENDPOINT` / `REVIEWER_MODEL`: Planner and critic for step-protocol agents
    /// - `AGENT_CONTAINER_PORT`: Port agent images listen on (default: 8080)
    /// - `AGENT_READY_TIMEOUT_SECS`: Agent container readiness wait (default: 10)
    ///
    /// # Errors
    ///
    /// Returns `ConfigError` if a variable has an invalid value.
    pub fn from_env() -> Result<Self, ConfigError> {
        let mut config = Self::default();

        if let Ok(val) = std::env::var("APP_ENV") {
            config.environment = val;
        }

        if let Ok(val) = std::env::var("STORAGE_DSN") {
            config.storage_dsn = val;
        }

        // Sandbox settings
        if let Ok(val) = std::env::var("SANDBOX_BACKEND") {
            config.sandbox_backend = val.parse().map_err(|message| ConfigError::InvalidValue {
                key: "SANDBOX_BACKEND".to_string(),
                message,
            })?;
        }

        if let Ok(val) = std::env::var("SANDBOX_IMAGE") {
            config.sandbox_image = val;
        }

        // Execution loop settings
        if let Ok(val) = std::env::var("RUNNER_MAX_RETRIES") {
            config.max_retries = parse_env_value(&val, "RUNNER_MAX_RETRIES")?;
        }

        if let Ok(val) = std::env::var("RUNNER_MAX_TURNS") {
            config.max_turns = parse_env_value(&val, "RUNNER_MAX_TURNS")?;
        }

        if let Ok(val) = std::env::var("RUNNER_TIMEOUT_SECS") {
            let secs: u64 = parse_env_value(&val, "RUNNER_TIMEOUT_SECS")?;
            config.run_timeout = Duration::from_secs(secs);
        }

        if let Ok(val) = std::env::var("AGENT_HTTP_TIMEOUT_SECS") {
            let secs: u64 = parse_env_value(&val, "AGENT_HTTP_TIMEOUT_SECS")?;
            config.http_timeout = Duration::from_secs(secs);
        }

        // LLM settings
        if let Ok(val) = std::env::var("LLM_ENDPOINT") {
            config.default_llm_endpoint = val;
        }

        if let Ok(val) = std::env::var("LLM_DEFAULT_MODEL") {
            config.default_model = val;
        }

        config.api_key = std::env::var("OPENAI_API_KEY")
            .ok()
            .filter(|key| !key.is_empty());

        if let Ok(endpoint) = std::env::var("REVIEWER_ENDPOINT") {
            let model = std::env::var("REVIEWER_MODEL")
                .unwrap_or_else(|_| config.default_model.clone());
            config.reviewer = Some(ReviewerConfig { endpoint, model });
        }

        // Agent container settings
        if let Ok(val) = std::env::var("AGENT_CONTAINER_PORT") {
            config.agent_container_port = parse_env_value(&val, "AGENT_CONTAINER_PORT")?;
        }

        if let Ok(val) = std::env::var("AGENT_READY_TIMEOUT_SECS") {
            let secs: u64 = parse_env_value(&val, "AGENT_READY_TIMEOUT_SECS")?;
            config.agent_ready_timeout = Duration::from_secs(secs);
        }

        config.validate()?;
        Ok(config)
    }

    /// Validates the configuration values.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError::ValidationFailed` if any values are invalid.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.max_retries == 0 {
            return Err(ConfigError::ValidationFailed(
                "max_retries must be greater than 0".to_string(),
            ));
        }

        if self.max_turns == 0 {
            return Err(ConfigError::ValidationFailed(
                "max_turns must be greater than 0".to_string(),
            ));
        }

        if self.run_timeout.is_zero() {
            return Err(ConfigError::ValidationFailed(
                "run_timeout must be greater than 0".to_string(),
            ));
        }

        if self.sandbox_backend == SandboxBackend::Docker && self.sandbox_image.is_empty() {
            return Err(ConfigError::ValidationFailed(
                "sandbox_image cannot be empty".to_string(),
            ));
        }

        if !self.storage_dsn.starts_with("memory://") && !self.storage_dsn.starts_with("sqlite:")
        {
            return Err(ConfigError::ValidationFailed(format!(
                "unsupported storage_dsn '{}'",
                self.storage_dsn
            )));
        }

        Ok(())
    }

    /// Builder method to set the storage DSN.
    pub fn with_storage_dsn(mut self, dsn: impl Into<String>) -> Self {
        self.storage_dsn = dsn.into();
        self
    }

    /// Builder method to set the sandbox backend.
    pub fn with_sandbox_backend(mut self, backend: SandboxBackend) -> Self {
        self.sandbox_backend = backend;
        self
    }

    /// Builder method to set the sandbox image.
    pub fn with_sandbox_image(mut self, image: impl Into<String>) -> Self {
        self.sandbox_image = image.into();
        self
    }

    /// Builder method to set the attempt budget.
    pub fn with_max_retries(mut self, retries: u32) -> Self {
        self.max_retries = retries;
        self
    }

    /// Builder method to set the turn budget.
    pub fn with_max_turns(mut self, turns: u32) -> Self {
        self.max_turns = turns;
        self
    }

    /// Builder method to set the per-submission timeout.
    pub fn with_run_timeout(mut self, timeout: Duration) -> Self {
        self.run_timeout = timeout;
        self
    }

    /// Builder method to set the outbound HTTP timeout.
    pub fn with_http_timeout(mut self, timeout: Duration) -> Self {
        self.http_timeout = timeout;
        self
    }

    /// Builder method to set the API key.
    pub fn with_api_key(mut self, key: impl Into<String>) -> Self {
        self.api_key = Some(key.into());
        self
    }

    /// Builder method to set the planner/critic endpoint.
    pub fn with_reviewer(mut self, endpoint: impl Into<String>, model: impl Into<String>) -> Self {
        self.reviewer = Some(ReviewerConfig {
            endpoint: endpoint.into(),
            model: model.into(),
        });
        self
    }

    /// Builder method to set the pricing table.
    pub fn with_pricing(mut self, pricing: PricingTable) -> Self {
        self.pricing = pricing;
        self
    }
}

/// Parse an environment variable value.
fn parse_env_value<T: std::str::FromStr>(value: &str, key: &str) -> Result<T, ConfigError> {
    value.parse().map_err(|_| ConfigError::InvalidValue {
        key: key.to_string(),
        message: format!("could not parse '{}'", value),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = Config::default();
        assert_eq!(config.max_retries, 3);
        assert_eq!(config.max_turns, 10);
        assert_eq!(config.sandbox_image, "python:3.9-slim");
        assert_eq!(config.storage_dsn, "memory://default");
        assert_eq!(config.default_model, "gpt-4");
        assert_eq!(config.http_timeout, Duration::from_secs(60));
        assert!(config.reviewer.is_none());
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_config_builder() {
        let config = Config::new()
            .with_storage_dsn("sqlite:/tmp/bench.db")
            .with_sandbox_backend(SandboxBackend::Process)
            .with_max_retries(5)
            .with_max_turns(4)
            .with_sandbox_image("ubuntu:22.04")
            .with_http_timeout(Duration::from_secs(15))
            .with_reviewer("http://localhost:4000/v1/chat/completions", "gpt-4o");

        assert_eq!(config.max_retries, 5);
        assert_eq!(config.sandbox_image, "ubuntu:22.04");
        assert_eq!(config.http_timeout, Duration::from_secs(15));
        assert_eq!(config.max_turns, 4);
        assert_eq!(config.sandbox_backend, SandboxBackend::Process);
        assert_eq!(config.reviewer.as_ref().map(|r| r.model.as_str()), Some("gpt-4o"));
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_validate_rejects_zero_budgets() {
        assert!(Config::new().with_max_retries(0).validate().is_err());
        assert!(Config::new().with_max_turns(0).validate().is_err());
        assert!(Config::new()
            .with_run_timeout(Duration::ZERO)
            .validate()
            .is_err());
    }

    #[test]
    fn test_validate_requires_image_for_docker() {
        let docker = Config::new()
            .with_sandbox_backend(SandboxBackend::Docker)
            .with_sandbox_image("");
        assert!(docker.validate().is_err());

        let process = Config::new()
            .with_sandbox_backend(SandboxBackend::Process)
            .with_sandbox_image("");
        assert!(process.validate().is_ok());
    }

    #[test]
    fn test_validate_rejects_unknown_dsn() {
        let err = Config::new()
            .with_storage_dsn("postgres://localhost/bench")
            .validate()
            .unwrap_err();
        assert!(err.to_string().contains("unsupported storage_dsn"));
    }

    #[test]
    fn test_sandbox_backend_from_str() {
        assert_eq!("docker".parse::<SandboxBackend>(), Ok(SandboxBackend::Docker));
        assert_eq!("Process".parse::<SandboxBackend>(), Ok(SandboxBackend::Process));
        assert!("vm".parse::<SandboxBackend>().is_err());
    }

    #[test]
    fn test_parse_env_value() {
        let n: u32 = parse_env_value("7", "KEY").unwrap();
        assert_eq!(n, 7);
        let err = parse_env_value::<u32>("seven", "KEY").unwrap_err();
        assert!(matches!(err, ConfigError::InvalidValue { .. }));
    }
}
