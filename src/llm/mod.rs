//! LLM integration for agentbench.
//!
//! - [`ChatClient`]: OpenAI-compatible chat completions with tool calling
//! - [`PricingTable`]: per-model token rates for cost accounting
//! - [`MockModel`]: deterministic replies for agents whose model is `"mock"`
//! - [`LlmFactory`]: builds the provider an agent talks through
//!
//! ```ignore
//! use agentbench::llm::{ChatClient, GenerationRequest, LlmProvider, Message};
//!
//! let client = ChatClient::new(endpoint, api_key, "gpt-4", timeout)?;
//! let request = GenerationRequest::new("", vec![Message::user("Hello!")]);
//! let response = client.generate(request).await?;
//! ```

pub mod chat;
pub mod mock;
pub mod pricing;

pub use chat::{
    ChatClient, Choice, FunctionCall, FunctionDefinition, GenerationRequest, GenerationResponse,
    LlmProvider, Message, ToolCall, ToolDefinition, Usage,
};
pub use mock::{MockModel, APPROVAL_MARKER};
pub use pricing::{PricingTable, TokenRate};

use std::sync::Arc;

use crate::config::{Config, ReviewerConfig};
use crate::error::LlmError;
use crate::models::Agent;

/// Builds LLM providers for agents and for the shared reviewer.
pub trait LlmFactory: Send + Sync {
    /// Provider for an agent's own chat endpoint.
    fn for_agent(&self, agent: &Agent) -> Result<Arc<dyn LlmProvider>, LlmError>;

    /// Provider for the configured reviewer endpoint.
    fn for_reviewer(&self, reviewer: &ReviewerConfig) -> Result<Arc<dyn LlmProvider>, LlmError>;
}

/// Creates [`ChatClient`]s from agent records and [`Config`].
pub struct HttpLlmFactory {
    config: Arc<Config>,
}

impl HttpLlmFactory {
    pub fn new(config: Arc<Config>) -> Self {
        Self { config }
    }
}

impl LlmFactory for HttpLlmFactory {
    fn for_agent(&self, agent: &Agent) -> Result<Arc<dyn LlmProvider>, LlmError> {
        let endpoint = if agent.endpoint.is_empty() {
            self.config.default_llm_endpoint.clone()
        } else {
            agent.endpoint.clone()
        };
        let model = if agent.model.is_empty() {
            self.config.default_model.clone()
        } else {
            agent.model.clone()
        };
        // Per-agent token wins over the platform key.
        let api_key = agent
            .auth_token
            .clone()
            .or_else(|| self.config.api_key.clone());

        let client = ChatClient::new(endpoint, api_key, model, self.config.http_timeout)?
            .with_headers(agent.headers.clone());
        Ok(Arc::new(client))
    }

    fn for_reviewer(&self, reviewer: &ReviewerConfig) -> Result<Arc<dyn LlmProvider>, LlmError> {
        let client = ChatClient::new(
            reviewer.endpoint.clone(),
            self.config.api_key.clone(),
            reviewer.model.clone(),
            self.config.http_timeout,
        )?;
        Ok(Arc::new(client))
    }
}
