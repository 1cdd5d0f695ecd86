//! HTTP client for step-protocol agents.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;

use super::{StepRequest, StepResponse, STEP_PATH};
use crate::error::AgentClientError;
use crate::models::Agent;

/// Sends one step to an agent.
#[async_trait]
pub trait AgentClient: Send + Sync {
    async fn step(
        &self,
        endpoint: &str,
        request: &StepRequest,
    ) -> Result<StepResponse, AgentClientError>;
}

/// [`AgentClient`] over reqwest.
pub struct HttpAgentClient {
    http_client: Client,
    auth_token: Option<String>,
    headers: HashMap<String, String>,
}

impl HttpAgentClient {
    pub fn new(timeout: Duration) -> Result<Self, AgentClientError> {
        let http_client = Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| AgentClientError::RequestFailed(e.to_string()))?;
        Ok(Self {
            http_client,
            auth_token: None,
            headers: HashMap::new(),
        })
    }

    /// Bearer token sent with every step.
    pub fn with_auth_token(mut self, token: Option<String>) -> Self {
        self.auth_token = token;
        self
    }

    pub fn with_headers(mut self, headers: HashMap<String, String>) -> Self {
        self.headers.extend(headers);
        self
    }
}

/// Builds the client used to reach one agent.
pub trait AgentClientFactory: Send + Sync {
    fn for_agent(&self, agent: &Agent) -> Result<Arc<dyn AgentClient>, AgentClientError>;
}

/// Creates an [`HttpAgentClient`] carrying the agent's token and headers.
pub struct HttpAgentClientFactory {
    timeout: Duration,
}

impl HttpAgentClientFactory {
    pub fn new(timeout: Duration) -> Self {
        Self { timeout }
    }
}

impl AgentClientFactory for HttpAgentClientFactory {
    fn for_agent(&self, agent: &Agent) -> Result<Arc<dyn AgentClient>, AgentClientError> {
        let client = HttpAgentClient::new(self.timeout)?
            .with_auth_token(agent.auth_token.clone())
            .with_headers(agent.headers.clone());
        Ok(Arc::new(client))
    }
}

#[async_trait]
impl AgentClient for HttpAgentClient {
    async fn step(
        &self,
        endpoint: &str,
        request: &StepRequest,
    ) -> Result<StepResponse, AgentClientError> {
        if endpoint.is_empty() {
            return Err(AgentClientError::MissingEndpoint);
        }
        let url = format!("{}{}", endpoint.trim_end_matches('/'), STEP_PATH);

        let mut http_request = self.http_client.post(&url).json(request);
        if let Some(token) = &self.auth_token {
            http_request = http_request.bearer_auth(token);
        }
        for (name, value) in &self.headers {
            http_request = http_request.header(name.as_str(), value.as_str());
        }

        tracing::debug!(url = %url, step = request.step_number, "Calling agent step");
        let response = http_request
            .send()
            .await
            .map_err(|e| AgentClientError::RequestFailed(e.to_string()))?;

        let status = response.status();
        if status != reqwest::StatusCode::OK {
            let body = response.text().await.unwrap_or_default();
            return Err(AgentClientError::Status {
                code: status.as_u16(),
                body,
            });
        }

        response
            .json::<StepResponse>()
            .await
            .map_err(|e| AgentClientError::ParseError(e.to_string()))
    }
}
