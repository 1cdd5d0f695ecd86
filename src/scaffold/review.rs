//! Planner and critic around the execution loop.
//!
//! Both talk either to the deterministic [`MockModel`] or to a chat
//! endpoint. A reply approves a result when it contains
//! [`APPROVAL_MARKER`], case-insensitively.

use std::sync::Arc;

use tokio_util::sync::CancellationToken;

use super::prompts::{critic_prompt, planner_prompt, CRITIC_SYSTEM_PROMPT, PLANNER_SYSTEM_PROMPT};
use crate::error::LlmError;
use crate::llm::{GenerationRequest, LlmProvider, Message, MockModel, APPROVAL_MARKER};

/// Where plans and critiques come from.
#[derive(Clone)]
pub enum ModelBackend {
    Mock(MockModel),
    Remote(Arc<dyn LlmProvider>),
}

impl ModelBackend {
    async fn complete(
        provider: &dyn LlmProvider,
        system: &str,
        user: String,
        cancel: &CancellationToken,
    ) -> Result<String, LlmError> {
        let request = GenerationRequest::new(
            "",
            vec![Message::system(system), Message::user(user)],
        );
        let response = tokio::select! {
            biased;
            _ = cancel.cancelled() => return Err(LlmError::Cancelled),
            response = provider.generate(request) => response?,
        };
        response
            .first_content()
            .map(str::to_string)
            .ok_or(LlmError::EmptyResponse)
    }
}

impl std::fmt::Debug for ModelBackend {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Mock(_) => f.write_str("Mock"),
            Self::Remote(_) => f.write_str("Remote"),
        }
    }
}

/// Produces a step-by-step plan for a goal.
#[derive(Debug, Clone)]
pub struct Planner {
    backend: ModelBackend,
}

impl Planner {
    pub fn new(backend: ModelBackend) -> Self {
        Self { backend }
    }

    pub fn mock() -> Self {
        Self::new(ModelBackend::Mock(MockModel::new()))
    }

    pub async fn plan(&self, goal: &str, cancel: &CancellationToken) -> Result<String, LlmError> {
        match &self.backend {
            ModelBackend::Mock(model) => Ok(model.plan(goal)),
            ModelBackend::Remote(provider) => {
                ModelBackend::complete(
                    provider.as_ref(),
                    PLANNER_SYSTEM_PROMPT,
                    planner_prompt(goal),
                    cancel,
                )
                .await
            }
        }
    }
}

/// The critic's judgement of one attempt.
#[derive(Debug, Clone, PartialEq)]
pub struct Critique {
    pub approved: bool,
    pub feedback: String,
}

impl Critique {
    /// Reads approval off the reply text.
    pub fn from_reply(reply: String) -> Self {
        Self {
            approved: reply.to_uppercase().contains(APPROVAL_MARKER),
            feedback: reply,
        }
    }
}

/// Judges whether a response satisfies the original task.
#[derive(Debug, Clone)]
pub struct Critic {
    backend: ModelBackend,
}

impl Critic {
    pub fn new(backend: ModelBackend) -> Self {
        Self { backend }
    }

    pub fn mock() -> Self {
        Self::new(ModelBackend::Mock(MockModel::new()))
    }

    pub async fn review(
        &self,
        task: &str,
        result: &str,
        cancel: &CancellationToken,
    ) -> Result<Critique, LlmError> {
        let reply = match &self.backend {
            ModelBackend::Mock(model) => model.review(task, result),
            ModelBackend::Remote(provider) => {
                ModelBackend::complete(
                    provider.as_ref(),
                    CRITIC_SYSTEM_PROMPT,
                    critic_prompt(task, result),
                    cancel,
                )
                .await?
            }
        };
        Ok(Critique::from_reply(reply))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::llm::{Choice, GenerationResponse};
    use async_trait::async_trait;
    use std::sync::Mutex;

    struct CannedProvider {
        reply: String,
        seen: Mutex<Vec<GenerationRequest>>,
    }

    #[async_trait]
    impl LlmProvider for CannedProvider {
        async fn generate(
            &self,
            request: GenerationRequest,
        ) -> Result<GenerationResponse, LlmError> {
            self.seen.lock().unwrap().push(request);
            Ok(GenerationResponse {
                id: "r1".to_string(),
                model: "test".to_string(),
                choices: vec![Choice {
                    index: 0,
                    message: Message::assistant(self.reply.clone()),
                    finish_reason: Some("stop".to_string()),
                }],
                usage: None,
            })
        }
    }

    fn canned(reply: &str) -> Arc<CannedProvider> {
        Arc::new(CannedProvider {
            reply: reply.to_string(),
            seen: Mutex::new(Vec::new()),
        })
    }

    #[tokio::test]
    async fn test_mock_planner_and_critic() {
        let cancel = CancellationToken::new();
        let plan = Planner::mock().plan("anything", &cancel).await.unwrap();
        assert!(plan.starts_with("1. Write python script"));

        let critique = Critic::mock()
            .review("Failure case", "done", &cancel)
            .await
            .unwrap();
        assert!(!critique.approved);
    }

    #[tokio::test]
    async fn test_remote_critic_approval_is_case_insensitive() {
        let provider = canned("Looks good, approved.");
        let critic = Critic::new(ModelBackend::Remote(provider.clone()));
        let critique = critic
            .review("Say Hello", "Hello World", &CancellationToken::new())
            .await
            .unwrap();
        assert!(critique.approved);

        let seen = provider.seen.lock().unwrap();
        assert_eq!(seen[0].messages[0].content.as_deref(), Some(CRITIC_SYSTEM_PROMPT));
        assert!(seen[0].messages[1]
            .content
            .as_deref()
            .unwrap()
            .starts_with("Original Task: Say Hello"));
    }

    #[tokio::test]
    async fn test_remote_planner_honours_cancel() {
        let cancel = CancellationToken::new();
        cancel.cancel();
        let planner = Planner::new(ModelBackend::Remote(canned("1. step")));
        let err = planner.plan("goal", &cancel).await.unwrap_err();
        assert!(matches!(err, LlmError::Cancelled));
    }
}
