//! Tool-calling sub-loop over an OpenAI-compatible chat endpoint.

use std::sync::Arc;
use std::time::Instant;

use serde_json::Value;

use super::agent_loop::{ActContext, ActOutcome, AgentError};
use super::tools::{ToolContext, ToolRegistry};
use crate::error::LlmError;
use crate::llm::{GenerationRequest, LlmProvider, Message, PricingTable, ToolCall};

/// An agent that answers through chat completions and calls sandbox tools.
pub struct ToolCallingAgent {
    provider: Arc<dyn LlmProvider>,
    model: String,
    system_prompt: String,
    tools: Arc<ToolRegistry>,
    pricing: Arc<PricingTable>,
}

impl ToolCallingAgent {
    /// `model` may be empty to use the provider's default.
    pub fn new(provider: Arc<dyn LlmProvider>, model: impl Into<String>) -> Self {
        Self {
            provider,
            model: model.into(),
            system_prompt: String::new(),
            tools: Arc::new(ToolRegistry::with_default_tools()),
            pricing: Arc::new(PricingTable::default()),
        }
    }

    pub fn with_system_prompt(mut self, prompt: impl Into<String>) -> Self {
        self.system_prompt = prompt.into();
        self
    }

    pub fn with_tools(mut self, tools: Arc<ToolRegistry>) -> Self {
        self.tools = tools;
        self
    }

    pub fn with_pricing(mut self, pricing: Arc<PricingTable>) -> Self {
        self.pricing = pricing;
        self
    }

    /// Loops until the model replies with content only, or the turn budget runs out.
    pub async fn act(&self, prompt: &str, ctx: &ActContext<'_>) -> Result<ActOutcome, AgentError> {
        let mut messages = Vec::new();
        if !self.system_prompt.is_empty() {
            messages.push(Message::system(self.system_prompt.clone()));
        }
        messages.push(Message::user(prompt));

        let definitions = self.tools.definitions();
        let tool_ctx = ToolContext::new(ctx.sandbox, ctx.cancel);
        let mut total_cost = 0.0;

        for turn in 1..=ctx.max_turns {
            let request = GenerationRequest::new(self.model.clone(), messages.clone())
                .with_tools(definitions.clone());

            let started = Instant::now();
            let response = tokio::select! {
                biased;
                _ = ctx.cancel.cancelled() => return Err(AgentError::Cancelled),
                response = self.provider.generate(request) => response?,
            };
            let latency_ms = started.elapsed().as_millis() as u64;

            let cost = response
                .usage
                .map(|usage| self.pricing.cost(&self.model, &usage))
                .unwrap_or(0.0);
            total_cost += cost;
            ctx.spent.add(cost);

            let message = response
                .first_message()
                .cloned()
                .ok_or(LlmError::EmptyResponse)?;
            let content = message.content.clone().unwrap_or_default();
            let calls: Vec<ToolCall> = message.requested_tool_calls().to_vec();

            ctx.recorder
                .agent_turn(turn, turn_summary(&content, &calls), cost, latency_ms)
                .await?;

            if calls.is_empty() {
                if content.is_empty() {
                    return Err(AgentError::EmptyReply);
                }
                return Ok(ActOutcome {
                    response: content,
                    cost: total_cost,
                    turns: turn,
                });
            }

            messages.push(message);
            for call in &calls {
                let name = call.function.name.as_str();
                let arguments = &call.function.arguments;
                let parameters =
                    serde_json::from_str(arguments).unwrap_or_else(|_| Value::String(arguments.clone()));

                let (output, success) = match self.tools.execute(name, arguments, &tool_ctx).await {
                    Ok(result) => (result.render(), result.success),
                    Err(e) if e.is_recoverable() => (format!("Error executing tool: {}", e), false),
                    Err(e) => {
                        ctx.recorder
                            .tool_call(turn, name, parameters, &e.to_string(), false)
                            .await?;
                        return Err(e.into());
                    }
                };

                tracing::debug!(tool = name, turn, success, "Tool executed");
                ctx.recorder
                    .tool_call(turn, name, parameters, &output, success)
                    .await?;
                messages.push(Message::tool_result(call.id.clone(), name, output));
            }
        }

        Err(AgentError::TurnLimitExceeded {
            max_turns: ctx.max_turns,
        })
    }
}

fn turn_summary(content: &str, calls: &[ToolCall]) -> String {
    if calls.is_empty() {
        return content.to_string();
    }
    let names: Vec<&str> = calls.iter().map(|c| c.function.name.as_str()).collect();
    if content.is_empty() {
        format!("Calling tools: {}", names.join(", "))
    } else {
        format!("{}\nCalling tools: {}", content, names.join(", "))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::llm::{Choice, GenerationResponse, Usage};
    use crate::models::{TraceEvent, TraceKind};
    use crate::sandbox::{ProcessSandbox, Sandbox};
    use crate::scaffold::agent_loop::CostMeter;
    use crate::scaffold::trace::TraceRecorder;
    use crate::storage::{MemoryRepository, Repository};
    use async_trait::async_trait;
    use std::collections::VecDeque;
    use std::sync::Mutex;
    use tokio_util::sync::CancellationToken;

    /// Replays scripted assistant messages, then repeats the last one.
    struct ScriptedProvider {
        replies: Mutex<VecDeque<Message>>,
        last: Message,
        requests: Mutex<Vec<GenerationRequest>>,
    }

    impl ScriptedProvider {
        fn new(replies: Vec<Message>) -> Self {
            let last = replies.last().cloned().unwrap_or_else(|| Message::assistant(""));
            Self {
                replies: Mutex::new(replies.into()),
                last,
                requests: Mutex::new(Vec::new()),
            }
        }
    }

    #[async_trait]
    impl LlmProvider for ScriptedProvider {
        async fn generate(
            &self,
            request: GenerationRequest,
        ) -> Result<GenerationResponse, LlmError> {
            self.requests.lock().unwrap().push(request);
            let message = self
                .replies
                .lock()
                .unwrap()
                .pop_front()
                .unwrap_or_else(|| self.last.clone());
            Ok(GenerationResponse {
                id: "r".to_string(),
                model: "test".to_string(),
                choices: vec![Choice {
                    index: 0,
                    message,
                    finish_reason: None,
                }],
                usage: Some(Usage {
                    prompt_tokens: 1_000,
                    completion_tokens: 100,
                    total_tokens: 1_100,
                }),
            })
        }
    }

    fn call(id: &str, name: &str, args: &str) -> Message {
        Message::assistant_with_tool_calls(vec![ToolCall::new(id, name, args)])
    }

    async fn run_agent(
        provider: Arc<ScriptedProvider>,
        max_turns: u32,
    ) -> (Result<ActOutcome, AgentError>, Vec<TraceEvent>, f64) {
        let repo = Arc::new(MemoryRepository::new());
        let recorder = TraceRecorder::new("sub-1", repo.clone());
        let sandbox = ProcessSandbox::new();
        sandbox.start().await.unwrap();
        let cancel = CancellationToken::new();
        let spent = CostMeter::new();
        let ctx = ActContext {
            sandbox: &sandbox,
            recorder: &recorder,
            cancel: &cancel,
            spent: &spent,
            max_turns,
        };

        let agent = ToolCallingAgent::new(provider, "gpt-4").with_system_prompt("Be brief.");
        let result = agent.act("Create hello.txt", &ctx).await;
        sandbox.stop().await.unwrap();
        (result, repo.list().await.unwrap(), spent.total())
    }

    #[tokio::test]
    async fn test_tool_results_feed_back_into_transcript() {
        let provider = Arc::new(ScriptedProvider::new(vec![
            call(
                "call_1",
                "write_file",
                r#"{"path": "hello.txt", "content": "hi"}"#,
            ),
            call("call_2", "read_file", r#"{"path": "hello.txt"}"#),
            Message::assistant("Done: hi"),
        ]));

        let (result, traces, spent) = run_agent(provider.clone(), 10).await;
        let outcome = result.unwrap();
        assert_eq!(outcome.response, "Done: hi");
        assert_eq!(outcome.turns, 3);
        // 1000 * 2.50e-6 + 100 * 10.00e-6 per turn
        assert!((outcome.cost - 3.0 * 0.0035).abs() < 1e-9);
        assert!((spent - outcome.cost).abs() < 1e-12);

        let requests = provider.requests.lock().unwrap();
        assert_eq!(requests[0].messages[0].role, "system");
        assert_eq!(requests[0].tools.as_ref().map(Vec::len), Some(3));
        let last = requests[2].messages.last().unwrap();
        assert_eq!(last.role, "tool");
        assert_eq!(last.tool_call_id.as_deref(), Some("call_2"));
        assert_eq!(last.content.as_deref(), Some("hi"));

        let tools: Vec<&TraceEvent> = traces.iter().filter(|t| t.kind == TraceKind::Tool).collect();
        assert_eq!(tools.len(), 2);
        assert!(tools.iter().all(|t| t.success));
    }

    #[tokio::test]
    async fn test_unknown_tool_is_fed_back() {
        let provider = Arc::new(ScriptedProvider::new(vec![
            call("call_1", "delete_everything", "{}"),
            Message::assistant("Gave up"),
        ]));

        let (result, traces, _) = run_agent(provider.clone(), 10).await;
        assert_eq!(result.unwrap().response, "Gave up");

        let requests = provider.requests.lock().unwrap();
        let feedback = requests[1].messages.last().unwrap().content.clone().unwrap();
        assert!(feedback.starts_with("Error executing tool: Unknown tool"));
        assert!(traces.iter().any(|t| t.kind == TraceKind::Tool && !t.success));
    }

    #[tokio::test]
    async fn test_turn_limit_is_hard_failure() {
        let provider = Arc::new(ScriptedProvider::new(vec![call(
            "call_n",
            "run_command",
            r#"{"command": "echo again"}"#,
        )]));

        let (result, traces, spent) = run_agent(provider, 4).await;
        assert!(matches!(
            result,
            Err(AgentError::TurnLimitExceeded { max_turns: 4 })
        ));
        // Every billed turn counts even though the sub-loop failed.
        assert!((spent - 4.0 * 0.0035).abs() < 1e-9);
        assert_eq!(traces.iter().filter(|t| t.kind == TraceKind::Tool).count(), 4);
        assert_eq!(traces.iter().filter(|t| t.kind == TraceKind::Agent).count(), 4);
    }

    #[tokio::test]
    async fn test_empty_reply_is_error() {
        let provider = Arc::new(ScriptedProvider::new(vec![Message::assistant("")]));
        let (result, _, spent) = run_agent(provider, 10).await;
        assert!(matches!(result, Err(AgentError::EmptyReply)));
        assert!((spent - 0.0035).abs() < 1e-9);
    }

    #[test]
    fn test_turn_summary() {
        let calls = vec![ToolCall::new("1", "read_file", "{}")];
        assert_eq!(turn_summary("", &calls), "Calling tools: read_file");
        assert_eq!(turn_summary("done", &[]), "done");
    }
}
