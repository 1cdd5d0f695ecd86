//! Submission runner.
//!
//! Drives one submission from `queued` to a terminal state:
//! resolve agent and benchmark, mark `running`, optionally start the
//! agent's container, run the execution loop inside a sandbox, then persist
//! the terminal state and publish `score.calculated`.

use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::{Duration, Instant};

use async_trait::async_trait;
use thiserror::Error;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

use crate::bus::{Event, EventHandler, Publisher};
use crate::config::Config;
use crate::error::{AgentClientError, BusError, DockerError, HandlerError, LlmError};
use crate::execution::{limits_for_difficulty, with_agent_container, ContainerProvisioner, ExecutionLimits};
use crate::llm::{LlmFactory, MockModel, PricingTable};
use crate::metrics::Metrics;
use crate::models::{
    Agent, Benchmark, ProviderKind, ScoreSummary, Submission, SubmissionStatus, TransitionError,
};
use crate::protocol::AgentClientFactory;
use crate::sandbox::{with_sandbox, SandboxError, SandboxProvider, SandboxRegistry};
use crate::scaffold::prompts::FALLBACK_TASK_PROMPT;
use crate::scaffold::{
    Actor, Critic, ExecutionLoop, LoopOutcome, ModelBackend, Planner, ProgressSink,
    StepProtocolAgent, ToolCallingAgent, ToolRegistry, TraceRecorder, Verdict,
};
use crate::storage::{Repository, StorageError, Stores};

/// Environment variable carrying the platform API key into agent containers.
const API_KEY_ENV: &str = "OPENAI_API_KEY";

/// Errors that abort a run outside the execution loop.
#[derive(Debug, Error)]
pub enum RunnerError {
    #[error("Agent not found: {0}")]
    AgentNotFound(String),

    #[error("Benchmark not found: {0}")]
    BenchmarkNotFound(String),

    #[error("Agent '{0}' needs a container but no provisioner is configured")]
    NoProvisioner(String),

    #[error(transparent)]
    Transition(#[from] TransitionError),

    #[error("Storage error: {0}")]
    Storage(#[from] StorageError),

    #[error("Sandbox error: {0}")]
    Sandbox(#[from] SandboxError),

    #[error("Agent container error: {0}")]
    Container(#[from] DockerError),

    #[error("LLM setup failed: {0}")]
    Llm(#[from] LlmError),

    #[error("Agent client setup failed: {0}")]
    AgentClient(#[from] AgentClientError),

    #[error("Publish failed: {0}")]
    Publish(#[from] BusError),
}

/// What to run, derived from the benchmark.
#[derive(Debug, Clone)]
struct RunPlan {
    goal: String,
    task_id: String,
    max_turns: u32,
    limits: ExecutionLimits,
}

impl RunPlan {
    /// Runs the benchmark's first task.
    fn for_benchmark(benchmark: &Benchmark, config: &Config) -> Self {
        match benchmark.tasks.first() {
            Some(task) => Self {
                goal: task.prompt.clone(),
                task_id: task.id.clone(),
                max_turns: task.max_turns.unwrap_or(config.max_turns),
                limits: limits_for_difficulty(task.difficulty.as_deref()),
            },
            None => Self {
                goal: FALLBACK_TASK_PROMPT.to_string(),
                task_id: String::new(),
                max_turns: config.max_turns,
                limits: ExecutionLimits::default(),
            },
        }
    }
}

/// Persists progress after every attempt.
struct SubmissionProgress<'a> {
    submissions: &'a dyn Repository<Submission>,
    snapshot: Mutex<Submission>,
}

impl<'a> SubmissionProgress<'a> {
    fn new(submissions: &'a dyn Repository<Submission>, submission: Submission) -> Self {
        Self {
            submissions,
            snapshot: Mutex::new(submission),
        }
    }

    fn into_inner(self) -> Submission {
        self.snapshot
            .into_inner()
            .unwrap_or_else(PoisonError::into_inner)
    }
}

#[async_trait]
impl ProgressSink for SubmissionProgress<'_> {
    async fn attempt_finished(&self, attempt: u32, max_attempts: u32) -> Result<(), StorageError> {
        let percent = (attempt.saturating_mul(100) / max_attempts.max(1)).min(100) as u8;
        let snapshot = {
            let mut submission = self
                .snapshot
                .lock()
                .unwrap_or_else(PoisonError::into_inner);
            submission.advance_progress(percent);
            submission.clone()
        };
        let id = snapshot.id.clone();
        self.submissions.save(&id, snapshot).await
    }
}

/// Marks a submission id as being run by this runner until dropped.
struct Claim<'a> {
    in_flight: &'a Mutex<HashSet<String>>,
    id: String,
}

impl<'a> Claim<'a> {
    fn acquire(in_flight: &'a Mutex<HashSet<String>>, id: &str) -> Option<Self> {
        let fresh = in_flight
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(id.to_string());
        fresh.then(|| Self {
            in_flight,
            id: id.to_string(),
        })
    }
}

impl Drop for Claim<'_> {
    fn drop(&mut self) {
        self.in_flight
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(&self.id);
    }
}

/// Executes created submissions.
pub struct Runner {
    config: Arc<Config>,
    stores: Stores,
    publisher: Arc<dyn Publisher>,
    sandboxes: Arc<dyn SandboxProvider>,
    registry: Arc<SandboxRegistry>,
    llm: Arc<dyn LlmFactory>,
    agent_clients: Arc<dyn AgentClientFactory>,
    provisioner: Option<Arc<dyn ContainerProvisioner>>,
    tools: Arc<ToolRegistry>,
    pricing: Arc<PricingTable>,
    metrics: Option<Arc<Metrics>>,
    shutdown: CancellationToken,
    in_flight: Mutex<HashSet<String>>,
}

impl Runner {
    pub fn new(
        config: Arc<Config>,
        stores: Stores,
        publisher: Arc<dyn Publisher>,
        sandboxes: Arc<dyn SandboxProvider>,
        llm: Arc<dyn LlmFactory>,
        agent_clients: Arc<dyn AgentClientFactory>,
    ) -> Self {
        let pricing = Arc::new(config.pricing.clone());
        Self {
            config,
            stores,
            publisher,
            sandboxes,
            registry: Arc::new(SandboxRegistry::new()),
            llm,
            agent_clients,
            provisioner: None,
            tools: Arc::new(ToolRegistry::with_default_tools()),
            pricing,
            metrics: None,
            shutdown: CancellationToken::new(),
            in_flight: Mutex::new(HashSet::new()),
        }
    }

    /// Enables agents that declare a container image.
    pub fn with_provisioner(mut self, provisioner: Arc<dyn ContainerProvisioner>) -> Self {
        self.provisioner = Some(provisioner);
        self
    }

    pub fn with_registry(mut self, registry: Arc<SandboxRegistry>) -> Self {
        self.registry = registry;
        self
    }

    pub fn with_metrics(mut self, metrics: Arc<Metrics>) -> Self {
        self.metrics = Some(metrics);
        self
    }

    pub fn with_tools(mut self, tools: Arc<ToolRegistry>) -> Self {
        self.tools = tools;
        self
    }

    /// Cancelling `token` cancels every run in flight.
    pub fn with_shutdown(mut self, token: CancellationToken) -> Self {
        self.shutdown = token;
        self
    }

    pub fn sandbox_registry(&self) -> &Arc<SandboxRegistry> {
        &self.registry
    }

    /// Runs `submission` to a terminal state and returns it.
    ///
    /// The stored copy wins over the event's. A submission that is stored
    /// past `queued`, or is already being run here, is returned as stored
    /// without running or publishing anything.
    ///
    /// A missing agent or benchmark fails before anything is written. Once
    /// the submission is `running`, every path persists a terminal state and
    /// publishes `score.calculated`. Loop failures return `Ok` with a failed
    /// submission; infrastructure failures return the error.
    pub async fn run(&self, submission: Submission) -> Result<Submission, RunnerError> {
        let started = Instant::now();
        let Some(_claim) = Claim::acquire(&self.in_flight, &submission.id) else {
            info!(submission_id = %submission.id, "Submission already running, skipping");
            let stored = self.stores.submissions.get(&submission.id).await?;
            return Ok(stored.unwrap_or(submission));
        };
        let mut submission = match self.stores.submissions.get(&submission.id).await? {
            Some(stored) if stored.status != SubmissionStatus::Queued => {
                info!(
                    submission_id = %stored.id,
                    status = %stored.status,
                    "Submission already claimed, skipping"
                );
                return Ok(stored);
            }
            Some(stored) => stored,
            None => submission,
        };

        let agent = self
            .stores
            .agents
            .get(&submission.agent_id)
            .await?
            .ok_or_else(|| RunnerError::AgentNotFound(submission.agent_id.clone()))?;
        let benchmark = self
            .stores
            .benchmarks
            .get(&submission.benchmark_id)
            .await?
            .ok_or_else(|| RunnerError::BenchmarkNotFound(submission.benchmark_id.clone()))?;

        submission.agent_name = agent.name.clone();
        submission.benchmark_name = benchmark.name.clone();
        let plan = RunPlan::for_benchmark(&benchmark, &self.config);

        submission.transition(SubmissionStatus::Running)?;
        self.stores
            .submissions
            .save(&submission.id, submission.clone())
            .await?;
        info!(
            submission_id = %submission.id,
            agent_id = %agent.id,
            benchmark_id = %benchmark.id,
            provider = %agent.provider,
            "Submission running"
        );

        let cancel = self.shutdown.child_token();
        let timer = spawn_deadline(cancel.clone(), self.config.run_timeout);

        let submission_id = submission.id.clone();
        let progress = SubmissionProgress::new(self.stores.submissions.as_ref(), submission);
        let result = self
            .execute(&submission_id, agent, &plan, &progress, &cancel)
            .await;
        let timed_out = timer.is_finished();
        timer.abort();
        let submission = progress.into_inner();

        match result {
            Ok(outcome) => {
                match &outcome.verdict {
                    Verdict::Approved => {}
                    Verdict::RetriesExhausted => {
                        info!(submission_id = %submission_id, attempts = outcome.attempts, "No attempt approved");
                    }
                    Verdict::Failed(e) if timed_out && e.is_cancellation() => {
                        warn!(
                            submission_id = %submission_id,
                            timeout_secs = self.config.run_timeout.as_secs(),
                            "Run timed out"
                        );
                    }
                    Verdict::Failed(e) => {
                        warn!(submission_id = %submission_id, error = %e, "Execution failed");
                    }
                }
                let status = if outcome.is_approved() {
                    SubmissionStatus::Completed
                } else {
                    SubmissionStatus::Failed
                };
                self.finish(submission, status, &outcome, started).await
            }
            Err(e) => {
                error!(submission_id = %submission_id, error = %e, "Run aborted");
                let aborted = LoopOutcome {
                    verdict: Verdict::RetriesExhausted,
                    attempts: 0,
                    cost: 0.0,
                    response: None,
                };
                if let Err(finish_err) = self
                    .finish(submission, SubmissionStatus::Failed, &aborted, started)
                    .await
                {
                    warn!(submission_id = %submission_id, error = %finish_err, "Failed to finish aborted run");
                }
                Err(e)
            }
        }
    }

    /// Starts the agent's container when it has an image, then runs in a sandbox.
    async fn execute(
        &self,
        submission_id: &str,
        agent: Agent,
        plan: &RunPlan,
        progress: &dyn ProgressSink,
        cancel: &CancellationToken,
    ) -> Result<LoopOutcome, RunnerError> {
        let Some(image) = agent.image.clone() else {
            return self
                .execute_in_sandbox(submission_id, &agent, plan, progress, cancel)
                .await;
        };
        let provisioner = self
            .provisioner
            .as_ref()
            .ok_or_else(|| RunnerError::NoProvisioner(agent.id.clone()))?;

        let mut env = HashMap::new();
        if let Some(key) = &self.config.api_key {
            env.insert(API_KEY_ENV.to_string(), key.clone());
        }

        with_agent_container(provisioner.as_ref(), &image, &env, cancel, |container| async move {
            info!(
                submission_id = %submission_id,
                container_id = %container.container_id,
                endpoint = %container.endpoint,
                "Agent container ready"
            );
            let agent = agent
                .with_endpoint(container.endpoint)
                .with_provider(ProviderKind::AgentProtocol);
            self.execute_in_sandbox(submission_id, &agent, plan, progress, cancel)
                .await
        })
        .await?
    }

    async fn execute_in_sandbox(
        &self,
        submission_id: &str,
        agent: &Agent,
        plan: &RunPlan,
        progress: &dyn ProgressSink,
        cancel: &CancellationToken,
    ) -> Result<LoopOutcome, RunnerError> {
        let exec_loop = self.build_loop(agent, plan.max_turns)?;
        let sandbox = self.sandboxes.create(submission_id, &plan.limits)?;
        let _lease = self.registry.lease(submission_id, sandbox.id());
        let recorder = TraceRecorder::new(submission_id, self.stores.traces.clone())
            .with_task(plan.task_id.clone());

        let outcome = with_sandbox(sandbox, |sandbox| async move {
            exec_loop
                .run(&plan.goal, sandbox.as_ref(), &recorder, progress, cancel)
                .await
        })
        .await?;
        Ok(outcome)
    }

    /// Picks actor, planner and critic for `agent`.
    fn build_loop(&self, agent: &Agent, max_turns: u32) -> Result<ExecutionLoop, RunnerError> {
        let (actor, backend) = match agent.provider {
            ProviderKind::OpenAi if agent.is_mock() => (
                Actor::Mock(MockModel::new()),
                ModelBackend::Mock(MockModel::new()),
            ),
            ProviderKind::OpenAi => {
                let provider = self.llm.for_agent(agent)?;
                let actor = ToolCallingAgent::new(provider.clone(), agent.model.clone())
                    .with_system_prompt(agent.system_prompt.clone())
                    .with_tools(self.tools.clone())
                    .with_pricing(self.pricing.clone());
                (Actor::ToolCalling(actor), ModelBackend::Remote(provider))
            }
            ProviderKind::AgentProtocol => {
                let client = self.agent_clients.for_agent(agent)?;
                let backend = match &self.config.reviewer {
                    Some(reviewer) => ModelBackend::Remote(self.llm.for_reviewer(reviewer)?),
                    None => ModelBackend::Mock(MockModel::new()),
                };
                (
                    Actor::StepProtocol(StepProtocolAgent::new(client, agent.endpoint.clone())),
                    backend,
                )
            }
        };

        Ok(ExecutionLoop::new(actor, Planner::new(backend.clone()), Critic::new(backend))
            .with_max_retries(self.config.max_retries)
            .with_max_turns(max_turns))
    }

    /// Persists the terminal state and publishes `score.calculated`.
    async fn finish(
        &self,
        mut submission: Submission,
        status: SubmissionStatus,
        outcome: &LoopOutcome,
        started: Instant,
    ) -> Result<Submission, RunnerError> {
        submission.advance_progress(100);
        submission.score_summary = Some(ScoreSummary::from_run(
            outcome.score(),
            outcome.attempts,
            outcome.cost,
        ));
        submission.transition(status)?;
        self.stores
            .submissions
            .save(&submission.id, submission.clone())
            .await?;

        let elapsed = started.elapsed();
        if let Some(metrics) = &self.metrics {
            metrics.record_run(&status.to_string(), elapsed.as_secs_f64(), outcome.cost);
        }
        info!(
            submission_id = %submission.id,
            status = %status,
            attempts = outcome.attempts,
            cost = outcome.cost,
            elapsed_ms = elapsed.as_millis() as u64,
            "Submission finished"
        );

        if let Err(e) = self
            .publisher
            .publish(Event::ScoreCalculated(submission.clone()))
            .await
        {
            error!(submission_id = %submission.id, error = %e, "Failed to publish score");
            return Err(e.into());
        }
        Ok(submission)
    }
}

/// Cancels `token` once `timeout` has elapsed.
fn spawn_deadline(token: CancellationToken, timeout: Duration) -> tokio::task::JoinHandle<()> {
    tokio::spawn(async move {
        tokio::time::sleep(timeout).await;
        token.cancel();
    })
}

#[async_trait]
impl EventHandler for Runner {
    fn name(&self) -> &str {
        "runner"
    }

    async fn handle(&self, event: &Event) -> Result<(), HandlerError> {
        match event {
            Event::SubmissionCreated(submission) => {
                self.run(submission.clone()).await?;
                Ok(())
            }
            Event::ScoreCalculated(_) | Event::LeaderboardUpdated(_) | Event::TraceCreated(_) => {
                Ok(())
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ReviewerConfig;
    use crate::execution::AgentContainer;
    use crate::llm::LlmProvider;
    use crate::models::{SubmissionRequest, Task, TraceKind};
    use crate::protocol::AgentClient;
    use crate::sandbox::{ProcessSandboxProvider, Sandbox};
    use crate::storage::MemoryRepository;

    /// Refuses to build remote clients.
    struct Offline;

    impl LlmFactory for Offline {
        fn for_agent(&self, _agent: &Agent) -> Result<Arc<dyn LlmProvider>, LlmError> {
            Err(LlmError::RequestFailed("offline".to_string()))
        }

        fn for_reviewer(&self, _r: &ReviewerConfig) -> Result<Arc<dyn LlmProvider>, LlmError> {
            Err(LlmError::RequestFailed("offline".to_string()))
        }
    }

    impl AgentClientFactory for Offline {
        fn for_agent(&self, _agent: &Agent) -> Result<Arc<dyn AgentClient>, AgentClientError> {
            Err(AgentClientError::MissingEndpoint)
        }
    }

    struct Recorder(Mutex<Vec<Event>>);

    #[async_trait]
    impl Publisher for Recorder {
        async fn publish(&self, event: Event) -> Result<(), BusError> {
            self.0.lock().unwrap().push(event);
            Ok(())
        }
    }

    struct BrokenSandboxes;

    impl SandboxProvider for BrokenSandboxes {
        fn create(
            &self,
            _submission_id: &str,
            _limits: &ExecutionLimits,
        ) -> Result<Arc<dyn Sandbox>, SandboxError> {
            Err(SandboxError::Docker(DockerError::DaemonUnavailable(
                "no daemon".to_string(),
            )))
        }
    }

    struct FailingProvisioner;

    #[async_trait]
    impl ContainerProvisioner for FailingProvisioner {
        async fn provision(
            &self,
            _image: &str,
            env: &HashMap<String, String>,
            _cancel: &CancellationToken,
        ) -> Result<AgentContainer, DockerError> {
            assert_eq!(env.get(API_KEY_ENV).map(String::as_str), Some("sk-test"));
            Err(DockerError::PullFailed("agent:latest".to_string()))
        }

        async fn release(&self, _container: &AgentContainer) {}
    }

    /// Keeps every saved status and progress next to the stored values.
    struct RecordingSubmissions {
        inner: MemoryRepository<Submission>,
        saved: Mutex<Vec<(SubmissionStatus, u8)>>,
    }

    #[async_trait]
    impl Repository<Submission> for RecordingSubmissions {
        async fn save(&self, id: &str, value: Submission) -> Result<(), StorageError> {
            self.saved.lock().unwrap().push((value.status, value.progress));
            self.inner.save(id, value).await
        }

        async fn get(&self, id: &str) -> Result<Option<Submission>, StorageError> {
            self.inner.get(id).await
        }

        async fn list(&self) -> Result<Vec<Submission>, StorageError> {
            self.inner.list().await
        }

        async fn clear(&self) -> Result<(), StorageError> {
            self.inner.clear().await
        }
    }

    async fn setup(
        sandboxes: Arc<dyn SandboxProvider>,
        prompt: &str,
    ) -> (Runner, Stores, Arc<Recorder>) {
        setup_with(Stores::in_memory(), sandboxes, prompt).await
    }

    async fn setup_with(
        stores: Stores,
        sandboxes: Arc<dyn SandboxProvider>,
        prompt: &str,
    ) -> (Runner, Stores, Arc<Recorder>) {
        stores
            .agents
            .save("agent", Agent::new("agent", "Mock Agent").with_model("mock"))
            .await
            .unwrap();
        stores
            .benchmarks
            .save(
                "bench",
                Benchmark::new("bench", "Smoke", vec![Task::new("task-1", prompt)]),
            )
            .await
            .unwrap();

        let publisher = Arc::new(Recorder(Mutex::new(Vec::new())));
        let config = Arc::new(Config::default().with_api_key("sk-test"));
        let runner = Runner::new(
            config,
            stores.clone(),
            publisher.clone(),
            sandboxes,
            Arc::new(Offline),
            Arc::new(Offline),
        );
        (runner, stores, publisher)
    }

    fn queued(agent: &str, benchmark: &str) -> Submission {
        Submission::new("sub-1", SubmissionRequest::new(benchmark, agent, "payload"))
    }

    #[tokio::test]
    async fn test_mock_agent_completes() {
        let (runner, stores, publisher) = setup(Arc::new(ProcessSandboxProvider), "Test Prompt").await;

        let done = runner.run(queued("agent", "bench")).await.unwrap();
        assert_eq!(done.status, SubmissionStatus::Completed);
        assert_eq!(done.progress, 100);
        assert_eq!(done.agent_name, "Mock Agent");
        assert_eq!(done.benchmark_name, "Smoke");
        assert_eq!(done.score_summary.as_ref().unwrap().score, 1.0);

        let stored = stores.submissions.get("sub-1").await.unwrap().unwrap();
        assert_eq!(stored, done);

        let events = publisher.0.lock().unwrap();
        assert!(matches!(events.as_slice(), [Event::ScoreCalculated(s)] if s.id == "sub-1"));

        let traces = stores.traces.list().await.unwrap();
        assert!(traces.iter().all(|t| t.task_id.as_deref() == Some("task-1")));
        assert_eq!(traces.last().unwrap().kind, TraceKind::Reflection);
        assert_eq!(runner.sandbox_registry().active_count(), 0);
    }

    #[tokio::test]
    async fn test_redelivered_event_leaves_finished_submission_alone() {
        let (runner, stores, publisher) = setup(Arc::new(ProcessSandboxProvider), "Test Prompt").await;
        let created = queued("agent", "bench");

        let done = runner.run(created.clone()).await.unwrap();
        assert_eq!(done.status, SubmissionStatus::Completed);

        // A second run of the same task would now fail.
        stores
            .benchmarks
            .save(
                "bench",
                Benchmark::new("bench", "Smoke", vec![Task::new("task-1", "Failure now")]),
            )
            .await
            .unwrap();
        let traces_before = stores.traces.list().await.unwrap().len();

        let again = runner.run(created).await.unwrap();
        assert_eq!(again, done);
        let stored = stores.submissions.get("sub-1").await.unwrap().unwrap();
        assert_eq!(stored.status, SubmissionStatus::Completed);
        assert_eq!(stored, done);
        assert_eq!(publisher.0.lock().unwrap().len(), 1);
        assert_eq!(stores.traces.list().await.unwrap().len(), traces_before);
    }

    #[tokio::test]
    async fn test_stored_running_submission_is_not_rerun() {
        let (runner, stores, publisher) = setup(Arc::new(ProcessSandboxProvider), "Test Prompt").await;
        let mut running = queued("agent", "bench");
        running.transition(SubmissionStatus::Running).unwrap();
        stores.submissions.save("sub-1", running).await.unwrap();

        let result = runner.run(queued("agent", "bench")).await.unwrap();
        assert_eq!(result.status, SubmissionStatus::Running);
        assert!(publisher.0.lock().unwrap().is_empty());
        assert!(stores.traces.list().await.unwrap().is_empty());
    }

    #[test]
    fn test_claim_is_exclusive_until_dropped() {
        let in_flight = Mutex::new(HashSet::new());
        let claim = Claim::acquire(&in_flight, "sub-1").unwrap();
        assert!(Claim::acquire(&in_flight, "sub-1").is_none());
        assert!(Claim::acquire(&in_flight, "sub-2").is_some());
        drop(claim);
        assert!(Claim::acquire(&in_flight, "sub-1").is_some());
    }

    #[tokio::test]
    async fn test_stored_state_only_moves_forward() {
        let recording = Arc::new(RecordingSubmissions {
            inner: MemoryRepository::new(),
            saved: Mutex::new(Vec::new()),
        });
        let stores = Stores {
            submissions: recording.clone(),
            ..Stores::in_memory()
        };
        let (runner, stores, _publisher) =
            setup_with(stores, Arc::new(ProcessSandboxProvider), "Failure on purpose").await;
        let created = queued("agent", "bench");
        stores.submissions.save("sub-1", created.clone()).await.unwrap();

        let done = runner.run(created).await.unwrap();
        assert_eq!(done.status, SubmissionStatus::Failed);

        let saved = recording.saved.lock().unwrap().clone();
        let statuses: Vec<SubmissionStatus> = saved.iter().map(|(status, _)| *status).collect();
        assert_eq!(statuses.first(), Some(&SubmissionStatus::Queued));
        assert_eq!(statuses.get(1), Some(&SubmissionStatus::Running));
        assert_eq!(statuses.last(), Some(&SubmissionStatus::Failed));
        assert!(statuses[1..statuses.len() - 1]
            .iter()
            .all(|s| *s == SubmissionStatus::Running));

        let progress: Vec<u8> = saved.iter().map(|(_, p)| *p).collect();
        assert!(progress.windows(2).all(|w| w[0] <= w[1]), "{:?}", progress);
        assert_eq!(progress, vec![0, 0, 33, 66, 100, 100]);
    }

    #[tokio::test]
    async fn test_rejected_every_attempt_fails() {
        let (runner, _stores, _publisher) =
            setup(Arc::new(ProcessSandboxProvider), "Failure on purpose").await;

        let done = runner.run(queued("agent", "bench")).await.unwrap();
        assert_eq!(done.status, SubmissionStatus::Failed);
        let summary = done.score_summary.unwrap();
        assert_eq!(summary.score, 0.0);
        assert_eq!(summary.avg_turns, 3.0);
    }

    #[tokio::test]
    async fn test_missing_agent_mutates_nothing() {
        let (runner, stores, publisher) = setup(Arc::new(ProcessSandboxProvider), "Test Prompt").await;

        let err = runner.run(queued("ghost", "bench")).await.unwrap_err();
        assert!(matches!(err, RunnerError::AgentNotFound(ref id) if id == "ghost"));
        let err = runner.run(queued("agent", "nope")).await.unwrap_err();
        assert!(matches!(err, RunnerError::BenchmarkNotFound(_)));

        assert!(stores.submissions.get("sub-1").await.unwrap().is_none());
        assert!(publisher.0.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_sandbox_failure_marks_failed_and_returns_error() {
        let (runner, stores, publisher) = setup(Arc::new(BrokenSandboxes), "Test Prompt").await;

        let err = runner.run(queued("agent", "bench")).await.unwrap_err();
        assert!(matches!(err, RunnerError::Sandbox(_)));

        let stored = stores.submissions.get("sub-1").await.unwrap().unwrap();
        assert_eq!(stored.status, SubmissionStatus::Failed);
        assert_eq!(publisher.0.lock().unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_container_agent_injects_key_and_fails_cleanly() {
        let (runner, stores, _publisher) = setup(Arc::new(ProcessSandboxProvider), "Test Prompt").await;
        stores
            .agents
            .save("boxed", Agent::new("boxed", "Boxed").with_image("agent:latest"))
            .await
            .unwrap();
        let runner = runner.with_provisioner(Arc::new(FailingProvisioner));

        let err = runner.run(queued("boxed", "bench")).await.unwrap_err();
        assert!(matches!(err, RunnerError::Container(DockerError::PullFailed(_))));
        let stored = stores.submissions.get("sub-1").await.unwrap().unwrap();
        assert_eq!(stored.status, SubmissionStatus::Failed);
    }

    #[tokio::test]
    async fn test_shutdown_cancels_run() {
        let (runner, _stores, _publisher) = setup(Arc::new(ProcessSandboxProvider), "Test Prompt").await;
        let shutdown = CancellationToken::new();
        shutdown.cancel();
        let runner = runner.with_shutdown(shutdown);

        let done = runner.run(queued("agent", "bench")).await.unwrap();
        assert_eq!(done.status, SubmissionStatus::Failed);
    }

    #[test]
    fn test_run_plan_defaults() {
        let config = Config::default();
        let empty = RunPlan::for_benchmark(&Benchmark::new("b", "B", Vec::new()), &config);
        assert_eq!(empty.goal, FALLBACK_TASK_PROMPT);
        assert_eq!(empty.max_turns, 10);

        let mut task = Task::new("t", "Say Hello");
        task.max_turns = Some(4);
        let plan = RunPlan::for_benchmark(&Benchmark::new("b", "B", vec![task]), &config);
        assert_eq!(plan.goal, "Say Hello");
        assert_eq!(plan.max_turns, 4);
    }
}
