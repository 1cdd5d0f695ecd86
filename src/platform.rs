//! Composition root.
//!
//! [`PlatformBuilder`] wires stores, bus, sandboxes, model clients and the
//! four pipeline services from one [`Config`]. Every seam can be replaced
//! before `build`, which is how tests run the whole pipeline without Docker
//! or network access.
//!
//! Subscriptions:
//! - `submission.created` → [`Runner`]
//! - `score.calculated` → [`ScoringService`]
//! - `leaderboard.updated` → [`LeaderboardService`]

use std::sync::Arc;

use thiserror::Error;
use tokio_util::sync::CancellationToken;
use tracing::info;

use crate::bus::{EventBus, Publisher, QueuedDispatcher, Topic};
use crate::config::{Config, ConfigError, SandboxBackend};
use crate::error::{DockerError, RegistryError};
use crate::execution::{ContainerProvisioner, DockerAgentProvisioner, DockerClient};
use crate::llm::{HttpLlmFactory, LlmFactory};
use crate::metrics::Metrics;
use crate::models::{
    Agent, Benchmark, LeaderboardEntry, ScoreSummary, Submission, SubmissionRequest, TraceEvent,
};
use crate::protocol::{AgentClientFactory, HttpAgentClientFactory};
use crate::sandbox::{
    DockerSandboxProvider, ProcessSandboxProvider, SandboxProvider, SandboxRegistry,
};
use crate::services::{
    AgentRegistry, BenchmarkRegistry, LeaderboardService, Orchestrator, OrchestratorError, Runner,
    ScoringService, TraceLog,
};
use crate::storage::{ResetScope, StorageError, Stores};

/// Errors that can occur while building the platform.
#[derive(Debug, Error)]
pub enum PlatformError {
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("Storage error: {0}")]
    Storage(#[from] StorageError),

    #[error("Docker error: {0}")]
    Docker(#[from] DockerError),

    #[error("Metrics error: {0}")]
    Metrics(#[from] prometheus::Error),
}

/// Builder for [`Platform`].
pub struct PlatformBuilder {
    config: Config,
    stores: Option<Stores>,
    sandboxes: Option<Arc<dyn SandboxProvider>>,
    llm: Option<Arc<dyn LlmFactory>>,
    agent_clients: Option<Arc<dyn AgentClientFactory>>,
    provisioner: Option<Arc<dyn ContainerProvisioner>>,
    queue_capacity: Option<usize>,
}

impl PlatformBuilder {
    pub fn new(config: Config) -> Self {
        Self {
            config,
            stores: None,
            sandboxes: None,
            llm: None,
            agent_clients: None,
            provisioner: None,
            queue_capacity: None,
        }
    }

    /// Uses `stores` instead of opening `config.storage_dsn`.
    pub fn with_stores(mut self, stores: Stores) -> Self {
        self.stores = Some(stores);
        self
    }

    pub fn with_sandbox_provider(mut self, sandboxes: Arc<dyn SandboxProvider>) -> Self {
        self.sandboxes = Some(sandboxes);
        self
    }

    pub fn with_llm_factory(mut self, llm: Arc<dyn LlmFactory>) -> Self {
        self.llm = Some(llm);
        self
    }

    pub fn with_agent_clients(mut self, agent_clients: Arc<dyn AgentClientFactory>) -> Self {
        self.agent_clients = Some(agent_clients);
        self
    }

    pub fn with_provisioner(mut self, provisioner: Arc<dyn ContainerProvisioner>) -> Self {
        self.provisioner = Some(provisioner);
        self
    }

    /// Delivers events through per-topic queues instead of inline.
    ///
    /// `submit` then returns as soon as the submission is queued.
    pub fn with_queue(mut self, capacity: usize) -> Self {
        self.queue_capacity = Some(capacity);
        self
    }

    pub async fn build(self) -> Result<Platform, PlatformError> {
        self.config.validate()?;
        let config = Arc::new(self.config);

        let stores = match self.stores {
            Some(stores) => stores,
            None => Stores::open(&config.storage_dsn).await?,
        };
        let metrics = Arc::new(Metrics::new()?);
        let bus = Arc::new(EventBus::with_metrics(Arc::clone(&metrics)));
        let publisher: Arc<dyn Publisher> = match self.queue_capacity {
            Some(capacity) => Arc::new(QueuedDispatcher::start(Arc::clone(&bus), capacity)),
            None => bus.clone(),
        };

        // Docker is only contacted when a Docker-backed default is needed.
        let needs_docker = config.sandbox_backend == SandboxBackend::Docker
            && (self.sandboxes.is_none() || self.provisioner.is_none());
        let docker = if needs_docker {
            Some(Arc::new(DockerClient::new()?))
        } else {
            None
        };

        let sandboxes: Arc<dyn SandboxProvider> = match (self.sandboxes, &docker) {
            (Some(sandboxes), _) => sandboxes,
            (None, Some(client)) => Arc::new(DockerSandboxProvider::new(
                Arc::clone(client),
                config.sandbox_image.clone(),
            )),
            (None, None) => Arc::new(ProcessSandboxProvider),
        };
        let provisioner: Option<Arc<dyn ContainerProvisioner>> = match (self.provisioner, &docker) {
            (Some(provisioner), _) => Some(provisioner),
            (None, Some(client)) => Some(Arc::new(DockerAgentProvisioner::new(
                Arc::clone(client),
                config.agent_container_port,
                config.agent_ready_timeout,
            ))),
            (None, None) => None,
        };
        let llm = self
            .llm
            .unwrap_or_else(|| Arc::new(HttpLlmFactory::new(Arc::clone(&config))));
        let agent_clients = self
            .agent_clients
            .unwrap_or_else(|| Arc::new(HttpAgentClientFactory::new(config.http_timeout)));

        let shutdown = CancellationToken::new();
        let sandbox_registry = Arc::new(SandboxRegistry::new());
        let mut runner = Runner::new(
            Arc::clone(&config),
            stores.clone(),
            Arc::clone(&publisher),
            sandboxes,
            llm,
            agent_clients,
        )
        .with_registry(Arc::clone(&sandbox_registry))
        .with_metrics(Arc::clone(&metrics))
        .with_shutdown(shutdown.clone());
        if let Some(provisioner) = provisioner {
            runner = runner.with_provisioner(provisioner);
        }
        let runner = Arc::new(runner);

        let scoring = Arc::new(ScoringService::new(
            stores.scores.clone(),
            Arc::clone(&publisher),
        ));
        let leaderboard = Arc::new(
            LeaderboardService::new(stores.leaderboard.clone()).with_metrics(Arc::clone(&metrics)),
        );

        bus.subscribe(Topic::SubmissionCreated, runner.clone());
        bus.subscribe(Topic::ScoreCalculated, scoring.clone());
        bus.subscribe(Topic::LeaderboardUpdated, leaderboard.clone());

        info!(
            environment = %config.environment,
            storage = %config.storage_dsn,
            sandbox = ?config.sandbox_backend,
            queued = self.queue_capacity.is_some(),
            "Platform ready"
        );

        Ok(Platform {
            orchestrator: Orchestrator::new(stores.submissions.clone(), Arc::clone(&publisher)),
            agents: AgentRegistry::new(stores.agents.clone()),
            benchmarks: BenchmarkRegistry::new(stores.benchmarks.clone()),
            traces: TraceLog::new(stores.traces.clone(), publisher),
            config,
            stores,
            bus,
            metrics,
            runner,
            scoring,
            leaderboard,
            sandbox_registry,
            shutdown,
        })
    }
}

/// A wired benchmark pipeline.
pub struct Platform {
    config: Arc<Config>,
    stores: Stores,
    bus: Arc<EventBus>,
    metrics: Arc<Metrics>,
    orchestrator: Orchestrator,
    runner: Arc<Runner>,
    scoring: Arc<ScoringService>,
    leaderboard: Arc<LeaderboardService>,
    agents: AgentRegistry,
    benchmarks: BenchmarkRegistry,
    traces: TraceLog,
    sandbox_registry: Arc<SandboxRegistry>,
    shutdown: CancellationToken,
}

impl Platform {
    pub fn builder(config: Config) -> PlatformBuilder {
        PlatformBuilder::new(config)
    }

    /// Builds from the environment with every default backend.
    pub async fn from_env() -> Result<Self, PlatformError> {
        PlatformBuilder::new(Config::from_env()?).build().await
    }

    /// Queues a submission. With the inline bus the run has finished on return.
    pub async fn submit(&self, request: SubmissionRequest) -> Result<Submission, OrchestratorError> {
        self.orchestrator.submit(request).await
    }

    pub async fn register_agent(&self, agent: Agent) -> Result<Agent, RegistryError> {
        self.agents.register(agent).await
    }

    pub async fn create_benchmark(&self, benchmark: Benchmark) -> Result<Benchmark, RegistryError> {
        self.benchmarks.create(benchmark).await
    }

    pub async fn agents(&self) -> Result<Vec<Agent>, RegistryError> {
        self.agents.list().await
    }

    pub async fn benchmarks(&self) -> Result<Vec<Benchmark>, RegistryError> {
        self.benchmarks.list().await
    }

    pub async fn submissions(&self) -> Result<Vec<Submission>, StorageError> {
        self.orchestrator.list().await
    }

    pub async fn submission(&self, id: &str) -> Result<Option<Submission>, StorageError> {
        self.orchestrator.get(id).await
    }

    pub async fn scores(&self) -> Result<Vec<ScoreSummary>, StorageError> {
        self.scoring.list().await
    }

    /// Entries ordered by rank.
    pub async fn leaderboard(&self) -> Result<Vec<LeaderboardEntry>, StorageError> {
        self.leaderboard.ranked().await
    }

    pub async fn traces(&self) -> Result<Vec<TraceEvent>, StorageError> {
        self.traces.list().await
    }

    pub async fn traces_for(&self, submission_id: &str) -> Result<Vec<TraceEvent>, StorageError> {
        self.traces.for_submission(submission_id).await
    }

    pub fn trace_log(&self) -> &TraceLog {
        &self.traces
    }

    /// Clears run data, and with [`ResetScope::All`] the catalog too.
    pub async fn reset(&self, scope: ResetScope) -> Result<(), StorageError> {
        self.stores.reset(scope).await?;
        self.metrics.set_leaderboard_size(0);
        Ok(())
    }

    /// Cancels every run in flight.
    pub fn shutdown(&self) {
        info!(active_sandboxes = self.sandbox_registry.active_count(), "Shutting down runs");
        self.shutdown.cancel();
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn bus(&self) -> &Arc<EventBus> {
        &self.bus
    }

    pub fn metrics(&self) -> &Arc<Metrics> {
        &self.metrics
    }

    pub fn runner(&self) -> &Arc<Runner> {
        &self.runner
    }

    pub fn sandboxes(&self) -> &Arc<SandboxRegistry> {
        &self.sandbox_registry
    }
}
