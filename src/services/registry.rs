//! Agent and benchmark catalogs.

use std::sync::Arc;

use chrono::Utc;
use tracing::info;
use uuid::Uuid;

use crate::error::RegistryError;
use crate::models::{Agent, Benchmark};
use crate::storage::Repository;

/// Status given to agents registered without one.
pub const DEFAULT_AGENT_STATUS: &str = "active";

/// Registered agents.
#[derive(Clone)]
pub struct AgentRegistry {
    agents: Arc<dyn Repository<Agent>>,
}

impl AgentRegistry {
    pub fn new(agents: Arc<dyn Repository<Agent>>) -> Self {
        Self { agents }
    }

    /// Stores `agent`, filling in id, creation time and status.
    pub async fn register(&self, mut agent: Agent) -> Result<Agent, RegistryError> {
        if agent.id.is_empty() {
            agent.id = format!("agent-{}", Uuid::new_v4());
        }
        agent.created_at = Utc::now();
        if agent.status.is_empty() {
            agent.status = DEFAULT_AGENT_STATUS.to_string();
        }

        self.agents.save(&agent.id, agent.clone()).await?;
        info!(agent_id = %agent.id, name = %agent.name, provider = %agent.provider, "Agent registered");
        Ok(agent)
    }

    pub async fn get(&self, id: &str) -> Result<Option<Agent>, RegistryError> {
        Ok(self.agents.get(id).await?)
    }

    pub async fn list(&self) -> Result<Vec<Agent>, RegistryError> {
        Ok(self.agents.list().await?)
    }
}

/// Registered benchmarks.
#[derive(Clone)]
pub struct BenchmarkRegistry {
    benchmarks: Arc<dyn Repository<Benchmark>>,
}

impl BenchmarkRegistry {
    pub fn new(benchmarks: Arc<dyn Repository<Benchmark>>) -> Self {
        Self { benchmarks }
    }

    /// Stores `benchmark`. The name is required.
    pub async fn create(&self, mut benchmark: Benchmark) -> Result<Benchmark, RegistryError> {
        if benchmark.name.trim().is_empty() {
            return Err(RegistryError::MissingName);
        }
        if benchmark.id.is_empty() {
            benchmark.id = format!("bench-{}", Uuid::new_v4());
        }
        benchmark.created_at = Utc::now();
        benchmark.tasks_count = benchmark.tasks.len();

        self.benchmarks
            .save(&benchmark.id, benchmark.clone())
            .await?;
        info!(
            benchmark_id = %benchmark.id,
            name = %benchmark.name,
            tasks = benchmark.tasks_count,
            "Benchmark created"
        );
        Ok(benchmark)
    }

    pub async fn get(&self, id: &str) -> Result<Option<Benchmark>, RegistryError> {
        Ok(self.benchmarks.get(id).await?)
    }

    pub async fn list(&self) -> Result<Vec<Benchmark>, RegistryError> {
        Ok(self.benchmarks.list().await?)
    }
}
