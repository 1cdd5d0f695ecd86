//! Keyed entity storage.
//!
//! Every collection is a [`Repository`]: save by id, get by id, list, clear.
//! Two backings exist:
//! - **Memory**: `RwLock`-protected maps, the default
//! - **SQLite**: one `items` table shared by all collections
//!
//! # Usage
//!
//! ```rust,ignore
//! use agentbench::storage::{ResetScope, Stores};
//!
//! let stores = Stores::open("sqlite:/var/lib/agentbench/bench.db").await?;
//! stores.submissions.save(&submission.id, submission.clone()).await?;
//! let all = stores.submissions.list().await?;
//!
//! // Wipe run data but keep registered agents and benchmarks
//! stores.reset(ResetScope::Runs).await?;
//! ```

pub mod memory;
pub mod sqlite;

pub use memory::MemoryRepository;
pub use sqlite::{SqliteRepository, SqliteStore};

use std::sync::Arc;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::info;

use crate::models::{Agent, Benchmark, LeaderboardEntry, ScoreSummary, Submission, TraceEvent};

/// Errors that can occur during storage operations.
#[derive(Debug, Error)]
pub enum StorageError {
    /// Query execution failed.
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    /// Serialization/deserialization error.
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// The DSN names a backing that does not exist.
    #[error("Unsupported storage DSN: {0}")]
    UnsupportedDsn(String),
}

/// A keyed collection of `T`.
///
/// `save` inserts or replaces. `list` returns values in first-insertion
/// order; replacing a value keeps its position.
#[async_trait]
pub trait Repository<T>: Send + Sync
where
    T: Clone + Send + Sync + 'static,
{
    async fn save(&self, id: &str, value: T) -> Result<(), StorageError>;

    async fn get(&self, id: &str) -> Result<Option<T>, StorageError>;

    async fn list(&self) -> Result<Vec<T>, StorageError>;

    async fn clear(&self) -> Result<(), StorageError>;
}

/// What a platform reset wipes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ResetScope {
    /// Submissions, traces, scores and the leaderboard.
    Runs,
    /// `Runs` plus registered agents and benchmarks.
    All,
}

impl std::str::FromStr for ResetScope {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "runs" => Ok(Self::Runs),
            "all" => Ok(Self::All),
            other => Err(format!("unknown reset scope '{}'", other)),
        }
    }
}

/// Every collection the platform persists.
#[derive(Clone)]
pub struct Stores {
    pub submissions: Arc<dyn Repository<Submission>>,
    pub agents: Arc<dyn Repository<Agent>>,
    pub benchmarks: Arc<dyn Repository<Benchmark>>,
    pub traces: Arc<dyn Repository<TraceEvent>>,
    pub scores: Arc<dyn Repository<ScoreSummary>>,
    pub leaderboard: Arc<dyn Repository<LeaderboardEntry>>,
}

impl Stores {
    /// Fresh in-memory collections.
    pub fn in_memory() -> Self {
        Self {
            submissions: Arc::new(MemoryRepository::new()),
            agents: Arc::new(MemoryRepository::new()),
            benchmarks: Arc::new(MemoryRepository::new()),
            traces: Arc::new(MemoryRepository::new()),
            scores: Arc::new(MemoryRepository::new()),
            leaderboard: Arc::new(MemoryRepository::new()),
        }
    }

    /// Collections backed by one SQLite database.
    pub fn sqlite(store: &SqliteStore) -> Self {
        Self {
            submissions: Arc::new(store.repository("submissions")),
            agents: Arc::new(store.repository("agents")),
            benchmarks: Arc::new(store.repository("benchmarks")),
            traces: Arc::new(store.repository("traces")),
            scores: Arc::new(store.repository("scores")),
            leaderboard: Arc::new(store.repository("leaderboard")),
        }
    }

    /// Opens the backing named by `dsn` (`memory://...` or `sqlite:...`).
    pub async fn open(dsn: &str) -> Result<Self, StorageError> {
        if dsn.starts_with("memory://") {
            info!(dsn = dsn, "Using in-memory storage");
            return Ok(Self::in_memory());
        }
        if dsn.starts_with("sqlite:") {
            let store = SqliteStore::open(dsn).await?;
            return Ok(Self::sqlite(&store));
        }
        Err(StorageError::UnsupportedDsn(dsn.to_string()))
    }

    /// Clears the collections named by `scope`.
    pub async fn reset(&self, scope: ResetScope) -> Result<(), StorageError> {
        self.submissions.clear().await?;
        self.traces.clear().await?;
        self.scores.clear().await?;
        self.leaderboard.clear().await?;

        if scope == ResetScope::All {
            self.agents.clear().await?;
            self.benchmarks.clear().await?;
        }

        info!(scope = ?scope, "Platform data reset");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::SubmissionRequest;

    async fn seeded() -> Stores {
        let stores = Stores::in_memory();
        stores
            .agents
            .save("agent", Agent::new("agent", "Agent"))
            .await
            .unwrap();
        stores
            .benchmarks
            .save("bench", Benchmark::new("bench", "Bench", Vec::new()))
            .await
            .unwrap();
        stores
            .submissions
            .save(
                "sub-1",
                Submission::new("sub-1", SubmissionRequest::new("bench", "agent", "")),
            )
            .await
            .unwrap();
        stores
    }

    #[tokio::test]
    async fn test_reset_runs_keeps_registrations() {
        let stores = seeded().await;
        stores.reset(ResetScope::Runs).await.unwrap();

        assert!(stores.submissions.list().await.unwrap().is_empty());
        assert_eq!(stores.agents.list().await.unwrap().len(), 1);
        assert_eq!(stores.benchmarks.list().await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_reset_all_clears_registrations() {
        let stores = seeded().await;
        stores.reset(ResetScope::All).await.unwrap();

        assert!(stores.submissions.list().await.unwrap().is_empty());
        assert!(stores.agents.list().await.unwrap().is_empty());
        assert!(stores.benchmarks.list().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_open_rejects_unknown_dsn() {
        let result = Stores::open("postgres://localhost/bench").await;
        assert!(matches!(result, Err(StorageError::UnsupportedDsn(_))));
    }

    #[test]
    fn test_reset_scope_from_str() {
        assert_eq!("runs".parse::<ResetScope>(), Ok(ResetScope::Runs));
        assert_eq!("ALL".parse::<ResetScope>(), Ok(ResetScope::All));
        assert!("users".parse::<ResetScope>().is_err());
    }
}
