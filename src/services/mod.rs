//! Pipeline services.
//!
//! - [`Orchestrator`]: accepts submissions and publishes `submission.created`
//! - [`Runner`]: executes a created submission and publishes `score.calculated`
//! - [`ScoringService`]: stores score summaries and publishes `leaderboard.updated`
//! - [`LeaderboardService`]: re-ranks every entry on each update
//! - [`AgentRegistry`], [`BenchmarkRegistry`]: catalog of runnable agents and suites
//! - [`TraceLog`]: reads traces and records external entries

pub mod leaderboard;
pub mod orchestrator;
pub mod registry;
pub mod runner;
pub mod scoring;
pub mod traces;

pub use leaderboard::LeaderboardService;
pub use orchestrator::{Orchestrator, OrchestratorError};
pub use registry::{AgentRegistry, BenchmarkRegistry};
pub use runner::{Runner, RunnerError};
pub use scoring::ScoringService;
pub use traces::TraceLog;

use thiserror::Error;

use crate::error::BusError;
use crate::storage::StorageError;

/// Errors raised by the projection services.
#[derive(Debug, Error)]
pub enum ServiceError {
    #[error("Storage error: {0}")]
    Storage(#[from] StorageError),

    #[error("Publish failed: {0}")]
    Publish(#[from] BusError),
}
