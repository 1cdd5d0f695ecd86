//! Per-submission trace recording.
//!
//! Every entry is persisted before the loop moves on, so the stored trace
//! of a failed run still holds every step that executed.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use serde_json::Value;

use crate::models::{TraceEvent, TraceKind, TraceLevel};
use crate::storage::{Repository, StorageError};

/// Appends numbered [`TraceEvent`]s for one submission.
pub struct TraceRecorder {
    submission_id: String,
    task_id: Option<String>,
    traces: Arc<dyn Repository<TraceEvent>>,
    sequence: AtomicU64,
}

impl TraceRecorder {
    pub fn new(submission_id: impl Into<String>, traces: Arc<dyn Repository<TraceEvent>>) -> Self {
        Self {
            submission_id: submission_id.into(),
            task_id: None,
            traces,
            sequence: AtomicU64::new(0),
        }
    }

    /// Tags every entry with `task_id`.
    pub fn with_task(mut self, task_id: impl Into<String>) -> Self {
        let task_id = task_id.into();
        self.task_id = (!task_id.is_empty()).then_some(task_id);
        self
    }

    pub fn submission_id(&self) -> &str {
        &self.submission_id
    }

    /// Number of entries recorded so far.
    pub fn recorded(&self) -> u64 {
        self.sequence.load(Ordering::SeqCst)
    }

    /// A new entry carrying the next sequence number.
    pub fn entry(&self, kind: TraceKind, message: impl Into<String>) -> TraceEvent {
        let sequence = self.sequence.fetch_add(1, Ordering::SeqCst) + 1;
        TraceEvent::new(self.submission_id.clone(), sequence, kind, message)
            .with_task(self.task_id.clone())
    }

    /// Persists `event`.
    pub async fn append(&self, event: TraceEvent) -> Result<TraceEvent, StorageError> {
        tracing::debug!(
            submission_id = %event.submission_id,
            sequence = event.sequence,
            kind = %event.kind,
            success = event.success,
            "Recording trace"
        );
        self.traces.save(&event.id, event.clone()).await?;
        Ok(event)
    }

    pub async fn plan(&self, plan: &str) -> Result<TraceEvent, StorageError> {
        self.append(self.entry(TraceKind::Plan, plan)).await
    }

    /// Planning failed and the attempt goes on without a plan.
    pub async fn plan_skipped(&self, reason: &str) -> Result<TraceEvent, StorageError> {
        let event = self
            .entry(TraceKind::Plan, format!("Planning failed: {}", reason))
            .with_outcome(false, TraceLevel::Warn);
        self.append(event).await
    }

    pub async fn reflection(
        &self,
        approved: bool,
        feedback: &str,
    ) -> Result<TraceEvent, StorageError> {
        let level = if approved {
            TraceLevel::Info
        } else {
            TraceLevel::Warn
        };
        let event = self
            .entry(
                TraceKind::Reflection,
                format!("Approved: {}\nFeedback: {}", approved, feedback),
            )
            .with_outcome(approved, level);
        self.append(event).await
    }

    pub async fn agent_turn(
        &self,
        turn: u32,
        message: impl Into<String>,
        cost: f64,
        latency_ms: u64,
    ) -> Result<TraceEvent, StorageError> {
        let event = self
            .entry(TraceKind::Agent, message)
            .with_turns(turn)
            .with_cost(cost, latency_ms);
        self.append(event).await
    }

    pub async fn tool_call(
        &self,
        turn: u32,
        name: &str,
        parameters: Value,
        output: &str,
        success: bool,
    ) -> Result<TraceEvent, StorageError> {
        let level = if success {
            TraceLevel::Info
        } else {
            TraceLevel::Warn
        };
        let event = self
            .entry(TraceKind::Tool, format!("Executed {}", name))
            .with_tool(name, parameters, output)
            .with_turns(turn)
            .with_outcome(success, level);
        self.append(event).await
    }

    /// Error entry for the step of `kind` that aborted the run.
    pub async fn failure(&self, kind: TraceKind, error: &str) -> Result<TraceEvent, StorageError> {
        let event = self
            .entry(kind, format!("Error: {}", error))
            .with_outcome(false, TraceLevel::Error);
        self.append(event).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::MemoryRepository;
    use serde_json::json;

    fn recorder() -> (Arc<MemoryRepository<TraceEvent>>, TraceRecorder) {
        let repo = Arc::new(MemoryRepository::new());
        let recorder = TraceRecorder::new("sub-1", repo.clone()).with_task("task-1");
        (repo, recorder)
    }

    #[tokio::test]
    async fn test_entries_are_numbered_and_persisted() {
        let (repo, recorder) = recorder();
        recorder.plan("1. do it").await.unwrap();
        recorder
            .tool_call(1, "run_command", json!({"command": "ls"}), "ok", true)
            .await
            .unwrap();
        recorder.reflection(false, "Still loops").await.unwrap();

        let stored = repo.list().await.unwrap();
        let sequences: Vec<u64> = stored.iter().map(|e| e.sequence).collect();
        assert_eq!(sequences, vec![1, 2, 3]);
        assert_eq!(recorder.recorded(), 3);
        assert!(stored.iter().all(|e| e.task_id.as_deref() == Some("task-1")));

        assert_eq!(stored[1].tool_name.as_deref(), Some("run_command"));
        assert_eq!(stored[2].message, "Approved: false\nFeedback: Still loops");
        assert!(!stored[2].success);
    }

    #[tokio::test]
    async fn test_failure_entry() {
        let (_repo, recorder) = recorder();
        let event = recorder
            .failure(TraceKind::Agent, "Turn limit exceeded")
            .await
            .unwrap();
        assert_eq!(event.level, TraceLevel::Error);
        assert!(!event.success);
        assert_eq!(event.kind, TraceKind::Agent);
    }
}
