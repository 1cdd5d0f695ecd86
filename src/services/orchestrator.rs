//! Submission intake.

use std::sync::Arc;

use thiserror::Error;
use tracing::{info, warn};
use uuid::Uuid;

use crate::bus::{Event, Publisher};
use crate::error::BusError;
use crate::models::{Submission, SubmissionRequest};
use crate::storage::{Repository, StorageError};

/// Errors that can occur while accepting a submission.
#[derive(Debug, Error)]
pub enum OrchestratorError {
    #[error("benchmark_id and agent_id are required")]
    MissingIdentifier,

    #[error("Storage error: {0}")]
    Storage(#[from] StorageError),

    #[error("Publish failed: {0}")]
    Publish(#[from] BusError),
}

/// Persists new submissions and announces them on the bus.
#[derive(Clone)]
pub struct Orchestrator {
    submissions: Arc<dyn Repository<Submission>>,
    publisher: Arc<dyn Publisher>,
}

impl Orchestrator {
    pub fn new(submissions: Arc<dyn Repository<Submission>>, publisher: Arc<dyn Publisher>) -> Self {
        Self {
            submissions,
            publisher,
        }
    }

    /// Queues a submission and publishes `submission.created`.
    ///
    /// With the synchronous bus the whole pipeline has run when this returns.
    pub async fn submit(&self, request: SubmissionRequest) -> Result<Submission, OrchestratorError> {
        if request.benchmark_id.trim().is_empty() || request.agent_id.trim().is_empty() {
            return Err(OrchestratorError::MissingIdentifier);
        }

        let submission = Submission::new(format!("sub-{}", Uuid::new_v4()), request);
        self.submissions
            .save(&submission.id, submission.clone())
            .await?;
        info!(
            submission_id = %submission.id,
            benchmark_id = %submission.benchmark_id,
            agent_id = %submission.agent_id,
            "Submission queued"
        );

        if let Err(e) = self
            .publisher
            .publish(Event::SubmissionCreated(submission.clone()))
            .await
        {
            warn!(submission_id = %submission.id, error = %e, "Failed to publish submission");
            return Err(e.into());
        }
        Ok(submission)
    }

    pub async fn get(&self, id: &str) -> Result<Option<Submission>, StorageError> {
        self.submissions.get(id).await
    }

    pub async fn list(&self) -> Result<Vec<Submission>, StorageError> {
        self.submissions.list().await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bus::{EventBus, EventHandler, Topic};
    use crate::error::HandlerError;
    use crate::models::SubmissionStatus;
    use crate::storage::MemoryRepository;
    use async_trait::async_trait;
    use std::sync::Mutex;

    struct Capture(Mutex<Vec<Event>>);

    #[async_trait]
    impl EventHandler for Capture {
        fn name(&self) -> &str {
            "capture"
        }

        async fn handle(&self, event: &Event) -> Result<(), HandlerError> {
            self.0.lock().unwrap().push(event.clone());
            Ok(())
        }
    }

    struct Reject;

    #[async_trait]
    impl EventHandler for Reject {
        fn name(&self) -> &str {
            "reject"
        }

        async fn handle(&self, _event: &Event) -> Result<(), HandlerError> {
            Err("runner unavailable".into())
        }
    }

    #[tokio::test]
    async fn test_submit_persists_then_publishes() {
        let repo = Arc::new(MemoryRepository::new());
        let bus = Arc::new(EventBus::new());
        let capture = Arc::new(Capture(Mutex::new(Vec::new())));
        bus.subscribe(Topic::SubmissionCreated, capture.clone());

        let orchestrator = Orchestrator::new(repo.clone(), bus);
        let submission = orchestrator
            .submit(SubmissionRequest::new("bench", "agent", "payload"))
            .await
            .unwrap();

        assert!(submission.id.starts_with("sub-"));
        assert_eq!(submission.status, SubmissionStatus::Queued);
        assert_eq!(orchestrator.get(&submission.id).await.unwrap(), Some(submission.clone()));

        let events = capture.0.lock().unwrap();
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].submission_id(), submission.id);
    }

    #[tokio::test]
    async fn test_missing_identifiers_mutate_nothing() {
        let repo = Arc::new(MemoryRepository::new());
        let orchestrator = Orchestrator::new(repo.clone(), Arc::new(EventBus::new()));

        let err = orchestrator
            .submit(SubmissionRequest::new("", "agent", ""))
            .await
            .unwrap_err();
        assert!(matches!(err, OrchestratorError::MissingIdentifier));
        assert!(orchestrator.list().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_publish_failure_is_returned_but_kept() {
        let repo = Arc::new(MemoryRepository::new());
        let bus = Arc::new(EventBus::new());
        bus.subscribe(Topic::SubmissionCreated, Arc::new(Reject));

        let orchestrator = Orchestrator::new(repo, bus);
        let err = orchestrator
            .submit(SubmissionRequest::new("bench", "agent", ""))
            .await
            .unwrap_err();

        assert!(matches!(err, OrchestratorError::Publish(_)));
        assert_eq!(orchestrator.list().await.unwrap().len(), 1);
    }
}
