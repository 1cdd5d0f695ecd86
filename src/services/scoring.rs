//! Scoring aggregator.

use std::sync::Arc;

use async_trait::async_trait;
use tracing::{debug, info};

use super::ServiceError;
use crate::bus::{Event, EventHandler, Publisher};
use crate::error::HandlerError;
use crate::models::{ScoreSummary, Submission};
use crate::storage::{Repository, StorageError};

/// Stores each scored submission's summary and forwards it to the leaderboard.
pub struct ScoringService {
    scores: Arc<dyn Repository<ScoreSummary>>,
    publisher: Arc<dyn Publisher>,
}

impl ScoringService {
    pub fn new(scores: Arc<dyn Repository<ScoreSummary>>, publisher: Arc<dyn Publisher>) -> Self {
        Self { scores, publisher }
    }

    /// Persists the summary keyed by submission id and publishes
    /// `leaderboard.updated`. Submissions without a summary are ignored.
    pub async fn record(&self, submission: &Submission) -> Result<Option<ScoreSummary>, ServiceError> {
        let Some(summary) = submission.score_summary.clone() else {
            debug!(submission_id = %submission.id, "Scored event without summary, ignoring");
            return Ok(None);
        };

        self.scores.save(&submission.id, summary.clone()).await?;
        info!(
            submission_id = %submission.id,
            score = summary.score,
            status = %submission.status,
            "Score recorded"
        );

        self.publisher
            .publish(Event::LeaderboardUpdated(submission.clone()))
            .await?;
        Ok(Some(summary))
    }

    pub async fn get(&self, submission_id: &str) -> Result<Option<ScoreSummary>, StorageError> {
        self.scores.get(submission_id).await
    }

    pub async fn list(&self) -> Result<Vec<ScoreSummary>, StorageError> {
        self.scores.list().await
    }
}

#[async_trait]
impl EventHandler for ScoringService {
    fn name(&self) -> &str {
        "scoring"
    }

    async fn handle(&self, event: &Event) -> Result<(), HandlerError> {
        match event {
            Event::ScoreCalculated(submission) => {
                self.record(submission).await?;
                Ok(())
            }
            Event::SubmissionCreated(_) | Event::LeaderboardUpdated(_) | Event::TraceCreated(_) => {
                Ok(())
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bus::EventBus;
    use crate::models::{SubmissionRequest, SubmissionStatus};
    use crate::storage::MemoryRepository;

    fn scored(id: &str, score: f64) -> Submission {
        let mut submission = Submission::new(id, SubmissionRequest::new("bench", "agent", ""));
        submission.transition(SubmissionStatus::Running).unwrap();
        submission.transition(SubmissionStatus::Completed).unwrap();
        submission.score_summary = Some(ScoreSummary::from_run(score, 1, 0.0));
        submission
    }

    #[tokio::test]
    async fn test_records_summary_keyed_by_submission() {
        let scoring = ScoringService::new(Arc::new(MemoryRepository::new()), Arc::new(EventBus::new()));
        scoring
            .handle(&Event::ScoreCalculated(scored("sub-1", 1.0)))
            .await
            .unwrap();

        let summary = scoring.get("sub-1").await.unwrap().unwrap();
        assert_eq!(summary.score, 1.0);
        assert_eq!(summary.success_rate, 100.0);
    }

    #[tokio::test]
    async fn test_ignores_missing_summary_and_other_topics() {
        let scoring = ScoringService::new(Arc::new(MemoryRepository::new()), Arc::new(EventBus::new()));
        let bare = Submission::new("sub-2", SubmissionRequest::new("bench", "agent", ""));

        assert!(scoring.record(&bare).await.unwrap().is_none());
        scoring
            .handle(&Event::LeaderboardUpdated(scored("sub-3", 1.0)))
            .await
            .unwrap();
        assert!(scoring.list().await.unwrap().is_empty());
    }
}
