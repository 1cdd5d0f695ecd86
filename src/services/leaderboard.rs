//! Leaderboard projector.
//!
//! Every update reloads all entries, upserts the new one, sorts by score
//! (descending, ties keep insertion order) and rewrites every rank.

use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::Mutex;
use tracing::{debug, info};

use crate::bus::{Event, EventHandler};
use crate::error::HandlerError;
use crate::metrics::Metrics;
use crate::models::{LeaderboardEntry, Submission, SubmissionStatus};
use crate::storage::{Repository, StorageError};

/// Ranked view over completed submissions.
pub struct LeaderboardService {
    entries: Arc<dyn Repository<LeaderboardEntry>>,
    /// Serializes read-sort-rewrite cycles.
    rebuild: Mutex<()>,
    metrics: Option<Arc<Metrics>>,
}

impl LeaderboardService {
    pub fn new(entries: Arc<dyn Repository<LeaderboardEntry>>) -> Self {
        Self {
            entries,
            rebuild: Mutex::new(()),
            metrics: None,
        }
    }

    pub fn with_metrics(mut self, metrics: Arc<Metrics>) -> Self {
        self.metrics = Some(metrics);
        self
    }

    /// Adds or replaces the entry for `submission` and re-ranks everything.
    ///
    /// Only completed submissions with a summary are ranked.
    pub async fn update(&self, submission: &Submission) -> Result<Vec<LeaderboardEntry>, StorageError> {
        let Some(summary) = submission.score_summary.as_ref() else {
            debug!(submission_id = %submission.id, "No score summary, leaderboard unchanged");
            return self.ranked().await;
        };
        if submission.status != SubmissionStatus::Completed {
            debug!(
                submission_id = %submission.id,
                status = %submission.status,
                "Submission not completed, leaderboard unchanged"
            );
            return self.ranked().await;
        }

        let _guard = self.rebuild.lock().await;
        let mut entries = self.entries.list().await?;
        entries.retain(|e| e.submission_id != submission.id);
        entries.push(LeaderboardEntry::from_submission(submission, summary));
        entries.sort_by(|a, b| b.score.total_cmp(&a.score));

        for (index, entry) in entries.iter_mut().enumerate() {
            entry.rank = index + 1;
            self.entries
                .save(&entry.submission_id, entry.clone())
                .await?;
        }

        if let Some(metrics) = &self.metrics {
            metrics.set_leaderboard_size(entries.len());
        }
        info!(
            submission_id = %submission.id,
            entries = entries.len(),
            "Leaderboard re-ranked"
        );
        Ok(entries)
    }

    /// All entries ordered by rank.
    pub async fn ranked(&self) -> Result<Vec<LeaderboardEntry>, StorageError> {
        let mut entries = self.entries.list().await?;
        entries.sort_by_key(|e| e.rank);
        Ok(entries)
    }
}

#[async_trait]
impl EventHandler for LeaderboardService {
    fn name(&self) -> &str {
        "leaderboard"
    }

    async fn handle(&self, event: &Event) -> Result<(), HandlerError> {
        match event {
            Event::LeaderboardUpdated(submission) => {
                self.update(submission).await?;
                Ok(())
            }
            Event::SubmissionCreated(_) | Event::ScoreCalculated(_) | Event::TraceCreated(_) => {
                Ok(())
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{ScoreSummary, SubmissionRequest};
    use crate::storage::MemoryRepository;

    fn finished(id: &str, agent: &str, score: f64, status: SubmissionStatus) -> Submission {
        let mut submission = Submission::new(id, SubmissionRequest::new("bench", agent, ""));
        submission.agent_name = format!("{} name", agent);
        submission.transition(SubmissionStatus::Running).unwrap();
        submission.transition(status).unwrap();
        submission.score_summary = Some(ScoreSummary::from_run(score, 1, 0.25));
        submission
    }

    fn service() -> LeaderboardService {
        LeaderboardService::new(Arc::new(MemoryRepository::new()))
    }

    #[tokio::test]
    async fn test_ranks_descend_with_score() {
        let board = service();
        board
            .update(&finished("sub-1", "a", 0.0, SubmissionStatus::Completed))
            .await
            .unwrap();
        board
            .update(&finished("sub-2", "b", 1.0, SubmissionStatus::Completed))
            .await
            .unwrap();
        board
            .update(&finished("sub-3", "c", 1.0, SubmissionStatus::Completed))
            .await
            .unwrap();

        let ranked = board.ranked().await.unwrap();
        let ids: Vec<&str> = ranked.iter().map(|e| e.submission_id.as_str()).collect();
        assert_eq!(ids, vec!["sub-2", "sub-3", "sub-1"]);
        for pair in ranked.windows(2) {
            assert!(pair[0].score >= pair[1].score);
            assert!(pair[0].rank < pair[1].rank);
        }
        assert_eq!(ranked[0].agent_name, "b name");
        assert_eq!(ranked[0].total_cost, 0.25);
    }

    #[tokio::test]
    async fn test_repeat_update_does_not_duplicate() {
        let board = service();
        let submission = finished("sub-1", "a", 1.0, SubmissionStatus::Completed);
        board.update(&submission).await.unwrap();
        board.update(&submission).await.unwrap();

        let ranked = board.ranked().await.unwrap();
        assert_eq!(ranked.len(), 1);
        assert_eq!(ranked[0].rank, 1);
    }

    #[tokio::test]
    async fn test_failed_submissions_are_not_ranked() {
        let board = service();
        let entries = board
            .update(&finished("sub-1", "a", 0.0, SubmissionStatus::Failed))
            .await
            .unwrap();
        assert!(entries.is_empty());
    }
}
