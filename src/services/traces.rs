//! Trace queries and external trace recording.

use std::sync::Arc;

use tracing::debug;

use super::ServiceError;
use crate::bus::{Event, Publisher};
use crate::models::{TraceEvent, TraceKind};
use crate::storage::{Repository, StorageError};

/// Read side of the trace store, plus `trace.created` for external recorders.
#[derive(Clone)]
pub struct TraceLog {
    traces: Arc<dyn Repository<TraceEvent>>,
    publisher: Arc<dyn Publisher>,
}

impl TraceLog {
    pub fn new(traces: Arc<dyn Repository<TraceEvent>>, publisher: Arc<dyn Publisher>) -> Self {
        Self { traces, publisher }
    }

    /// Appends a free-form entry after the submission's existing ones.
    pub async fn record(
        &self,
        submission_id: &str,
        kind: TraceKind,
        message: impl Into<String>,
    ) -> Result<TraceEvent, ServiceError> {
        let sequence = self
            .for_submission(submission_id)
            .await?
            .last()
            .map_or(1, |last| last.sequence + 1);

        let event = TraceEvent::new(submission_id, sequence, kind, message);
        self.traces.save(&event.id, event.clone()).await?;
        debug!(submission_id, sequence, kind = %kind, "External trace recorded");

        self.publisher
            .publish(Event::TraceCreated(event.clone()))
            .await?;
        Ok(event)
    }

    /// Every entry, oldest first.
    pub async fn list(&self) -> Result<Vec<TraceEvent>, StorageError> {
        self.traces.list().await
    }

    /// Entries of one submission ordered by sequence.
    pub async fn for_submission(&self, submission_id: &str) -> Result<Vec<TraceEvent>, StorageError> {
        let mut events: Vec<TraceEvent> = self
            .traces
            .list()
            .await?
            .into_iter()
            .filter(|e| e.submission_id == submission_id)
            .collect();
        events.sort_by_key(|e| e.sequence);
        Ok(events)
    }
}
