//! Typed events carried by the bus.

use std::fmt;

use crate::models::{Submission, TraceEvent};

/// Named channel an event is delivered on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Topic {
    SubmissionCreated,
    ScoreCalculated,
    LeaderboardUpdated,
    TraceCreated,
}

impl Topic {
    /// Every topic, in pipeline order.
    pub const ALL: [Topic; 4] = [
        Topic::SubmissionCreated,
        Topic::ScoreCalculated,
        Topic::LeaderboardUpdated,
        Topic::TraceCreated,
    ];

    /// Wire name of the topic.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::SubmissionCreated => "submission.created",
            Self::ScoreCalculated => "score.calculated",
            Self::LeaderboardUpdated => "leaderboard.updated",
            Self::TraceCreated => "trace.created",
        }
    }
}

impl fmt::Display for Topic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Payload published on the bus. Each variant belongs to exactly one topic.
#[derive(Debug, Clone, PartialEq)]
pub enum Event {
    /// A submission was accepted and queued.
    SubmissionCreated(Submission),
    /// A submission reached a terminal state.
    ScoreCalculated(Submission),
    /// A score summary was stored.
    LeaderboardUpdated(Submission),
    /// A trace entry was recorded outside the runner.
    TraceCreated(TraceEvent),
}

impl Event {
    pub fn topic(&self) -> Topic {
        match self {
            Self::SubmissionCreated(_) => Topic::SubmissionCreated,
            Self::ScoreCalculated(_) => Topic::ScoreCalculated,
            Self::LeaderboardUpdated(_) => Topic::LeaderboardUpdated,
            Self::TraceCreated(_) => Topic::TraceCreated,
        }
    }

    /// Submission id the event concerns.
    pub fn submission_id(&self) -> &str {
        match self {
            Self::SubmissionCreated(s) | Self::ScoreCalculated(s) | Self::LeaderboardUpdated(s) => {
                &s.id
            }
            Self::TraceCreated(t) => &t.submission_id,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::SubmissionRequest;

    #[test]
    fn test_event_topic_mapping() {
        let sub = Submission::new("sub-1", SubmissionRequest::new("b", "a", ""));
        assert_eq!(
            Event::SubmissionCreated(sub.clone()).topic(),
            Topic::SubmissionCreated
        );
        assert_eq!(
            Event::ScoreCalculated(sub.clone()).topic(),
            Topic::ScoreCalculated
        );
        assert_eq!(
            Event::LeaderboardUpdated(sub.clone()).topic().as_str(),
            "leaderboard.updated"
        );
        assert_eq!(Event::ScoreCalculated(sub).submission_id(), "sub-1");
    }
}
