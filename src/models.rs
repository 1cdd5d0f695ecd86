//! Core data model shared by every pipeline stage.
//!
//! Entities reference each other by id only. Every stage works on its own
//! cloned snapshot, so nothing here is shared mutably.

use std::collections::{BTreeMap, HashMap};
use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;
use uuid::Uuid;

/// Model id that selects the deterministic offline model.
pub const MOCK_MODEL: &str = "mock";

/// Lifecycle state of a submission.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum SubmissionStatus {
    #[default]
    Queued,
    Running,
    Completed,
    Failed,
}

impl SubmissionStatus {
    /// Returns true for `completed` and `failed`.
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Completed | Self::Failed)
    }

    /// Allowed moves: queued to running, running to a terminal state.
    pub fn can_transition_to(&self, next: SubmissionStatus) -> bool {
        matches!(
            (self, next),
            (Self::Queued, Self::Running)
                | (Self::Running, Self::Completed)
                | (Self::Running, Self::Failed)
        )
    }
}

impl fmt::Display for SubmissionStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Queued => write!(f, "queued"),
            Self::Running => write!(f, "running"),
            Self::Completed => write!(f, "completed"),
            Self::Failed => write!(f, "failed"),
        }
    }
}

/// Rejected status change.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
#[error("Invalid status transition from '{from}' to '{to}'")]
pub struct TransitionError {
    pub from: SubmissionStatus,
    pub to: SubmissionStatus,
}

/// Inbound request to run one agent against one benchmark.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SubmissionRequest {
    pub benchmark_id: String,
    pub agent_id: String,
    #[serde(default)]
    pub payload: String,
}

impl SubmissionRequest {
    pub fn new(
        benchmark_id: impl Into<String>,
        agent_id: impl Into<String>,
        payload: impl Into<String>,
    ) -> Self {
        Self {
            benchmark_id: benchmark_id.into(),
            agent_id: agent_id.into(),
            payload: payload.into(),
        }
    }
}

/// One run of one agent against one benchmark.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Submission {
    pub id: String,
    pub agent_id: String,
    #[serde(default)]
    pub agent_name: String,
    pub benchmark_id: String,
    #[serde(default)]
    pub benchmark_name: String,
    #[serde(default)]
    pub payload: String,
    pub submitted_at: DateTime<Utc>,
    #[serde(default)]
    pub completed_at: Option<DateTime<Utc>>,
    pub status: SubmissionStatus,
    /// Percentage in `0..=100`.
    #[serde(default)]
    pub progress: u8,
    #[serde(default)]
    pub score_summary: Option<ScoreSummary>,
}

impl Submission {
    /// Creates a queued submission.
    pub fn new(id: impl Into<String>, request: SubmissionRequest) -> Self {
        Self {
            id: id.into(),
            agent_id: request.agent_id,
            agent_name: String::new(),
            benchmark_id: request.benchmark_id,
            benchmark_name: String::new(),
            payload: request.payload,
            submitted_at: Utc::now(),
            completed_at: None,
            status: SubmissionStatus::Queued,
            progress: 0,
            score_summary: None,
        }
    }

    /// Moves to `next`, stamping `completed_at` on terminal states.
    pub fn transition(&mut self, next: SubmissionStatus) -> Result<(), TransitionError> {
        if !self.status.can_transition_to(next) {
            return Err(TransitionError {
                from: self.status,
                to: next,
            });
        }
        self.status = next;
        if next.is_terminal() {
            self.completed_at = Some(Utc::now());
        }
        Ok(())
    }

    /// Raises progress, never lowering it.
    pub fn advance_progress(&mut self, percent: u8) {
        self.progress = self.progress.max(percent.min(100));
    }
}

/// How the runner talks to an agent.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "kebab-case")]
pub enum ProviderKind {
    /// OpenAI-compatible chat completions with tool calling.
    #[default]
    #[serde(alias = "openai")]
    OpenAi,
    /// HTTP step protocol (`POST /agent/step`).
    AgentProtocol,
}

impl fmt::Display for ProviderKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::OpenAi => write!(f, "open-ai"),
            Self::AgentProtocol => write!(f, "agent-protocol"),
        }
    }
}

/// A registered subject under test.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
pub struct Agent {
    #[serde(default)]
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub provider: ProviderKind,
    #[serde(default)]
    pub endpoint: String,
    /// Container image to start on demand; takes precedence over `endpoint`.
    #[serde(default)]
    pub image: Option<String>,
    #[serde(default)]
    pub model: String,
    #[serde(default)]
    pub system_prompt: String,
    #[serde(default)]
    pub auth_token: Option<String>,
    #[serde(default)]
    pub headers: HashMap<String, String>,
    #[serde(default)]
    pub status: String,
    #[serde(default = "Utc::now")]
    pub created_at: DateTime<Utc>,
}

impl Agent {
    pub fn new(id: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            created_at: Utc::now(),
            ..Default::default()
        }
    }

    pub fn with_model(mut self, model: impl Into<String>) -> Self {
        self.model = model.into();
        self
    }

    pub fn with_provider(mut self, provider: ProviderKind) -> Self {
        self.provider = provider;
        self
    }

    pub fn with_endpoint(mut self, endpoint: impl Into<String>) -> Self {
        self.endpoint = endpoint.into();
        self
    }

    pub fn with_image(mut self, image: impl Into<String>) -> Self {
        self.image = Some(image.into());
        self
    }

    pub fn with_system_prompt(mut self, prompt: impl Into<String>) -> Self {
        self.system_prompt = prompt.into();
        self
    }

    /// True when the agent runs on the deterministic offline model.
    pub fn is_mock(&self) -> bool {
        self.model == MOCK_MODEL
    }
}

/// One unit of work inside a benchmark.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
pub struct Task {
    #[serde(default)]
    pub id: String,
    pub prompt: String,
    #[serde(default)]
    pub expected_tool: Option<String>,
    #[serde(default)]
    pub expected_output: Option<String>,
    #[serde(default)]
    pub constraints: Vec<String>,
    #[serde(default)]
    pub max_turns: Option<u32>,
    #[serde(default)]
    pub repo: Option<String>,
    #[serde(default)]
    pub commit: Option<String>,
    #[serde(default)]
    pub patch: Option<String>,
    #[serde(default)]
    pub test_files: Vec<String>,
    #[serde(default)]
    pub difficulty: Option<String>,
}

impl Task {
    pub fn new(id: impl Into<String>, prompt: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            prompt: prompt.into(),
            ..Default::default()
        }
    }
}

/// A named, ordered suite of tasks.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
pub struct Benchmark {
    #[serde(default)]
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub domain: String,
    #[serde(default)]
    pub tasks: Vec<Task>,
    #[serde(default)]
    pub tasks_count: usize,
    #[serde(default = "Utc::now")]
    pub created_at: DateTime<Utc>,
}

impl Benchmark {
    pub fn new(id: impl Into<String>, name: impl Into<String>, tasks: Vec<Task>) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            tasks_count: tasks.len(),
            tasks,
            created_at: Utc::now(),
            ..Default::default()
        }
    }
}

/// Kind of an execution trace entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TraceKind {
    Plan,
    Reflection,
    Agent,
    Tool,
}

impl fmt::Display for TraceKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Plan => write!(f, "plan"),
            Self::Reflection => write!(f, "reflection"),
            Self::Agent => write!(f, "agent"),
            Self::Tool => write!(f, "tool"),
        }
    }
}

/// Severity of a trace entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum TraceLevel {
    #[default]
    Info,
    Warn,
    Error,
}

/// Append-only record of one execution step.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TraceEvent {
    pub id: String,
    /// Position within the owning submission's trace, starting at 1.
    pub sequence: u64,
    pub submission_id: String,
    #[serde(default)]
    pub task_id: Option<String>,
    #[serde(rename = "type")]
    pub kind: TraceKind,
    pub message: String,
    #[serde(default)]
    pub tool_name: Option<String>,
    #[serde(default)]
    pub parameters: Option<Value>,
    #[serde(default)]
    pub result: Option<String>,
    #[serde(default)]
    pub level: TraceLevel,
    pub timestamp: DateTime<Utc>,
    pub success: bool,
    #[serde(default)]
    pub turns: u32,
    #[serde(default)]
    pub cost: f64,
    #[serde(default)]
    pub latency_ms: u64,
}

impl TraceEvent {
    /// A successful info-level entry with a fresh id.
    pub fn new(
        submission_id: impl Into<String>,
        sequence: u64,
        kind: TraceKind,
        message: impl Into<String>,
    ) -> Self {
        Self {
            id: format!("trace-{}", Uuid::new_v4()),
            sequence,
            submission_id: submission_id.into(),
            task_id: None,
            kind,
            message: message.into(),
            tool_name: None,
            parameters: None,
            result: None,
            level: TraceLevel::Info,
            timestamp: Utc::now(),
            success: true,
            turns: 0,
            cost: 0.0,
            latency_ms: 0,
        }
    }

    pub fn with_task(mut self, task_id: Option<String>) -> Self {
        self.task_id = task_id;
        self
    }

    pub fn with_tool(
        mut self,
        name: impl Into<String>,
        parameters: Value,
        result: impl Into<String>,
    ) -> Self {
        self.tool_name = Some(name.into());
        self.parameters = Some(parameters);
        self.result = Some(result.into());
        self
    }

    pub fn with_turns(mut self, turns: u32) -> Self {
        self.turns = turns;
        self
    }

    pub fn with_cost(mut self, cost: f64, latency_ms: u64) -> Self {
        self.cost = cost;
        self.latency_ms = latency_ms;
        self
    }

    pub fn with_outcome(mut self, success: bool, level: TraceLevel) -> Self {
        self.success = success;
        self.level = level;
        self
    }
}

/// Scalar outcome of a submission.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
pub struct ScoreSummary {
    /// Binary score, 0.0 or 1.0.
    pub score: f64,
    /// `score * 100`.
    pub success_rate: f64,
    #[serde(default)]
    pub tool_correctness: f64,
    #[serde(default)]
    pub violations: u32,
    /// Attempts used by the execution loop.
    #[serde(default)]
    pub avg_turns: f64,
    #[serde(default)]
    pub total_cost: f64,
    #[serde(default)]
    pub avg_latency: f64,
    #[serde(default)]
    pub metrics: BTreeMap<String, f64>,
    pub calculated: DateTime<Utc>,
}

impl ScoreSummary {
    /// Builds a summary from a binary score and the run's accounting.
    pub fn from_run(score: f64, attempts: u32, total_cost: f64) -> Self {
        let mut metrics = BTreeMap::new();
        metrics.insert("accuracy".to_string(), score);
        Self {
            score,
            success_rate: score * 100.0,
            tool_correctness: 0.0,
            violations: 0,
            avg_turns: f64::from(attempts),
            total_cost,
            avg_latency: 0.0,
            metrics,
            calculated: Utc::now(),
        }
    }
}

/// Ranked projection of one submission's score.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LeaderboardEntry {
    pub submission_id: String,
    pub benchmark_id: String,
    pub agent_id: String,
    #[serde(default)]
    pub agent_name: String,
    pub score: f64,
    #[serde(default)]
    pub success_rate: f64,
    #[serde(default)]
    pub tool_correctness: f64,
    #[serde(default)]
    pub violations: u32,
    #[serde(default)]
    pub avg_turns: f64,
    #[serde(default)]
    pub total_cost: f64,
    #[serde(default)]
    pub avg_latency: f64,
    /// 1-based position after the last re-sort.
    pub rank: usize,
}

impl LeaderboardEntry {
    /// Projects a scored submission. Rank is assigned by the projector.
    pub fn from_submission(submission: &Submission, summary: &ScoreSummary) -> Self {
        Self {
            submission_id: submission.id.clone(),
            benchmark_id: submission.benchmark_id.clone(),
            agent_id: submission.agent_id.clone(),
            agent_name: submission.agent_name.clone(),
            score: summary.score,
            success_rate: summary.success_rate,
            tool_correctness: summary.tool_correctness,
            violations: summary.violations,
            avg_turns: summary.avg_turns,
            total_cost: summary.total_cost,
            avg_latency: summary.avg_latency,
            rank: 0,
        }
    }
}
