//! Deterministic stand-in model for agents whose model is `"mock"`.
//!
//! Replies are pure functions of the prompt, so pipeline runs against a mock
//! agent are reproducible without network access.

/// Marker a reviewer reply must contain to approve a result.
pub const APPROVAL_MARKER: &str = "APPROVED";

const MOCK_PLAN: &str = "1. Write python script\n2. Write test\n3. Run test";
const DEFAULT_REPLY: &str = "Mock execution successful. I have completed the task.";
const CALCULATOR_PATCH: &str = "if b == 0:\n        return 0";

/// Heuristic planner, actor and reviewer.
#[derive(Debug, Clone, Copy, Default)]
pub struct MockModel;

impl MockModel {
    pub fn new() -> Self {
        Self
    }

    /// Fixed three-step plan.
    pub fn plan(&self, _goal: &str) -> String {
        MOCK_PLAN.to_string()
    }

    /// Final answer for `prompt`.
    pub fn act(&self, prompt: &str) -> String {
        if prompt.is_empty() {
            return "I am a mock agent.".to_string();
        }
        if ["Say Hello", "Greeting", "Echo"]
            .iter()
            .any(|k| prompt.contains(k))
        {
            return "Hello World".to_string();
        }
        if prompt.contains("Math") {
            return "42".to_string();
        }
        if prompt.contains("calculator.py") {
            return CALCULATOR_PATCH.to_string();
        }
        if prompt.contains("infinite loop") {
            // A retry prompt carries reviewer feedback.
            if prompt.contains("Feedback") {
                return "Correct Fix".to_string();
            }
            return "Wrong Fix".to_string();
        }
        DEFAULT_REPLY.to_string()
    }

    /// Review text for `result` against `task_prompt`.
    ///
    /// Approval replies contain [`APPROVAL_MARKER`].
    pub fn review(&self, task_prompt: &str, result: &str) -> String {
        if task_prompt.contains("Failure") {
            return "REJECTED: Intentional failure for testing.".to_string();
        }
        if task_prompt.contains("infinite loop") {
            if result.contains("Wrong Fix") {
                return "Still loops".to_string();
            }
            return format!("{}: Loop fixed.", APPROVAL_MARKER);
        }
        format!("{}: Mock execution successful.", APPROVAL_MARKER)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_act_heuristics() {
        let model = MockModel::new();
        assert_eq!(model.act("Goal: Say Hello to the user"), "Hello World");
        assert_eq!(model.act("Echo this"), "Hello World");
        assert_eq!(model.act("Math: 6 * 7"), "42");
        assert_eq!(model.act("Test Prompt"), DEFAULT_REPLY);
        assert_eq!(model.act(""), "I am a mock agent.");
    }

    #[test]
    fn test_infinite_loop_needs_feedback() {
        let model = MockModel::new();
        let first = model.act("Fix the infinite loop");
        assert_eq!(first, "Wrong Fix");
        assert!(!model.review("Fix the infinite loop", &first).contains(APPROVAL_MARKER));

        let second = model.act("Fix the infinite loop\n\nFeedback: Still loops");
        assert_eq!(second, "Correct Fix");
        assert!(model.review("Fix the infinite loop", &second).contains(APPROVAL_MARKER));
    }

    #[test]
    fn test_review_rejects_failure_tasks() {
        let model = MockModel::new();
        assert!(!model.review("Failure case", "anything").contains(APPROVAL_MARKER));
        assert!(model.review("Test Prompt", "anything").contains(APPROVAL_MARKER));
    }
}
