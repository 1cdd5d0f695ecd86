//! Prompts used by the planner, the critic and the retry loop.

/// System prompt for the planning call.
pub const PLANNER_SYSTEM_PROMPT: &str = "You are an expert planner. Your goal is to break down a complex task into a clear, step-by-step execution plan. Do not execute the steps, just list them. Be concise.";

/// System prompt for the reflection call.
pub const CRITIC_SYSTEM_PROMPT: &str = "You are a strict quality assurance engineer. Your goal is to verify if the result satisfies the original task. If it does, say 'APPROVED'. If not, explain what is missing or wrong.";

/// Input used when a benchmark has no tasks.
pub const FALLBACK_TASK_PROMPT: &str = "Hello, are you working?";

/// User message asking for a plan.
pub fn planner_prompt(goal: &str) -> String {
    format!(
        "Task: {}\n\nCreate a numbered list of steps to complete this task.",
        goal
    )
}

/// User message asking the critic to judge `result`.
pub fn critic_prompt(task: &str, result: &str) -> String {
    format!("Original Task: {}\n\nResult:\n{}\n\nCritique:", task, result)
}

/// Prompt handed to the actor once a plan exists.
pub fn execution_prompt(goal: &str, plan: &str) -> String {
    format!(
        "Goal: {}\n\nPlan:\n{}\n\nExecute the plan using available tools.",
        goal, plan
    )
}

/// Goal for the next attempt after a rejection.
pub fn retry_prompt(goal: &str, feedback: &str) -> String {
    format!(
        "{}\n\nPrevious attempt failed.\nFeedback: {}",
        goal, feedback
    )
}
