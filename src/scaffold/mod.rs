//! Agent execution loop.
//!
//! The scaffold drives one agent against one sandbox:
//! 1. Plan the goal
//! 2. Act through the agent's sub-loop (tool calling, step protocol or mock)
//! 3. Reflect on the response and retry with feedback
//!
//! Every step is persisted as a trace entry as it happens.
//!
//! # Example
//!
//! ```ignore
//! use agentbench::scaffold::{Actor, Critic, ExecutionLoop, NoProgress, Planner, TraceRecorder};
//! use agentbench::llm::MockModel;
//!
//! let exec = ExecutionLoop::new(Actor::Mock(MockModel::new()), Planner::mock(), Critic::mock());
//! let recorder = TraceRecorder::new("sub-1", stores.traces.clone());
//! let outcome = exec.run("Say Hello", sandbox.as_ref(), &recorder, &NoProgress, &cancel).await;
//! ```

pub mod agent_loop;
pub mod prompts;
pub mod review;
pub mod step_protocol;
pub mod tool_calling;
pub mod tools;
pub mod trace;

pub use agent_loop::{
    ActContext, ActOutcome, Actor, AgentError, CostMeter, ExecutionLoop, LoopOutcome,
    NoProgress, ProgressSink, Verdict, DEFAULT_MAX_RETRIES, DEFAULT_MAX_TURNS,
};
pub use review::{Critic, Critique, ModelBackend, Planner};
pub use step_protocol::StepProtocolAgent;
pub use tool_calling::ToolCallingAgent;
pub use tools::{
    ReadFileTool, RunCommandTool, Tool, ToolContext, ToolError, ToolRegistry, ToolResult,
    WriteFileTool,
};
pub use trace::TraceRecorder;
