//! Command-line interface for agentbench.
//!
//! Provides commands to run submissions from fixture files, print the
//! leaderboard and reset persistent storage.

mod commands;

pub use commands::{parse_cli, run, run_with_cli, Cli, Commands, Fixtures};
