//! CLI command definitions for agentbench.
//!
//! Every command builds a [`Platform`] from the environment plus flag
//! overrides, loads agents and benchmarks from a YAML fixture file where
//! needed, and prints results as JSON or a table.

use std::fs;
use std::path::{Path, PathBuf};

use anyhow::Context;
use clap::Parser;
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::config::{Config, SandboxBackend};
use crate::models::{Agent, Benchmark, LeaderboardEntry, SubmissionRequest};
use crate::platform::Platform;
use crate::storage::ResetScope;

/// Benchmark runner for LLM agents.
#[derive(Parser)]
#[command(name = "agentbench")]
#[command(about = "Run agents against benchmarks in sandboxes and rank the results")]
#[command(version)]
#[command(
    long_about = "agentbench submits agent x benchmark runs through a plan/act/reflect loop inside a sandbox, scores them and maintains a leaderboard.\n\nExample usage:\n  agentbench run --fixtures fixtures.yaml --agent mock-agent --benchmark greeting --sandbox process"
)]
pub struct Cli {
    /// The subcommand to execute.
    #[command(subcommand)]
    pub command: Commands,

    /// Log level (trace, debug, info, warn, error).
    #[arg(short, long, default_value = "info", global = true)]
    pub log_level: String,
}

/// Available CLI subcommands.
#[derive(clap::Subcommand)]
pub enum Commands {
    /// Run one agent against one benchmark and print the result.
    Run(RunArgs),

    /// Run every agent against every benchmark and print the ranking.
    #[command(alias = "lb")]
    Leaderboard(LeaderboardArgs),

    /// Clear stored runs (and optionally agents and benchmarks).
    Reset(ResetArgs),
}

/// Overrides applied on top of the environment configuration.
#[derive(clap::Args, Debug, Clone, Default)]
pub struct PlatformArgs {
    /// Storage DSN (`memory://...` or `sqlite:<path>`).
    #[arg(long, env = "STORAGE_DSN")]
    pub storage: Option<String>,

    /// Sandbox backend (docker, process).
    #[arg(long)]
    pub sandbox: Option<SandboxBackend>,

    /// Maximum plan/act/reflect attempts per submission.
    #[arg(long)]
    pub max_retries: Option<u32>,

    /// Maximum turns per attempt.
    #[arg(long)]
    pub max_turns: Option<u32>,
}

impl PlatformArgs {
    fn config(&self) -> anyhow::Result<Config> {
        let mut config = Config::from_env()?;
        if let Some(dsn) = &self.storage {
            config = config.with_storage_dsn(dsn.clone());
        }
        if let Some(backend) = self.sandbox {
            config = config.with_sandbox_backend(backend);
        }
        if let Some(retries) = self.max_retries {
            config = config.with_max_retries(retries);
        }
        if let Some(turns) = self.max_turns {
            config = config.with_max_turns(turns);
        }
        Ok(config)
    }
}

/// Arguments for `agentbench run`.
#[derive(Parser, Debug)]
pub struct RunArgs {
    /// YAML file with `agents` and `benchmarks` lists.
    #[arg(short, long)]
    pub fixtures: PathBuf,

    /// Benchmark id from the fixture file.
    #[arg(short, long)]
    pub benchmark: String,

    /// Agent id from the fixture file.
    #[arg(short, long)]
    pub agent: String,

    /// Opaque payload stored with the submission.
    #[arg(long, default_value = "")]
    pub payload: String,

    #[command(flatten)]
    pub platform: PlatformArgs,
}

/// Arguments for `agentbench leaderboard`.
#[derive(Parser, Debug)]
pub struct LeaderboardArgs {
    /// YAML file with `agents` and `benchmarks` lists.
    #[arg(short, long)]
    pub fixtures: PathBuf,

    /// Print JSON instead of a table.
    #[arg(long)]
    pub json: bool,

    #[command(flatten)]
    pub platform: PlatformArgs,
}

/// Arguments for `agentbench reset`.
#[derive(Parser, Debug)]
pub struct ResetArgs {
    /// What to clear: `runs` or `all`.
    #[arg(long, default_value = "runs")]
    pub scope: ResetScope,

    #[command(flatten)]
    pub platform: PlatformArgs,
}

/// Agents and benchmarks loaded from YAML.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Fixtures {
    #[serde(default)]
    pub agents: Vec<Agent>,
    #[serde(default)]
    pub benchmarks: Vec<Benchmark>,
}

impl Fixtures {
    pub fn load(path: &Path) -> anyhow::Result<Self> {
        let raw = fs::read_to_string(path)
            .with_context(|| format!("Failed to read fixtures from {}", path.display()))?;
        Self::from_yaml(&raw).with_context(|| format!("Invalid fixtures in {}", path.display()))
    }

    pub fn from_yaml(raw: &str) -> anyhow::Result<Self> {
        Ok(serde_yaml::from_str(raw)?)
    }

    /// Registers every agent and benchmark, keeping fixture ids.
    pub async fn install(&self, platform: &Platform) -> anyhow::Result<()> {
        for agent in &self.agents {
            platform.register_agent(agent.clone()).await?;
        }
        for benchmark in &self.benchmarks {
            platform.create_benchmark(benchmark.clone()).await?;
        }
        info!(
            agents = self.agents.len(),
            benchmarks = self.benchmarks.len(),
            "Fixtures installed"
        );
        Ok(())
    }
}

/// Parse CLI arguments.
pub fn parse_cli() -> Cli {
    Cli::parse()
}

/// Parse CLI arguments and run the command.
pub async fn run() -> anyhow::Result<()> {
    run_with_cli(parse_cli()).await
}

/// Run the CLI with the parsed arguments.
pub async fn run_with_cli(cli: Cli) -> anyhow::Result<()> {
    match cli.command {
        Commands::Run(args) => run_submission_command(args).await,
        Commands::Leaderboard(args) => run_leaderboard_command(args).await,
        Commands::Reset(args) => run_reset_command(args).await,
    }
}

async fn run_submission_command(args: RunArgs) -> anyhow::Result<()> {
    let fixtures = Fixtures::load(&args.fixtures)?;
    let platform = Platform::builder(args.platform.config()?).build().await?;
    fixtures.install(&platform).await?;

    let submission = platform
        .submit(SubmissionRequest::new(&args.benchmark, &args.agent, &args.payload))
        .await?;
    // The inline bus has run the pipeline; reload the final state.
    let submission = platform
        .submission(&submission.id)
        .await?
        .unwrap_or(submission);

    let output = serde_json::json!({
        "submission": submission,
        "traces": platform.traces_for(&submission.id).await?,
        "scores": platform.scores().await?,
        "leaderboard": platform.leaderboard().await?,
    });
    println!("{}", serde_json::to_string_pretty(&output)?);
    Ok(())
}

async fn run_leaderboard_command(args: LeaderboardArgs) -> anyhow::Result<()> {
    let fixtures = Fixtures::load(&args.fixtures)?;
    let platform = Platform::builder(args.platform.config()?).build().await?;
    fixtures.install(&platform).await?;

    for benchmark in &fixtures.benchmarks {
        for agent in &fixtures.agents {
            let request = SubmissionRequest::new(&benchmark.id, &agent.id, "");
            if let Err(e) = platform.submit(request).await {
                warn!(agent_id = %agent.id, benchmark_id = %benchmark.id, error = %e, "Submission failed");
            }
        }
    }

    let entries = platform.leaderboard().await?;
    if args.json {
        println!("{}", serde_json::to_string_pretty(&entries)?);
    } else {
        print_leaderboard(&entries);
    }
    Ok(())
}

async fn run_reset_command(args: ResetArgs) -> anyhow::Result<()> {
    // Reset never runs anything, so keep Docker out of it.
    let config = args
        .platform
        .config()?
        .with_sandbox_backend(SandboxBackend::Process);
    if config.storage_dsn.starts_with("memory://") {
        warn!(dsn = %config.storage_dsn, "In-memory storage has nothing to reset");
    }

    let platform = Platform::builder(config).build().await?;
    platform.reset(args.scope).await?;
    println!("Reset {:?} on {}", args.scope, platform.config().storage_dsn);
    Ok(())
}

fn print_leaderboard(entries: &[LeaderboardEntry]) {
    if entries.is_empty() {
        println!("No completed submissions.");
        return;
    }
    println!(
        "{:<5} {:<24} {:<20} {:>6} {:>10}",
        "Rank", "Agent", "Benchmark", "Score", "Cost ($)"
    );
    for entry in entries {
        println!(
            "{:<5} {:<24} {:<20} {:>6.2} {:>10.4}",
            entry.rank, entry.agent_name, entry.benchmark_id, entry.score, entry.total_cost
        );
    }
}
