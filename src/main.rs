use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use std::path::PathBuf;

mod cmd;

#[derive(Parser)]
#[command(name = "steward")]
#[command(version, about = "Session and agent-team coordinator for AI coding hosts")]
pub struct Cli {
    /// Project directory (defaults to the current directory)
    #[arg(long, global = true)]
    pub project_dir: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Handle one host hook event (JSON on stdin, one JSON object on stdout)
    Hook {
        #[command(subcommand)]
        command: HookCommands,
    },
    /// Inspect and drive the phased feature pipeline
    Pipeline {
        #[command(subcommand)]
        command: PipelineCommands,
    },
    /// Control the autonomous iteration loop
    Loop {
        #[command(subcommand)]
        command: LoopCommands,
    },
    /// Run the stdio JSON-RPC query server
    Serve,
}

#[derive(Subcommand, Clone)]
pub enum HookCommands {
    /// New session opened
    SessionStart,
    /// User submitted a prompt
    UserPrompt,
    /// A tool call finished
    PostTool,
    /// A teammate agent stopped
    SubagentStop,
    /// A teammate agent went idle
    TeamIdle,
    /// Main session is stopping
    Stop,
}

#[derive(Subcommand, Clone)]
pub enum PipelineCommands {
    /// Start (or resume) a pipeline for a feature
    Start {
        /// Feature name the pipeline tracks
        feature: String,
        /// Discard any existing pipeline and start fresh
        #[arg(long)]
        reset: bool,
    },
    /// Show the current pipeline state
    Status,
    /// Complete the current phase and move to the next
    Advance,
}

#[derive(Subcommand, Clone)]
pub enum LoopCommands {
    /// Start a loop with the given prompt
    Start {
        /// Prompt to re-inject each iteration
        #[arg(short, long)]
        prompt: String,
        /// Iteration cap (defaults from steward.toml)
        #[arg(long)]
        max_iterations: Option<u32>,
        /// Sentinel phrase that ends the loop (defaults from steward.toml)
        #[arg(long)]
        completion_promise: Option<String>,
    },
    /// Show the current loop state
    Status,
    /// Mark the loop complete without waiting for the sentinel
    Complete,
    /// Remove the loop state entirely
    Cancel,
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("warn")),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let start_dir = match cli.project_dir.clone() {
        Some(dir) => dir,
        None => std::env::current_dir().context("Failed to get current directory")?,
    };
    // Hooks are envelope-bound: they answer even outside a project. Every
    // manual command instead refuses to run without a resolvable root.
    if let Commands::Hook { command } = &cli.command {
        return cmd::cmd_hook(&start_dir, command);
    }
    let (paths, config) = cmd::project_context(&start_dir)?;

    match &cli.command {
        Commands::Hook { .. } => unreachable!("handled above"),
        Commands::Pipeline { command } => match command {
            PipelineCommands::Start { feature, reset } => {
                cmd::cmd_pipeline_start(&paths, &config, feature, *reset)?
            }
            PipelineCommands::Status => cmd::cmd_pipeline_status(&paths, &config)?,
            PipelineCommands::Advance => cmd::cmd_pipeline_advance(&paths, &config)?,
        },
        Commands::Loop { command } => match command {
            LoopCommands::Start {
                prompt,
                max_iterations,
                completion_promise,
            } => cmd::cmd_loop_start(
                &paths,
                &config,
                prompt,
                *max_iterations,
                completion_promise.as_deref(),
            )?,
            LoopCommands::Status => cmd::cmd_loop_status(&paths)?,
            LoopCommands::Complete => cmd::cmd_loop_complete(&paths)?,
            LoopCommands::Cancel => cmd::cmd_loop_cancel(&paths)?,
        },
        Commands::Serve => cmd::cmd_serve(&paths, &config).await?,
    }

    Ok(())
}
