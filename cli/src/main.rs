//! jsrunner - run scripts in a sandboxed, time-bounded QuickJS context
//!
//! ## Module Structure
//! - `helpers` - Output rendering, exit codes and the REPL input buffer

mod helpers;

use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;

use anyhow::Context as _;
use clap::{Parser, Subcommand};
use jsrunner_engine::{Coordinator, ExecutionConfig, OutputLog};
use jsrunner_script_host::QuickJsHost;
use tokio::io::{AsyncBufReadExt, BufReader};

use helpers::{exit_code, print_since, ReplAction, ReplBuffer};

#[derive(Debug, Parser)]
#[command(name = "jsrunner", version, about)]
struct Cli {
    /// TOML configuration file
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Execution budget per run, in milliseconds
    #[arg(long, global = true)]
    timeout_ms: Option<u64>,

    /// Maximum script length, in characters
    #[arg(long, global = true)]
    max_script_length: Option<usize>,

    /// Print output lines as JSON
    #[arg(long, global = true)]
    json: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Run a script file
    Run { file: PathBuf },
    /// Evaluate an inline expression
    Eval { expr: String },
    /// Interactive session; a blank line runs the buffered script
    Repl,
}

impl Cli {
    fn execution_config(&self) -> anyhow::Result<ExecutionConfig> {
        let mut config = ExecutionConfig::load(self.config.as_deref())
            .context("Failed to load configuration")?;
        if let Some(timeout_ms) = self.timeout_ms {
            config.execution_timeout_ms = timeout_ms;
        }
        if let Some(max) = self.max_script_length {
            config.max_script_length = max;
        }
        config.validate()?;
        Ok(config)
    }
}

fn main() -> anyhow::Result<ExitCode> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("warn")),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let config = cli.execution_config()?;

    let runtime = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
        .context("Failed to start async runtime")?;
    runtime.block_on(run(cli, config))
}

async fn run(cli: Cli, config: ExecutionConfig) -> anyhow::Result<ExitCode> {
    let host = QuickJsHost::new().context("Failed to start script host")?;
    let log = OutputLog::new();
    let coordinator = Coordinator::spawn(Arc::new(host), config, log.clone())?;
    tracing::info!("jsrunner ready");

    let code = match cli.command {
        Command::Run { file } => {
            let source = std::fs::read_to_string(&file)
                .with_context(|| format!("Failed to read {}", file.display()))?;
            run_once(&coordinator, &source, cli.json).await?
        }
        Command::Eval { expr } => run_once(&coordinator, &expr, cli.json).await?,
        Command::Repl => {
            repl(&coordinator, cli.json).await?;
            ExitCode::SUCCESS
        }
    };

    coordinator.shutdown().await;
    Ok(code)
}

async fn run_once(coordinator: &Coordinator, source: &str, json: bool) -> anyhow::Result<ExitCode> {
    let outcome = coordinator.run(source).await;
    print_since(coordinator.log(), 0, json)?;
    Ok(ExitCode::from(exit_code(&outcome)))
}

async fn repl(coordinator: &Coordinator, json: bool) -> anyhow::Result<()> {
    let mut input = BufReader::new(tokio::io::stdin()).lines();
    let mut buffer = ReplBuffer::new();
    let mut printed = 0;

    eprintln!("jsrunner {} - blank line runs, :clear resets, :quit exits", env!("CARGO_PKG_VERSION"));

    while let Some(line) = input.next_line().await? {
        match buffer.push(&line) {
            ReplAction::Continue => {}
            ReplAction::Clear => eprintln!("(buffer cleared)"),
            ReplAction::Quit => return Ok(()),
            ReplAction::Submit(script) => {
                coordinator.run(&script).await;
                printed = print_since(coordinator.log(), printed, json)?;
            }
        }
    }

    // EOF runs whatever is still buffered
    if let Some(script) = buffer.finish() {
        coordinator.run(&script).await;
        print_since(coordinator.log(), printed, json)?;
    }
    Ok(())
}
