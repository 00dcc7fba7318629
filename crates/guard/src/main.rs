//! `dupgate`: duplicate-code gate for agent hooks
//!
//! ```text
//! echo '{"tool_name":"Write","file_path":"b.py","proposed_content":"..."}' | dupgate check
//! dupgate index src/*.py
//! dupgate forget src/old.py
//! dupgate sweep
//! ```
//!
//! stdout carries exactly one JSON document; logs go to stderr.

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use dupgate_guard::{degraded_response, GateConfig, GuardAdapter, GuardResponse, HookEvent};
use dupgate_vector_store::{LocalVectorStore, VectorStore};
use serde_json::json;
use std::io::{self, Read};
use std::path::{Path, PathBuf};

#[derive(Parser)]
#[command(name = "dupgate")]
#[command(about = "Block or warn on duplicated code before it is written", long_about = None)]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Config file (default: .dupgate/config.toml when present)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Read a hook event from stdin and print the decision
    Check {
        /// Pretty-print JSON response
        #[arg(long)]
        pretty: bool,
    },

    /// Index files without checking them
    Index {
        #[arg(required = true)]
        files: Vec<PathBuf>,
    },

    /// Drop every record that came from a file
    Forget { file: PathBuf },

    /// Drop records whose source file no longer exists
    Sweep,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    init_logging(cli.verbose);

    let config = GateConfig::load(cli.config.as_deref()).context("Failed to load configuration")?;
    match cli.command {
        Commands::Check { pretty } => run_check(&config, pretty).await,
        Commands::Index { files } => {
            let (store, adapter) = open_gate(&config).await?;
            let outcome = run_index(&adapter, &files).await;
            close(&store).await?;
            outcome
        }
        Commands::Forget { file } => {
            let (store, adapter) = open_gate(&config).await?;
            let outcome = run_forget(&adapter, &file).await;
            close(&store).await?;
            outcome
        }
        Commands::Sweep => {
            let (store, adapter) = open_gate(&config).await?;
            let outcome = run_sweep(&adapter).await;
            close(&store).await?;
            outcome
        }
    }
}

async fn open_gate(config: &GateConfig) -> Result<(LocalVectorStore, GuardAdapter)> {
    GuardAdapter::open(config)
        .await
        .context("Failed to open duplicate index")
}

async fn close(store: &LocalVectorStore) -> Result<()> {
    store.shutdown().await.context("Failed to close vector store")
}

fn init_logging(verbose: bool) {
    let default_filter = if verbose { "debug" } else { "warn" };
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(default_filter))
        .target(env_logger::Target::Stderr)
        .filter_module("ort", log::LevelFilter::Off)
        .init();
}

/// Always answers with one JSON decision once the event parses: store and
/// model outages at startup go through the unavailability policy.
async fn run_check(config: &GateConfig, pretty: bool) -> Result<()> {
    let event = read_event()?;
    let response = match GuardAdapter::open(config).await {
        Ok((store, adapter)) => {
            let response = adapter.evaluate(&event).await;
            if let Err(err) = store.shutdown().await {
                log::warn!("Failed to close vector store: {err}");
            }
            response
        }
        Err(err) if err.is_unavailable() => degraded_response(config, &event, &err),
        Err(err) => return Err(err).context("Failed to open duplicate index"),
    };
    print_response(&response, pretty)
}

fn read_event() -> Result<HookEvent> {
    let mut buffer = String::new();
    io::stdin()
        .read_to_string(&mut buffer)
        .context("Failed to read hook event from stdin")?;
    if buffer.trim().is_empty() {
        anyhow::bail!("Hook event is empty. Pipe a JSON event via stdin.");
    }
    serde_json::from_str(&buffer).context("Invalid hook event JSON")
}

fn print_response(response: &GuardResponse, pretty: bool) -> Result<()> {
    let output = if pretty {
        serde_json::to_string_pretty(response)?
    } else {
        serde_json::to_string(response)?
    };
    println!("{output}");
    Ok(())
}

async fn run_index(adapter: &GuardAdapter, files: &[PathBuf]) -> Result<()> {
    let mut indexed = 0;
    for file in files {
        let content = std::fs::read_to_string(file)
            .with_context(|| format!("Failed to read {}", file.display()))?;
        indexed += adapter
            .index_content(&file.to_string_lossy(), &content)
            .await
            .with_context(|| format!("Failed to index {}", file.display()))?;
    }
    println!("{}", json!({ "files": files.len(), "indexed": indexed }));
    Ok(())
}

async fn run_forget(adapter: &GuardAdapter, file: &Path) -> Result<()> {
    let removed = adapter
        .detector()
        .forget_file(&file.to_string_lossy())
        .await
        .with_context(|| format!("Failed to forget {}", file.display()))?;
    println!("{}", json!({ "removed": removed }));
    Ok(())
}

async fn run_sweep(adapter: &GuardAdapter) -> Result<()> {
    let removed = adapter
        .detector()
        .reconcile(|path| Path::new(path).exists())
        .await
        .context("Failed to sweep stale records")?;
    println!("{}", json!({ "removed": removed }));
    Ok(())
}
