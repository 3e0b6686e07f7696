//! `bizflow` CLI entry-point.
//!
//! Available sub-commands:
//! - `serve`: start the HTTP server and resume unfinished runs.
//! - `run`: execute one blueprint file in-process.
//! - `validate`: validate a blueprint JSON file.
//! - `migrate`: run pending database migrations.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use clap::{Args, Parser, Subcommand};
use serde_json::Value;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use db::{BlueprintStore, MemoryStore, PgStore, RunStore};
use engine::{validate_blueprint, Blueprint, EngineConfig, GraphEngine};
use tools::timer::TimerTool;
use tools::ToolRegistry;

#[derive(Parser)]
#[command(
    name = "bizflow",
    about = "Durable workflow engine for business automations",
    version
)]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Args, Clone)]
struct EngineArgs {
    /// Nodes visited per iteration before the walk is cut off.
    #[arg(long, env = "BIZFLOW_MAX_STEPS", default_value_t = 50)]
    max_steps: usize,
    /// Retries for transient tool and store failures.
    #[arg(long, env = "BIZFLOW_MAX_RETRIES", default_value_t = 3)]
    max_retries: u32,
    /// Base back-off between retries, in milliseconds.
    #[arg(long, env = "BIZFLOW_RETRY_BASE_MS", default_value_t = 100)]
    retry_base_ms: u64,
}

impl From<EngineArgs> for EngineConfig {
    fn from(args: EngineArgs) -> Self {
        EngineConfig {
            max_steps: args.max_steps,
            max_retries: args.max_retries,
            retry_base_delay: Duration::from_millis(args.retry_base_ms),
        }
    }
}

#[derive(Subcommand)]
enum Command {
    /// Start the HTTP server.
    Serve {
        #[arg(long, env = "BIZFLOW_BIND", default_value = "0.0.0.0:8080")]
        bind: String,
        /// Postgres URL; runs and blueprints are kept in memory when unset.
        #[arg(long, env = "DATABASE_URL")]
        database_url: Option<String>,
        #[arg(long, env = "BIZFLOW_MAX_CONNECTIONS", default_value_t = 10)]
        max_connections: u32,
        #[command(flatten)]
        engine: EngineArgs,
    },
    /// Execute a blueprint once against an in-memory store and print the run.
    Run {
        /// Path to the blueprint JSON file.
        blueprint: PathBuf,
        /// JSON file used as `trigger_data`.
        #[arg(long)]
        payload: Option<PathBuf>,
        #[command(flatten)]
        engine: EngineArgs,
    },
    /// Validate a blueprint JSON file.
    Validate {
        /// Path to the blueprint JSON file.
        path: PathBuf,
    },
    /// Run pending database migrations.
    Migrate {
        #[arg(long, env = "DATABASE_URL")]
        database_url: String,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let cli = Cli::parse();

    match cli.command {
        Command::Serve { bind, database_url, max_connections, engine } => {
            serve(&bind, database_url.as_deref(), max_connections, engine.into()).await
        }
        Command::Run { blueprint, payload, engine } => run(&blueprint, payload.as_deref(), engine.into()).await,
        Command::Validate { path } => {
            let blueprint = read_blueprint(&path)?;
            match validate_blueprint(&blueprint) {
                Ok(()) => {
                    println!("✅ Blueprint '{}' is valid ({} nodes).", blueprint.name, blueprint.nodes.len());
                    Ok(())
                }
                Err(e) => {
                    eprintln!("❌ Validation failed: {e}");
                    std::process::exit(1);
                }
            }
        }
        Command::Migrate { database_url } => {
            let pool = db::pool::connect(&database_url, 2)
                .await
                .context("failed to connect to database")?;
            db::pool::migrate(&pool).await.context("migration failed")?;
            info!("Migrations applied successfully");
            Ok(())
        }
    }
}

fn tool_registry() -> Arc<ToolRegistry> {
    Arc::new(ToolRegistry::new().with(Arc::new(TimerTool)))
}

fn read_json(path: &Path) -> anyhow::Result<Value> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("cannot read file {}", path.display()))?;
    serde_json::from_str(&content).with_context(|| format!("invalid JSON in {}", path.display()))
}

fn read_blueprint(path: &Path) -> anyhow::Result<Blueprint> {
    serde_json::from_value(read_json(path)?)
        .with_context(|| format!("{} is not a blueprint", path.display()))
}

async fn serve(
    bind: &str,
    database_url: Option<&str>,
    max_connections: u32,
    config: EngineConfig,
) -> anyhow::Result<()> {
    let (runs, blueprints): (Arc<dyn RunStore>, Arc<dyn BlueprintStore>) = match database_url {
        Some(url) => {
            let pool = db::pool::connect(url, max_connections)
                .await
                .context("failed to connect to database")?;
            let store = Arc::new(PgStore::new(pool));
            (store.clone() as Arc<dyn RunStore>, store as Arc<dyn BlueprintStore>)
        }
        None => {
            warn!("DATABASE_URL not set, runs and blueprints live in memory only");
            let store = Arc::new(MemoryStore::new());
            (store.clone() as Arc<dyn RunStore>, store as Arc<dyn BlueprintStore>)
        }
    };

    let engine = Arc::new(GraphEngine::new(runs, tool_registry(), config));
    let resumed = engine.resume_incomplete().await.context("failed to resume runs")?;
    if resumed > 0 {
        info!(resumed, "resumed unfinished runs");
    }

    info!("Starting API server on {bind}");
    api::serve(bind, api::AppState::new(engine, blueprints)).await?;
    Ok(())
}

async fn run(path: &Path, payload: Option<&Path>, config: EngineConfig) -> anyhow::Result<()> {
    let blueprint = read_blueprint(path)?;
    let trigger_data = match payload {
        Some(p) => read_json(p)?,
        None => serde_json::json!({}),
    };

    let store = Arc::new(MemoryStore::new());
    let engine = GraphEngine::new(store.clone(), tool_registry(), config);

    let run_id = engine.start(&blueprint, trigger_data).await?;
    let outcome = engine.run(run_id).await;

    let record = store.get_run(run_id).await?;
    println!("{}", serde_json::to_string_pretty(&record)?);

    outcome?;
    Ok(())
}
