use clap::Parser;
use eyre::{Context, ContextCompat, Result};
use queue::{Config, Queue};
use std::path::PathBuf;
use worker::Worker;

/// Runs a single task-queue worker, polling for and executing claimed tasks.
#[derive(Parser)]
#[command(name = "worker", about = "Execute tasks from the queue using an LLM CLI")]
struct Cli {
    /// Unique identifier for this worker
    worker_id: String,

    /// Explicit database path (overrides config)
    db_path: Option<PathBuf>,

    /// Log level (TRACE, DEBUG, INFO, WARN, ERROR)
    #[arg(short, long)]
    log_level: Option<String>,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::new(
            cli.log_level.clone().unwrap_or_else(|| "info".to_string()),
        ))
        .init();

    let config = Config::load(None).context("failed to load configuration")?;
    let db_path = cli
        .db_path
        .clone()
        .or_else(|| config.database.path.clone().map(PathBuf::from))
        .context("no database path configured")?;

    let queue = Queue::open(&db_path).context("failed to open task database")?;
    let worker = Worker::new(cli.worker_id, queue, config);
    worker.run(&db_path).await.context("worker run failed")?;
    Ok(())
}
