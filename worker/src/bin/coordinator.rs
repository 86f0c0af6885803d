use clap::Parser;
use eyre::{Context, ContextCompat, Result};
use queue::{Config, Queue};
use std::path::PathBuf;
use worker::Coordinator;

/// Spawns and supervises a fleet of workers against a shared task database.
#[derive(Parser)]
#[command(name = "coordinator", about = "Spawn and monitor parallel task workers")]
struct Cli {
    /// Number of workers to spawn (overrides WORKERS)
    workers: Option<usize>,

    /// Path to the task database (overrides DB_PATH)
    db_path: Option<PathBuf>,

    /// Number of workers to spawn (alternative to the positional argument)
    #[arg(short = 'w', long = "workers")]
    workers_flag: Option<usize>,

    /// Path to the task database (alternative to the positional argument)
    #[arg(long = "db", alias = "db-path")]
    db_path_flag: Option<PathBuf>,

    /// Seconds of inactivity before auto-shutdown (0 disables)
    #[arg(long, default_value_t = 300)]
    idle_timeout: u64,

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

    // Precedence: --workers/--db flag > positional argument > env var > config default.
    let num_workers = cli
        .workers_flag
        .or(cli.workers)
        .or_else(|| std::env::var("WORKERS").ok().and_then(|v| v.parse().ok()))
        .unwrap_or(config.workers.default_count as usize);
    let db_path = cli
        .db_path_flag
        .clone()
        .or_else(|| cli.db_path.clone())
        .or_else(|| std::env::var("DB_PATH").ok().map(PathBuf::from))
        .or_else(|| config.database.path.clone().map(PathBuf::from))
        .context("no database path configured")?;

    let queue = Queue::open(&db_path).context("failed to open task database")?;

    let current_exe = std::env::current_exe().context("failed to resolve current executable path")?;
    let worker_bin = current_exe
        .parent()
        .map(|dir| dir.join("worker"))
        .context("failed to resolve worker binary path")?;

    let coordinator = Coordinator::new(num_workers, db_path, worker_bin, cli.idle_timeout);
    coordinator
        .run(queue, config.workers.stale_timeout as i64)
        .await
        .context("coordinator run failed")?;
    Ok(())
}
