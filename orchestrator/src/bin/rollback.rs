use clap::Parser;
use colored::Colorize;
use eyre::{Context, ContextCompat, Result};
use queue::{ChangeOperation, Config, Queue};
use std::io::Write;
use std::path::PathBuf;

/// Rolls back the filesystem changes a task made, restoring pre-task state.
#[derive(Parser)]
#[command(name = "rollback", about = "Roll back file changes made by a task")]
struct Cli {
    /// Task ID to roll back
    task_id: i64,

    /// Database path (uses config default if not specified)
    #[arg(long)]
    db: Option<PathBuf>,

    /// Show what would be rolled back without doing it
    #[arg(long)]
    dry_run: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    let config = Config::load(None).context("failed to load configuration")?;
    let db_path = cli
        .db
        .clone()
        .or_else(|| config.database.path.clone().map(PathBuf::from))
        .context("no database path configured")?;
    let queue = Queue::open(&db_path).context("failed to open task database")?;

    let Some(task) = queue.get_task(cli.task_id).await? else {
        println!("{} Task {} not found", "x".red(), cli.task_id);
        std::process::exit(1);
    };

    println!("Task {}: {}", cli.task_id, preview(&task.prompt, 60));
    println!("Status: {}", task.status);
    println!();

    let changes = queue.get_task_changes(cli.task_id).await?;
    if changes.is_empty() {
        println!("No tracked changes found for task {}", cli.task_id);
        println!("This task did not track file changes during execution.");
        return Ok(());
    }

    println!("Found {} file changes:", changes.len());
    println!();
    for change in &changes {
        match change.operation {
            ChangeOperation::Create => println!("  DELETE: {}", change.file_path),
            ChangeOperation::Modify => println!("  RESTORE: {}", change.file_path),
            ChangeOperation::Delete => println!("  RECREATE: {}", change.file_path),
        }
    }
    println!();

    if cli.dry_run {
        println!("DRY RUN - No changes were made");
        return Ok(());
    }

    print!("Proceed with rollback? (y/N): ");
    std::io::stdout().flush().ok();
    let mut response = String::new();
    std::io::stdin().read_line(&mut response).ok();
    if !matches!(response.trim().to_lowercase().as_str(), "y" | "yes") {
        println!("Rollback cancelled");
        return Ok(());
    }

    println!();
    println!("Rolling back changes...");
    let result = queue.rollback_task(cli.task_id).await?;

    println!();
    if !result.files_restored.is_empty() {
        println!("{} Restored {} files:", "ok".green(), result.files_restored.len());
        for f in &result.files_restored {
            println!("   - {}", f);
        }
    }
    if !result.files_deleted.is_empty() {
        println!("Deleted {} files:", result.files_deleted.len());
        for f in &result.files_deleted {
            println!("   - {}", f);
        }
    }
    if !result.errors.is_empty() {
        println!("{} {} errors:", "warning:".yellow(), result.errors.len());
        for e in &result.errors {
            println!("   - {}", e);
        }
    }

    println!();
    if result.errors.is_empty() {
        println!("{}", "Rollback completed successfully".green());
        Ok(())
    } else {
        println!("{}", "Rollback completed with errors".yellow());
        std::process::exit(1);
    }
}

fn preview(text: &str, max: usize) -> String {
    if text.chars().count() > max {
        format!("{}...", text.chars().take(max).collect::<String>())
    } else {
        text.to_string()
    }
}
