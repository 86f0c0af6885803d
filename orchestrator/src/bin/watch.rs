use chrono::Utc;
use clap::Parser;
use eyre::{Context, ContextCompat, Result};
use queue::{Config, Queue, TaskStatus, WorkerStatus};
use std::path::PathBuf;

/// Live or one-shot view of queue and worker progress.
#[derive(Parser)]
#[command(name = "watch", about = "Watch task queue progress in real time")]
struct Cli {
    /// Database path (uses config default if not specified)
    #[arg(long, alias = "db-path")]
    db: Option<PathBuf>,

    /// Show progress for a specific job only
    #[arg(long)]
    job: Option<String>,

    /// Refresh interval in seconds
    #[arg(long, default_value_t = 2.0)]
    interval: f64,

    /// Show status once and exit, without live updates
    #[arg(long)]
    once: bool,
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

    if cli.once {
        show_current(&queue, cli.job.as_deref()).await?;
        return Ok(());
    }

    println!("Task Queue Progress Monitor");
    println!("Press Ctrl+C to exit");
    println!();
    tokio::time::sleep(std::time::Duration::from_secs(1)).await;

    loop {
        clear_screen();
        show_current(&queue, cli.job.as_deref()).await?;
        println!("{}", "-".repeat(80));
        println!("Refreshing every {}s... (Ctrl+C to exit)", cli.interval);
        tokio::time::sleep(std::time::Duration::from_secs_f64(cli.interval)).await;
    }
}

fn clear_screen() {
    print!("\x1b[2J\x1b[H");
}

async fn show_current(queue: &Queue, job_id: Option<&str>) -> Result<()> {
    display_overall_stats(queue).await?;
    if let Some(job_id) = job_id {
        display_job_progress(queue, job_id).await?;
    } else {
        display_active_workers(queue).await?;
        display_recent_logs(queue).await?;
    }
    Ok(())
}

async fn display_overall_stats(queue: &Queue) -> Result<()> {
    let stats = queue.get_stats().await?;
    let total = stats.total();

    println!("{}", "=".repeat(80));
    println!("{:^80}", "Task Queue Progress Monitor");
    println!("{}", "=".repeat(80));
    println!();
    println!("{:^80}", "Overall Statistics");
    println!("{}", "-".repeat(80));

    if total > 0 {
        let completed_pct = stats.completed as f64 / total as f64 * 100.0;
        println!("  Total Tasks:       {}", total);
        println!("  Completed:         {:>4} ({:>5.1}%)", stats.completed, completed_pct);
        println!("  In Progress:       {:>4}", stats.in_progress);
        println!("  Pending:           {:>4}", stats.pending);
        println!("  Failed:            {:>4}", stats.failed);
    } else {
        println!("  No tasks in queue");
    }
    println!();
    Ok(())
}

async fn display_active_workers(queue: &Queue) -> Result<()> {
    let workers = queue.get_active_progress().await?;

    println!("{:^80}", "Active Workers");
    println!("{}", "-".repeat(80));

    if workers.is_empty() {
        println!("  No active workers");
    } else {
        for worker in &workers {
            let status_icon = if worker.status == WorkerStatus::Active { "*" } else { "o" };
            print!("  {} {:<15}", status_icon, worker.worker_id);

            if let Some(task_id) = worker.current_task_id {
                let task_preview = match queue.get_task(task_id).await? {
                    Some(task) => preview(&task.prompt, 40),
                    None => "N/A".to_string(),
                };
                println!("Task {}: {}", task_id, task_preview);

                let logs = queue.get_worker_logs(Some(&worker.worker_id), None, 1).await?;
                if let Some(log) = logs.first() {
                    println!("  {:>17} |- {}", "", preview(&log.message, 50));
                }
            } else {
                println!("Idle");
            }
        }
    }
    println!();
    Ok(())
}

async fn display_recent_logs(queue: &Queue) -> Result<()> {
    let logs = queue.get_worker_logs(None, None, 10).await?;

    println!("{:^80}", "Recent Activity");
    println!("{}", "-".repeat(80));

    if logs.is_empty() {
        println!("  No recent activity");
    } else {
        for log in &logs {
            let timestamp = format_timestamp(log.timestamp);
            let level_icon = match log.level {
                queue::LogLevel::Info => "i",
                queue::LogLevel::Warning => "!",
                queue::LogLevel::Error => "x",
            };
            let task_info = match log.task_id {
                Some(id) => format!("[Task {}]", id),
                None => "[General]".to_string(),
            };
            println!(
                "  {} {:>10} | {:<12} {:>12} | {}",
                level_icon,
                timestamp,
                log.worker_id,
                task_info,
                preview(&log.message, 60)
            );
        }
    }
    println!();
    Ok(())
}

async fn display_job_progress(queue: &Queue, job_id: &str) -> Result<()> {
    println!("{:^80}", "Job Progress");
    println!("{}", "-".repeat(80));

    let Some(job) = queue.get_job(job_id).await? else {
        println!("  Job {} not found", job_id);
        println!();
        return Ok(());
    };
    let stats = queue.get_job_stats(job_id).await?;

    println!("  Job ID:       {}", job.job_id);
    println!("  Description:  {}", job.description);
    println!("  Status:       {}", job.status);
    println!();

    let total = stats.total();
    if total > 0 {
        let completed_pct = stats.completed as f64 / total as f64 * 100.0;
        println!("  Progress: [{}/{}] ({:.1}%)", stats.completed, total, completed_pct);
        let filled = (completed_pct / 2.0) as usize;
        println!("  {}{}", "#".repeat(filled), "-".repeat(50usize.saturating_sub(filled)));
        println!();
    }

    let tasks = queue.get_job_tasks(job_id).await?;
    let active: Vec<_> = tasks.iter().filter(|t| matches!(t.status, TaskStatus::Claimed | TaskStatus::InProgress)).collect();
    if !active.is_empty() {
        println!("  Active Tasks:");
        for task in &active {
            println!(
                "    - Task {} ({}): {}",
                task.id,
                task.worker_id.as_deref().unwrap_or("-"),
                preview(&task.prompt, 50)
            );
        }
        println!();
    }

    Ok(())
}

fn format_timestamp(timestamp: chrono::DateTime<Utc>) -> String {
    let seconds = (Utc::now() - timestamp).num_seconds().max(0);
    if seconds < 60 {
        format!("{}s ago", seconds)
    } else if seconds < 3600 {
        format!("{}m ago", seconds / 60)
    } else {
        format!("{}h ago", seconds / 3600)
    }
}

fn preview(text: &str, max: usize) -> String {
    if text.chars().count() > max {
        format!("{}...", text.chars().take(max).collect::<String>())
    } else {
        text.to_string()
    }
}
