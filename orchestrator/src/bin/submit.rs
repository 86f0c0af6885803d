use clap::{Parser, Subcommand};
use colored::Colorize;
use eyre::{Context, ContextCompat, Result};
use queue::{Config, Queue, TaskStatus};
use std::path::PathBuf;

/// Submits tasks to the task queue and inspects its contents.
#[derive(Parser)]
#[command(name = "submit", about = "Submit tasks to the task queue")]
struct Cli {
    /// Database path (uses config default if not specified)
    #[arg(long)]
    db: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Submit a single task
    Submit {
        prompt: String,
        #[arg(long = "dir")]
        working_dir: Option<String>,
        #[arg(long, num_args = 1.., value_name = "FILE")]
        context: Vec<String>,
        #[arg(long, num_args = 1.., value_name = "FILE")]
        outputs: Vec<String>,
        #[arg(long, default_value_t = 0)]
        priority: i64,
        #[arg(long)]
        metadata: Option<String>,
    },
    /// Submit tasks from a JSON file (single object or array of objects)
    SubmitFile { file: PathBuf },
    /// List tasks
    List {
        #[arg(long)]
        status: Option<String>,
    },
    /// Show queue statistics
    Stats,
    /// Show detailed task information
    Show { task_id: i64 },
}

#[derive(serde::Deserialize)]
struct FileTask {
    prompt: String,
    working_dir: Option<String>,
    #[serde(default)]
    context_files: Vec<String>,
    #[serde(default)]
    expected_outputs: Vec<String>,
    metadata: Option<serde_json::Value>,
    #[serde(default)]
    priority: i64,
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

    match cli.command {
        Command::Submit { prompt, working_dir, context, outputs, priority, metadata } => {
            let metadata = metadata.map(|m| serde_json::from_str(&m)).transpose().context("invalid metadata JSON")?;
            let task_id = queue
                .add_task(queue::NewTask {
                    prompt,
                    working_dir,
                    context_files: context,
                    expected_outputs: outputs,
                    metadata,
                    priority,
                    ..Default::default()
                })
                .await?;
            println!("Task {} submitted successfully", task_id);
        }
        Command::SubmitFile { file } => {
            let text = std::fs::read_to_string(&file).context("failed to read task file")?;
            let value: serde_json::Value = serde_json::from_str(&text).context("invalid JSON")?;
            let entries: Vec<FileTask> = match value {
                serde_json::Value::Array(_) => serde_json::from_value(value)?,
                serde_json::Value::Object(_) => vec![serde_json::from_value(value)?],
                _ => eyre::bail!("task file must contain a JSON object or array of objects"),
            };

            let mut count = 0;
            for entry in entries {
                let preview = preview(&entry.prompt, 50);
                let task_id = queue
                    .add_task(queue::NewTask {
                        prompt: entry.prompt,
                        working_dir: entry.working_dir,
                        context_files: entry.context_files,
                        expected_outputs: entry.expected_outputs,
                        metadata: entry.metadata,
                        priority: entry.priority,
                        ..Default::default()
                    })
                    .await?;
                println!("Task {} submitted: {}", task_id, preview);
                count += 1;
            }
            println!("\n{} tasks submitted successfully", count);
        }
        Command::List { status } => {
            let status = status.as_deref().and_then(TaskStatus::parse);
            let tasks = queue.list_tasks(status).await?;
            if tasks.is_empty() {
                println!("No tasks found");
                return Ok(());
            }

            println!("\n{:<6} {:<12} {:<8} {:<50} {:<10}", "ID", "Status", "Priority", "Prompt", "Worker");
            println!("{}", "-".repeat(100));
            for task in &tasks {
                println!(
                    "{:<6} {:<12} {:<8} {:<50} {:<10}",
                    task.id,
                    task.status,
                    task.priority,
                    preview(&task.prompt, 50),
                    task.worker_id.as_deref().unwrap_or("-"),
                );
            }
            println!("\nTotal: {} tasks", tasks.len());
        }
        Command::Stats => {
            let stats = queue.get_stats().await?;
            let workers = queue.list_workers().await?;
            let active = workers.iter().filter(|w| w.status == queue::WorkerStatus::Active).count();

            println!("\nQueue Statistics");
            println!("{}", "=".repeat(40));
            println!("Pending:      {}", stats.pending);
            println!("Claimed:      {}", stats.claimed);
            println!("In Progress:  {}", stats.in_progress);
            println!("Completed:    {}", stats.completed.to_string().green());
            println!("Failed:       {}", stats.failed.to_string().red());
            println!("Cancelled:    {}", stats.cancelled);
            println!("{}", "-".repeat(40));
            println!("Total:        {}", stats.total());
            println!();
            println!("Active Workers: {}", active);
            println!("Total Workers:  {}", workers.len());
        }
        Command::Show { task_id } => {
            let Some(task) = queue.get_task(task_id).await? else {
                println!("Task {} not found", task_id);
                return Ok(());
            };

            println!("\nTask {}", task_id);
            println!("{}", "=".repeat(60));
            println!("Status:        {}", task.status);
            println!("Priority:      {}", task.priority);
            println!("Worker:        {}", task.worker_id.as_deref().unwrap_or("-"));
            println!("Created:       {}", task.created_at);
            println!("Claimed:       {}", task.claimed_at.map(|t| t.to_string()).unwrap_or_else(|| "-".to_string()));
            println!("Started:       {}", task.started_at.map(|t| t.to_string()).unwrap_or_else(|| "-".to_string()));
            println!(
                "Completed:     {}",
                task.completed_at.map(|t| t.to_string()).unwrap_or_else(|| "-".to_string())
            );
            println!("Working Dir:   {}", task.working_dir.as_deref().unwrap_or("-"));
            println!();
            println!("Prompt:");
            println!("{}", "-".repeat(60));
            println!("{}", task.prompt);
            println!();

            if !task.context_files.is_empty() {
                println!("Context Files:");
                for f in &task.context_files {
                    println!("  - {}", f);
                }
                println!();
            }

            if !task.expected_outputs.is_empty() {
                println!("Expected Outputs:");
                for f in &task.expected_outputs {
                    println!("  - {}", f);
                }
                println!();
            }

            if let Some(result) = &task.result {
                println!("Result:");
                println!("{}", "-".repeat(60));
                println!("{}", serde_json::to_string_pretty(result)?);
                println!();
            }

            if let Some(error) = &task.error {
                println!("Error:");
                println!("{}", "-".repeat(60));
                println!("{}", error);
                println!();
            }
        }
    }

    Ok(())
}

fn preview(text: &str, max: usize) -> String {
    if text.chars().count() > max {
        format!("{}...", text.chars().take(max).collect::<String>())
    } else {
        text.to_string()
    }
}
