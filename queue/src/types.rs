//! Entity types shared by every Queue operation.

use chrono::{DateTime, Utc};
use rusqlite::types::{FromSql, FromSqlError, FromSqlResult, ToSql, ToSqlOutput, ValueRef};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

macro_rules! string_enum {
    ($name:ident { $($variant:ident => $repr:literal),+ $(,)? }) => {
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
        #[serde(rename_all = "snake_case")]
        pub enum $name {
            $($variant),+
        }

        impl $name {
            pub fn as_str(&self) -> &'static str {
                match self {
                    $(Self::$variant => $repr),+
                }
            }

            pub fn parse(s: &str) -> Option<Self> {
                match s {
                    $($repr => Some(Self::$variant)),+,
                    _ => None,
                }
            }
        }

        impl std::fmt::Display for $name {
            fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
                write!(f, "{}", self.as_str())
            }
        }

        impl ToSql for $name {
            fn to_sql(&self) -> rusqlite::Result<ToSqlOutput<'_>> {
                Ok(ToSqlOutput::from(self.as_str()))
            }
        }

        impl FromSql for $name {
            fn column_result(value: ValueRef<'_>) -> FromSqlResult<Self> {
                let s = value.as_str()?;
                Self::parse(s).ok_or_else(|| FromSqlError::Other(format!("invalid {}: {}", stringify!($name), s).into()))
            }
        }
    };
}

string_enum!(TaskStatus {
    Pending => "pending",
    Claimed => "claimed",
    InProgress => "in_progress",
    Completed => "completed",
    Failed => "failed",
    Cancelled => "cancelled",
    Paused => "paused",
    Resuming => "resuming",
});

impl TaskStatus {
    /// True for statuses a stale-sweep or claim can still act on.
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Completed | Self::Cancelled)
    }
}

string_enum!(WorkerStatus {
    Idle => "idle",
    Active => "active",
});

string_enum!(JobStatus {
    Active => "active",
    Completed => "completed",
});

string_enum!(ChangeOperation {
    Create => "create",
    Modify => "modify",
    Delete => "delete",
});

string_enum!(LogLevel {
    Info => "info",
    Warning => "warning",
    Error => "error",
});

/// Per-hook verification outcome, embedded in a completed task's result.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HookResult {
    pub hook_description: String,
    pub passed: bool,
    pub return_code: i32,
    pub error_message: Option<String>,
    pub stdout_preview: Option<String>,
    pub stderr_preview: Option<String>,
}

/// Structured result persisted on successful or failed task completion.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct TaskResult {
    pub stdout: String,
    pub stderr: String,
    pub exit_code: i32,
    pub working_dir: Option<String>,
    pub expected_files_present: HashMap<String, bool>,
    pub verification_results: Vec<HookResult>,
}

/// A unit of work claimed and executed by exactly one worker at a time.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Task {
    pub id: i64,
    pub prompt: String,
    pub working_dir: Option<String>,
    pub context_files: Vec<String>,
    pub expected_outputs: Vec<String>,
    pub metadata: Option<serde_json::Value>,
    pub priority: i64,
    pub status: TaskStatus,
    pub worker_id: Option<String>,
    pub job_id: Option<String>,
    pub parent_task_id: Option<i64>,
    pub created_at: DateTime<Utc>,
    pub claimed_at: Option<DateTime<Utc>>,
    pub started_at: Option<DateTime<Utc>>,
    pub completed_at: Option<DateTime<Utc>>,
    pub result: Option<TaskResult>,
    pub error: Option<String>,
    pub last_error: Option<String>,
    pub retry_count: i64,
    pub max_retries: i64,
    pub retry_policy: Option<serde_json::Value>,
}

/// Fields accepted by `Queue::add_task`.
#[derive(Debug, Clone, Default)]
pub struct NewTask {
    pub prompt: String,
    pub working_dir: Option<String>,
    pub context_files: Vec<String>,
    pub expected_outputs: Vec<String>,
    pub metadata: Option<serde_json::Value>,
    pub priority: i64,
    pub job_id: Option<String>,
    pub parent_task_id: Option<i64>,
    pub max_retries: i64,
    pub retry_policy: Option<serde_json::Value>,
}

/// A long-lived execution agent polling the queue.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Worker {
    pub worker_id: String,
    pub status: WorkerStatus,
    pub current_task_id: Option<i64>,
    pub started_at: DateTime<Utc>,
    pub last_heartbeat: DateTime<Utc>,
    pub stats: Option<serde_json::Value>,
}

/// A named group of tasks created by one orchestrator run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Job {
    pub job_id: String,
    pub description: String,
    pub orchestrator_id: String,
    pub status: JobStatus,
    pub created_at: DateTime<Utc>,
    pub completed_at: Option<DateTime<Utc>>,
    pub metadata: Option<serde_json::Value>,
}

/// Aggregated per-status task counts for a job.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct JobStats {
    pub pending: i64,
    pub claimed: i64,
    pub in_progress: i64,
    pub completed: i64,
    pub failed: i64,
    pub cancelled: i64,
    pub paused: i64,
    pub resuming: i64,
}

impl JobStats {
    pub fn total(&self) -> i64 {
        self.pending
            + self.claimed
            + self.in_progress
            + self.completed
            + self.failed
            + self.cancelled
            + self.paused
            + self.resuming
    }
}

/// Resumable mid-task progress, written on pause and read on resume.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Checkpoint {
    pub task_id: i64,
    pub checkpoint_data: serde_json::Value,
    pub files_created: Vec<String>,
    pub files_modified: Vec<String>,
    pub last_step: Option<String>,
    pub completion_percentage: i64,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// One journaled filesystem side effect, sufficient to invert via rollback.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TaskChange {
    pub change_id: i64,
    pub task_id: i64,
    pub operation: ChangeOperation,
    pub file_path: String,
    pub before_content: Option<String>,
    pub after_content: Option<String>,
    pub timestamp: DateTime<Utc>,
}

/// Outcome of replaying a task's journaled changes in reverse.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RollbackResult {
    pub files_restored: Vec<String>,
    pub files_deleted: Vec<String>,
    pub errors: Vec<String>,
}

/// Append-only progress entry written by a worker.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WorkerLog {
    pub log_id: i64,
    pub worker_id: String,
    pub task_id: Option<i64>,
    pub timestamp: DateTime<Utc>,
    pub message: String,
    pub level: LogLevel,
}
