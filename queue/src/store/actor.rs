//! The actor that owns the single `rusqlite::Connection` and serializes all access to it.

use crate::error::QueueResult;
use crate::types::*;
use rusqlite::Connection;
use std::collections::HashMap;
use std::path::Path;
use tokio::sync::{mpsc, oneshot};
use tracing::{debug, info};

type Reply<T> = oneshot::Sender<QueueResult<T>>;

pub enum StoreCommand {
    AddTask { new: NewTask, reply: Reply<i64> },
    AddTaskDependency { task: i64, depends_on: i64, reply: Reply<()> },
    ClaimTask { worker_id: String, reply: Reply<Option<Task>> },
    StartTask { task_id: i64, worker_id: String, reply: Reply<()> },
    CompleteTask { task_id: i64, worker_id: String, result: Option<TaskResult>, reply: Reply<()> },
    FailTask { task_id: i64, worker_id: String, error: String, auto_retry: bool, reply: Reply<()> },
    RetryTask { task_id: i64, include_error_context: bool, reply: Reply<Option<i64>> },
    PauseTask { task_id: i64, worker_id: String, checkpoint: Option<Checkpoint>, reply: Reply<()> },
    CleanupStaleTasks { timeout_secs: i64, reply: Reply<usize> },
    RegisterWorker { worker_id: String, reply: Reply<()> },
    UpdateWorkerHeartbeat {
        worker_id: String,
        status: WorkerStatus,
        current_task_id: Option<i64>,
        reply: Reply<()>,
    },
    SaveCheckpoint { checkpoint: Checkpoint, reply: Reply<()> },
    GetCheckpoint { task_id: i64, reply: Reply<Option<Checkpoint>> },
    DeleteCheckpoint { task_id: i64, reply: Reply<()> },
    TrackFileChange {
        task_id: i64,
        operation: ChangeOperation,
        file_path: String,
        before_content: Option<String>,
        after_content: Option<String>,
        reply: Reply<i64>,
    },
    GetTaskChanges { task_id: i64, reply: Reply<Vec<TaskChange>> },
    RollbackTask { task_id: i64, reply: Reply<RollbackResult> },
    SetSharedContext { job_id: Option<String>, key: String, value: String, reply: Reply<()> },
    GetSharedContext { job_id: Option<String>, reply: Reply<HashMap<String, String>> },
    DeleteSharedContext { job_id: Option<String>, key: String, reply: Reply<()> },
    LogWorkerProgress {
        worker_id: String,
        task_id: Option<i64>,
        message: String,
        level: LogLevel,
        reply: Reply<i64>,
    },
    GetWorkerLogs {
        worker_id: Option<String>,
        task_id: Option<i64>,
        limit: i64,
        reply: Reply<Vec<WorkerLog>>,
    },
    GetActiveProgress { reply: Reply<Vec<Worker>> },
    GetStats { reply: Reply<JobStats> },
    GetJobStats { job_id: String, reply: Reply<JobStats> },
    ListTasks { status: Option<TaskStatus>, reply: Reply<Vec<Task>> },
    ListWorkers { reply: Reply<Vec<Worker>> },
    GetTask { task_id: i64, reply: Reply<Option<Task>> },
    CreateJob {
        job_id: String,
        description: String,
        orchestrator_id: String,
        metadata: Option<serde_json::Value>,
        reply: Reply<()>,
    },
    GetJob { job_id: String, reply: Reply<Option<Job>> },
    GetJobTasks { job_id: String, reply: Reply<Vec<Task>> },
    CompleteJob { job_id: String, reply: Reply<()> },
    GetChildTasks { parent_task_id: i64, reply: Reply<Vec<Task>> },
    GetPausedTasks { reply: Reply<Vec<Task>> },
    GetFailedRetryableTasks { reply: Reply<Vec<Task>> },
    RetryAllFailedTasks { reply: Reply<Vec<i64>> },
    Shutdown,
}

/// Spawn the actor task owning the store connection; returns a cheap, `Clone`-able sender.
pub fn spawn(path: impl AsRef<Path>) -> QueueResult<mpsc::Sender<StoreCommand>> {
    let conn = super::open(path.as_ref())?;
    let (tx, rx) = mpsc::channel(256);
    tokio::spawn(actor_loop(conn, rx));
    info!(path = %path.as_ref().display(), "queue store actor spawned");
    Ok(tx)
}

async fn actor_loop(conn: Connection, mut rx: mpsc::Receiver<StoreCommand>) {
    use super::*;
    use StoreCommand::*;

    while let Some(cmd) = rx.recv().await {
        match cmd {
            AddTask { new, reply } => {
                let _ = reply.send(add_task(&conn, new));
            }
            AddTaskDependency { task, depends_on, reply } => {
                let _ = reply.send(add_task_dependency(&conn, task, depends_on));
            }
            ClaimTask { worker_id, reply } => {
                debug!(%worker_id, "actor: ClaimTask");
                let _ = reply.send(claim_task(&conn, &worker_id));
            }
            StartTask { task_id, worker_id, reply } => {
                let _ = reply.send(start_task(&conn, task_id, &worker_id));
            }
            CompleteTask { task_id, worker_id, result, reply } => {
                let _ = reply.send(complete_task(&conn, task_id, &worker_id, result));
            }
            FailTask { task_id, worker_id, error, auto_retry, reply } => {
                let _ = reply.send(fail_task(&conn, task_id, &worker_id, &error, auto_retry));
            }
            RetryTask { task_id, include_error_context, reply } => {
                let _ = reply.send(retry_task(&conn, task_id, include_error_context));
            }
            PauseTask { task_id, worker_id, checkpoint, reply } => {
                let _ = reply.send(pause_task(&conn, task_id, &worker_id, checkpoint));
            }
            CleanupStaleTasks { timeout_secs, reply } => {
                let _ = reply.send(cleanup_stale_tasks(&conn, timeout_secs));
            }
            RegisterWorker { worker_id, reply } => {
                let _ = reply.send(register_worker(&conn, &worker_id));
            }
            UpdateWorkerHeartbeat { worker_id, status, current_task_id, reply } => {
                let _ = reply.send(update_worker_heartbeat(&conn, &worker_id, status, current_task_id));
            }
            SaveCheckpoint { checkpoint, reply } => {
                let _ = reply.send(save_checkpoint(&conn, checkpoint));
            }
            GetCheckpoint { task_id, reply } => {
                let _ = reply.send(get_checkpoint(&conn, task_id));
            }
            DeleteCheckpoint { task_id, reply } => {
                let _ = reply.send(delete_checkpoint(&conn, task_id));
            }
            TrackFileChange { task_id, operation, file_path, before_content, after_content, reply } => {
                let _ = reply.send(track_file_change(
                    &conn,
                    task_id,
                    operation,
                    &file_path,
                    before_content,
                    after_content,
                ));
            }
            GetTaskChanges { task_id, reply } => {
                let _ = reply.send(get_task_changes(&conn, task_id));
            }
            RollbackTask { task_id, reply } => {
                let _ = reply.send(rollback_task(&conn, task_id));
            }
            SetSharedContext { job_id, key, value, reply } => {
                let _ = reply.send(set_shared_context(&conn, job_id.as_deref(), &key, &value));
            }
            GetSharedContext { job_id, reply } => {
                let _ = reply.send(get_shared_context(&conn, job_id.as_deref()));
            }
            DeleteSharedContext { job_id, key, reply } => {
                let _ = reply.send(delete_shared_context(&conn, job_id.as_deref(), &key));
            }
            LogWorkerProgress { worker_id, task_id, message, level, reply } => {
                let _ = reply.send(log_worker_progress(&conn, &worker_id, task_id, &message, level));
            }
            GetWorkerLogs { worker_id, task_id, limit, reply } => {
                let _ = reply.send(get_worker_logs(&conn, worker_id.as_deref(), task_id, limit));
            }
            GetActiveProgress { reply } => {
                let _ = reply.send(get_active_progress(&conn));
            }
            GetStats { reply } => {
                let _ = reply.send(get_stats(&conn));
            }
            GetJobStats { job_id, reply } => {
                let _ = reply.send(get_job_stats(&conn, &job_id));
            }
            ListTasks { status, reply } => {
                let _ = reply.send(list_tasks(&conn, status));
            }
            ListWorkers { reply } => {
                let _ = reply.send(list_workers(&conn));
            }
            GetTask { task_id, reply } => {
                let _ = reply.send(get_task(&conn, task_id));
            }
            CreateJob { job_id, description, orchestrator_id, metadata, reply } => {
                let _ = reply.send(create_job(&conn, &job_id, &description, &orchestrator_id, metadata));
            }
            GetJob { job_id, reply } => {
                let _ = reply.send(get_job(&conn, &job_id));
            }
            GetJobTasks { job_id, reply } => {
                let _ = reply.send(get_job_tasks(&conn, &job_id));
            }
            CompleteJob { job_id, reply } => {
                let _ = reply.send(complete_job(&conn, &job_id));
            }
            GetChildTasks { parent_task_id, reply } => {
                let _ = reply.send(get_child_tasks(&conn, parent_task_id));
            }
            GetPausedTasks { reply } => {
                let _ = reply.send(get_paused_tasks(&conn));
            }
            GetFailedRetryableTasks { reply } => {
                let _ = reply.send(get_failed_retryable_tasks(&conn));
            }
            RetryAllFailedTasks { reply } => {
                let _ = reply.send(retry_all_failed_tasks(&conn));
            }
            Shutdown => {
                info!("queue store actor shutting down");
                break;
            }
        }
    }
    debug!("queue store actor stopped");
}
