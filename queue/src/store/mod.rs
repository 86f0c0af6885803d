//! Synchronous store operations over a single `rusqlite::Connection`.
//!
//! Every function here runs on the actor task ([`crate::store::actor`]) and is the only
//! code in the crate that touches SQL directly.

pub mod actor;

use crate::error::{QueueError, QueueResult};
use crate::types::*;
use chrono::Utc;
use rusqlite::{params, Connection, OptionalExtension, Row};
use std::collections::HashMap;
use std::path::Path;

pub fn open(path: &Path) -> QueueResult<Connection> {
    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() {
            std::fs::create_dir_all(parent)?;
        }
    }
    let conn = Connection::open(path)?;
    conn.execute_batch(crate::schema::PRAGMAS)?;
    conn.execute_batch(crate::schema::SCHEMA)?;
    Ok(conn)
}

fn to_json(value: &Option<serde_json::Value>) -> QueueResult<Option<String>> {
    Ok(match value {
        Some(v) => Some(serde_json::to_string(v)?),
        None => None,
    })
}

fn from_json_opt(text: Option<String>) -> QueueResult<Option<serde_json::Value>> {
    Ok(match text {
        Some(t) => Some(serde_json::from_str(&t)?),
        None => None,
    })
}

fn string_list_to_json(items: &[String]) -> String {
    serde_json::to_string(items).unwrap_or_else(|_| "[]".to_string())
}

fn json_to_string_list(text: &str) -> Vec<String> {
    serde_json::from_str(text).unwrap_or_default()
}

fn parse_timestamp(text: &str) -> chrono::DateTime<Utc> {
    chrono::DateTime::parse_from_rfc3339(text)
        .map(|dt| dt.with_timezone(&Utc))
        .unwrap_or_else(|_| Utc::now())
}

fn row_to_task(row: &Row) -> rusqlite::Result<Task> {
    let status: TaskStatus = row.get("status")?;
    let metadata: Option<String> = row.get("metadata")?;
    let result: Option<String> = row.get("result")?;
    let retry_policy: Option<String> = row.get("retry_policy")?;
    let created_at: String = row.get("created_at")?;
    let claimed_at: Option<String> = row.get("claimed_at")?;
    let started_at: Option<String> = row.get("started_at")?;
    let completed_at: Option<String> = row.get("completed_at")?;
    let context_files: String = row.get("context_files")?;
    let expected_outputs: String = row.get("expected_outputs")?;

    Ok(Task {
        id: row.get("id")?,
        prompt: row.get("prompt")?,
        working_dir: row.get("working_dir")?,
        context_files: json_to_string_list(&context_files),
        expected_outputs: json_to_string_list(&expected_outputs),
        metadata: metadata.and_then(|m| serde_json::from_str(&m).ok()),
        priority: row.get("priority")?,
        status,
        worker_id: row.get("worker_id")?,
        job_id: row.get("job_id")?,
        parent_task_id: row.get("parent_task_id")?,
        created_at: parse_timestamp(&created_at),
        claimed_at: claimed_at.as_deref().map(parse_timestamp),
        started_at: started_at.as_deref().map(parse_timestamp),
        completed_at: completed_at.as_deref().map(parse_timestamp),
        result: result.and_then(|r| serde_json::from_str(&r).ok()),
        error: row.get("error")?,
        last_error: row.get("last_error")?,
        retry_count: row.get("retry_count")?,
        max_retries: row.get("max_retries")?,
        retry_policy: retry_policy.and_then(|p| serde_json::from_str(&p).ok()),
    })
}

fn row_to_worker(row: &Row) -> rusqlite::Result<Worker> {
    let started_at: String = row.get("started_at")?;
    let last_heartbeat: String = row.get("last_heartbeat")?;
    let stats: Option<String> = row.get("stats")?;
    Ok(Worker {
        worker_id: row.get("worker_id")?,
        status: row.get("status")?,
        current_task_id: row.get("current_task_id")?,
        started_at: parse_timestamp(&started_at),
        last_heartbeat: parse_timestamp(&last_heartbeat),
        stats: stats.and_then(|s| serde_json::from_str(&s).ok()),
    })
}

fn row_to_job(row: &Row) -> rusqlite::Result<Job> {
    let created_at: String = row.get("created_at")?;
    let completed_at: Option<String> = row.get("completed_at")?;
    let metadata: Option<String> = row.get("metadata")?;
    Ok(Job {
        job_id: row.get("job_id")?,
        description: row.get("description")?,
        orchestrator_id: row.get("orchestrator_id")?,
        status: row.get("status")?,
        created_at: parse_timestamp(&created_at),
        completed_at: completed_at.as_deref().map(parse_timestamp),
        metadata: metadata.and_then(|m| serde_json::from_str(&m).ok()),
    })
}

fn row_to_worker_log(row: &Row) -> rusqlite::Result<WorkerLog> {
    let timestamp: String = row.get("timestamp")?;
    Ok(WorkerLog {
        log_id: row.get("log_id")?,
        worker_id: row.get("worker_id")?,
        task_id: row.get("task_id")?,
        timestamp: parse_timestamp(&timestamp),
        message: row.get("message")?,
        level: row.get("level")?,
    })
}

pub fn add_task(conn: &Connection, new: NewTask) -> QueueResult<i64> {
    if new.prompt.trim().is_empty() {
        return Err(QueueError::EmptyPrompt);
    }
    let now = Utc::now().to_rfc3339();
    conn.execute(
        "INSERT INTO tasks (prompt, working_dir, context_files, expected_outputs, metadata,
            priority, status, job_id, parent_task_id, created_at, retry_count, max_retries, retry_policy)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, 'pending', ?7, ?8, ?9, 0, ?10, ?11)",
        params![
            new.prompt,
            new.working_dir,
            string_list_to_json(&new.context_files),
            string_list_to_json(&new.expected_outputs),
            to_json(&new.metadata)?,
            new.priority,
            new.job_id,
            new.parent_task_id,
            now,
            new.max_retries,
            to_json(&new.retry_policy)?,
        ],
    )?;
    Ok(conn.last_insert_rowid())
}

fn depends_transitively_on(conn: &Connection, from: i64, to: i64) -> QueueResult<bool> {
    let mut stack = vec![from];
    let mut seen = std::collections::HashSet::new();
    while let Some(current) = stack.pop() {
        if current == to {
            return Ok(true);
        }
        if !seen.insert(current) {
            continue;
        }
        let mut stmt =
            conn.prepare_cached("SELECT depends_on_task_id FROM task_dependencies WHERE task_id = ?1")?;
        let deps = stmt.query_map(params![current], |row| row.get::<_, i64>(0))?;
        for dep in deps {
            stack.push(dep?);
        }
    }
    Ok(false)
}

pub fn add_task_dependency(conn: &Connection, task: i64, depends_on: i64) -> QueueResult<()> {
    if task == depends_on || depends_transitively_on(conn, depends_on, task)? {
        return Err(QueueError::DependencyCycle {
            task,
            depends_on,
        });
    }
    conn.execute(
        "INSERT OR IGNORE INTO task_dependencies (task_id, depends_on_task_id) VALUES (?1, ?2)",
        params![task, depends_on],
    )?;
    Ok(())
}

fn dependencies_met(conn: &Connection, task_id: i64) -> QueueResult<bool> {
    let mut stmt = conn.prepare_cached(
        "SELECT t.status FROM task_dependencies d
         JOIN tasks t ON t.id = d.depends_on_task_id
         WHERE d.task_id = ?1",
    )?;
    let mut rows = stmt.query(params![task_id])?;
    while let Some(row) = rows.next()? {
        let status: TaskStatus = row.get(0)?;
        if !status.is_terminal() {
            return Ok(false);
        }
    }
    Ok(true)
}

pub fn claim_task(conn: &Connection, worker_id: &str) -> QueueResult<Option<Task>> {
    conn.execute_batch("BEGIN EXCLUSIVE")?;
    let outcome = (|| -> QueueResult<Option<Task>> {
        let mut stmt = conn.prepare(
            "SELECT * FROM tasks WHERE status IN ('pending', 'paused')
             ORDER BY CASE status WHEN 'pending' THEN 0 WHEN 'paused' THEN 1 END,
                      priority DESC, created_at ASC
             LIMIT 10",
        )?;
        let candidates: Vec<Task> = stmt
            .query_map([], row_to_task)?
            .collect::<Result<_, _>>()?;

        for candidate in candidates {
            if dependencies_met(conn, candidate.id)? {
                let new_status = if candidate.status == TaskStatus::Pending {
                    TaskStatus::Claimed
                } else {
                    TaskStatus::Resuming
                };
                let now = Utc::now().to_rfc3339();
                conn.execute(
                    "UPDATE tasks SET worker_id = ?1, claimed_at = ?2, status = ?3 WHERE id = ?4",
                    params![worker_id, now, new_status, candidate.id],
                )?;
                let claimed = get_task(conn, candidate.id)?.expect("just updated");
                return Ok(Some(claimed));
            }
        }
        Ok(None)
    })();

    match &outcome {
        Ok(_) => conn.execute_batch("COMMIT")?,
        Err(_) => {
            let _ = conn.execute_batch("ROLLBACK");
        }
    }
    outcome
}

pub fn start_task(conn: &Connection, task_id: i64, worker_id: &str) -> QueueResult<()> {
    let now = Utc::now().to_rfc3339();
    let changed = conn.execute(
        "UPDATE tasks SET status = 'in_progress', started_at = ?1
         WHERE id = ?2 AND worker_id = ?3 AND status IN ('claimed', 'resuming')",
        params![now, task_id, worker_id],
    )?;
    if changed == 0 {
        return Err(QueueError::InvalidTransition(task_id, "in_progress"));
    }
    Ok(())
}

pub fn complete_task(
    conn: &Connection,
    task_id: i64,
    worker_id: &str,
    result: Option<TaskResult>,
) -> QueueResult<()> {
    let now = Utc::now().to_rfc3339();
    let result_json = result
        .map(|r| serde_json::to_string(&r))
        .transpose()?;
    let changed = conn.execute(
        "UPDATE tasks SET status = 'completed', completed_at = ?1, result = ?2, error = NULL
         WHERE id = ?3 AND worker_id = ?4",
        params![now, result_json, task_id, worker_id],
    )?;
    if changed == 0 {
        return Err(QueueError::InvalidTransition(task_id, "completed"));
    }
    conn.execute("DELETE FROM checkpoints WHERE task_id = ?1", params![task_id])?;
    Ok(())
}

pub fn fail_task(
    conn: &Connection,
    task_id: i64,
    worker_id: &str,
    error: &str,
    auto_retry: bool,
) -> QueueResult<()> {
    let now = Utc::now().to_rfc3339();
    let changed = conn.execute(
        "UPDATE tasks SET status = 'failed', completed_at = ?1, error = ?2, last_error = ?2
         WHERE id = ?3 AND worker_id = ?4",
        params![now, error, task_id, worker_id],
    )?;
    if changed == 0 {
        return Err(QueueError::InvalidTransition(task_id, "failed"));
    }
    if auto_retry {
        let task = get_task(conn, task_id)?.expect("just updated");
        if task.retry_count < task.max_retries {
            retry_task(conn, task_id, true)?;
        }
    }
    Ok(())
}

pub fn retry_task(conn: &Connection, task_id: i64, include_error_context: bool) -> QueueResult<Option<i64>> {
    let task = match get_task(conn, task_id)? {
        Some(t) => t,
        None => return Err(QueueError::TaskNotFound(task_id)),
    };
    if task.retry_count >= task.max_retries {
        return Ok(None);
    }

    let prompt = if include_error_context {
        if let Some(last_error) = &task.last_error {
            format!(
                "Previous attempt failed with error:\n{}\n\nPlease fix the issue and complete the task:\n{}",
                last_error, task.prompt
            )
        } else {
            task.prompt.clone()
        }
    } else {
        task.prompt.clone()
    };

    conn.execute(
        "UPDATE tasks SET status = 'pending', worker_id = NULL, claimed_at = NULL,
            started_at = NULL, completed_at = NULL, error = NULL, prompt = ?1, retry_count = retry_count + 1
         WHERE id = ?2",
        params![prompt, task_id],
    )?;
    Ok(Some(task_id))
}

pub fn pause_task(
    conn: &Connection,
    task_id: i64,
    worker_id: &str,
    checkpoint: Option<Checkpoint>,
) -> QueueResult<()> {
    let changed = conn.execute(
        "UPDATE tasks SET status = 'paused' WHERE id = ?1 AND worker_id = ?2",
        params![task_id, worker_id],
    )?;
    if changed == 0 {
        return Err(QueueError::InvalidTransition(task_id, "paused"));
    }
    if let Some(checkpoint) = checkpoint {
        save_checkpoint(conn, checkpoint)?;
    }
    Ok(())
}

pub fn cleanup_stale_tasks(conn: &Connection, timeout_secs: i64) -> QueueResult<usize> {
    let now = Utc::now();
    let mut stmt = conn.prepare("SELECT worker_id, last_heartbeat FROM workers")?;
    let stale_workers: Vec<String> = stmt
        .query_map([], |row| {
            let worker_id: String = row.get(0)?;
            let last_heartbeat: String = row.get(1)?;
            Ok((worker_id, last_heartbeat))
        })?
        .filter_map(|r| r.ok())
        .filter(|(_, last_heartbeat)| {
            let age = now - parse_timestamp(last_heartbeat);
            age.num_seconds() > timeout_secs
        })
        .map(|(worker_id, _)| worker_id)
        .collect();

    let mut reclaimed = 0;
    for worker_id in stale_workers {
        reclaimed += conn.execute(
            "UPDATE tasks SET status = 'pending', worker_id = NULL, claimed_at = NULL
             WHERE worker_id = ?1 AND status IN ('claimed', 'in_progress')",
            params![worker_id],
        )?;
    }
    Ok(reclaimed)
}

pub fn register_worker(conn: &Connection, worker_id: &str) -> QueueResult<()> {
    let now = Utc::now().to_rfc3339();
    conn.execute(
        "INSERT OR REPLACE INTO workers (worker_id, status, current_task_id, started_at, last_heartbeat, stats)
         VALUES (?1, 'idle', NULL, ?2, ?2,
            COALESCE((SELECT stats FROM workers WHERE worker_id = ?1), NULL))",
        params![worker_id, now],
    )?;
    Ok(())
}

pub fn update_worker_heartbeat(
    conn: &Connection,
    worker_id: &str,
    status: WorkerStatus,
    current_task_id: Option<i64>,
) -> QueueResult<()> {
    let now = Utc::now().to_rfc3339();
    conn.execute(
        "UPDATE workers SET status = ?1, current_task_id = ?2, last_heartbeat = ?3 WHERE worker_id = ?4",
        params![status, current_task_id, now, worker_id],
    )?;
    Ok(())
}

pub fn save_checkpoint(conn: &Connection, checkpoint: Checkpoint) -> QueueResult<()> {
    let now = Utc::now().to_rfc3339();
    conn.execute(
        "INSERT INTO checkpoints (task_id, checkpoint_data, files_created, files_modified, last_step,
            completion_percentage, created_at, updated_at)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6,
            COALESCE((SELECT created_at FROM checkpoints WHERE task_id = ?1), ?7), ?7)
         ON CONFLICT(task_id) DO UPDATE SET
            checkpoint_data = excluded.checkpoint_data,
            files_created = excluded.files_created,
            files_modified = excluded.files_modified,
            last_step = excluded.last_step,
            completion_percentage = excluded.completion_percentage,
            updated_at = excluded.updated_at",
        params![
            checkpoint.task_id,
            serde_json::to_string(&checkpoint.checkpoint_data)?,
            string_list_to_json(&checkpoint.files_created),
            string_list_to_json(&checkpoint.files_modified),
            checkpoint.last_step,
            checkpoint.completion_percentage,
            now,
        ],
    )?;
    Ok(())
}

pub fn get_checkpoint(conn: &Connection, task_id: i64) -> QueueResult<Option<Checkpoint>> {
    conn.query_row("SELECT * FROM checkpoints WHERE task_id = ?1", params![task_id], |row| {
        let checkpoint_data: String = row.get("checkpoint_data")?;
        let files_created: String = row.get("files_created")?;
        let files_modified: String = row.get("files_modified")?;
        let created_at: String = row.get("created_at")?;
        let updated_at: String = row.get("updated_at")?;
        Ok(Checkpoint {
            task_id: row.get("task_id")?,
            checkpoint_data: serde_json::from_str(&checkpoint_data).unwrap_or(serde_json::Value::Null),
            files_created: json_to_string_list(&files_created),
            files_modified: json_to_string_list(&files_modified),
            last_step: row.get("last_step")?,
            completion_percentage: row.get("completion_percentage")?,
            created_at: parse_timestamp(&created_at),
            updated_at: parse_timestamp(&updated_at),
        })
    })
    .optional()
    .map_err(QueueError::from)
}

pub fn delete_checkpoint(conn: &Connection, task_id: i64) -> QueueResult<()> {
    conn.execute("DELETE FROM checkpoints WHERE task_id = ?1", params![task_id])?;
    Ok(())
}

pub fn track_file_change(
    conn: &Connection,
    task_id: i64,
    operation: ChangeOperation,
    file_path: &str,
    before_content: Option<String>,
    after_content: Option<String>,
) -> QueueResult<i64> {
    let now = Utc::now().to_rfc3339();
    conn.execute(
        "INSERT INTO task_changes (task_id, operation, file_path, before_content, after_content, timestamp)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
        params![task_id, operation, file_path, before_content, after_content, now],
    )?;
    Ok(conn.last_insert_rowid())
}

pub fn get_task_changes(conn: &Connection, task_id: i64) -> QueueResult<Vec<TaskChange>> {
    let mut stmt = conn.prepare(
        "SELECT * FROM task_changes WHERE task_id = ?1 ORDER BY change_id ASC",
    )?;
    let changes = stmt
        .query_map(params![task_id], |row| {
            let timestamp: String = row.get("timestamp")?;
            Ok(TaskChange {
                change_id: row.get("change_id")?,
                task_id: row.get("task_id")?,
                operation: row.get("operation")?,
                file_path: row.get("file_path")?,
                before_content: row.get("before_content")?,
                after_content: row.get("after_content")?,
                timestamp: parse_timestamp(&timestamp),
            })
        })?
        .collect::<Result<_, _>>()?;
    Ok(changes)
}

pub fn rollback_task(conn: &Connection, task_id: i64) -> QueueResult<RollbackResult> {
    let mut changes = get_task_changes(conn, task_id)?;
    changes.reverse();

    let mut result = RollbackResult::default();
    for change in changes {
        let path = std::path::Path::new(&change.file_path);
        let outcome = match change.operation {
            ChangeOperation::Create => {
                if path.exists() {
                    std::fs::remove_file(path).map(|_| {
                        result.files_deleted.push(change.file_path.clone());
                    })
                } else {
                    Ok(())
                }
            }
            ChangeOperation::Modify | ChangeOperation::Delete => {
                if let Some(parent) = path.parent() {
                    if let Err(e) = std::fs::create_dir_all(parent) {
                        result.errors.push(format!("{}: {}", change.file_path, e));
                        continue;
                    }
                }
                let content = change.before_content.clone().unwrap_or_default();
                std::fs::write(path, content).map(|_| {
                    result.files_restored.push(change.file_path.clone());
                })
            }
        };
        if let Err(e) = outcome {
            result.errors.push(format!("{}: {}", change.file_path, e));
        }
    }
    Ok(result)
}

pub fn set_shared_context(
    conn: &Connection,
    job_id: Option<&str>,
    key: &str,
    value: &str,
) -> QueueResult<()> {
    let now = Utc::now().to_rfc3339();
    conn.execute(
        "INSERT INTO shared_context (job_id, key, value, created_at, updated_at)
         VALUES (?1, ?2, ?3, ?4, ?4)
         ON CONFLICT(COALESCE(job_id, ''), key) DO UPDATE SET value = excluded.value, updated_at = excluded.updated_at",
        params![job_id, key, value, now],
    )?;
    Ok(())
}

pub fn get_shared_context(conn: &Connection, job_id: Option<&str>) -> QueueResult<HashMap<String, String>> {
    let mut result = HashMap::new();
    let mut stmt = conn.prepare("SELECT key, value FROM shared_context WHERE job_id IS NULL")?;
    for row in stmt.query_map([], |row| Ok((row.get::<_, String>(0)?, row.get::<_, String>(1)?)))? {
        let (key, value) = row?;
        result.insert(key, value);
    }
    if let Some(job_id) = job_id {
        let mut stmt = conn.prepare("SELECT key, value FROM shared_context WHERE job_id = ?1")?;
        for row in stmt.query_map(params![job_id], |row| {
            Ok((row.get::<_, String>(0)?, row.get::<_, String>(1)?))
        })? {
            let (key, value) = row?;
            result.insert(key, value);
        }
    }
    Ok(result)
}

pub fn delete_shared_context(conn: &Connection, job_id: Option<&str>, key: &str) -> QueueResult<()> {
    conn.execute(
        "DELETE FROM shared_context WHERE key = ?1 AND job_id IS ?2",
        params![key, job_id],
    )?;
    Ok(())
}

pub fn log_worker_progress(
    conn: &Connection,
    worker_id: &str,
    task_id: Option<i64>,
    message: &str,
    level: LogLevel,
) -> QueueResult<i64> {
    let now = Utc::now().to_rfc3339();
    conn.execute(
        "INSERT INTO worker_logs (worker_id, task_id, timestamp, message, level) VALUES (?1, ?2, ?3, ?4, ?5)",
        params![worker_id, task_id, now, message, level],
    )?;
    Ok(conn.last_insert_rowid())
}

pub fn get_worker_logs(
    conn: &Connection,
    worker_id: Option<&str>,
    task_id: Option<i64>,
    limit: i64,
) -> QueueResult<Vec<WorkerLog>> {
    let mut stmt = conn.prepare(
        "SELECT * FROM worker_logs
         WHERE (:worker_id IS NULL OR worker_id = :worker_id)
           AND (:task_id IS NULL OR task_id = :task_id)
         ORDER BY log_id DESC LIMIT :limit",
    )?;
    let mut logs: Vec<WorkerLog> = stmt
        .query_map(
            rusqlite::named_params! { ":worker_id": worker_id, ":task_id": task_id, ":limit": limit },
            row_to_worker_log,
        )?
        .collect::<Result<_, _>>()?;
    logs.reverse();
    Ok(logs)
}

pub fn get_active_progress(conn: &Connection) -> QueueResult<Vec<Worker>> {
    let mut stmt = conn.prepare("SELECT * FROM workers WHERE status = 'active'")?;
    let workers = stmt.query_map([], row_to_worker)?.collect::<Result<_, _>>()?;
    Ok(workers)
}

fn collect_stats(conn: &Connection, job_id: Option<&str>) -> QueueResult<JobStats> {
    let sql = if job_id.is_some() {
        "SELECT status, COUNT(*) FROM tasks WHERE job_id = ?1 GROUP BY status"
    } else {
        "SELECT status, COUNT(*) FROM tasks GROUP BY status"
    };
    let mut stmt = conn.prepare(sql)?;
    let mut stats = JobStats::default();
    let map_row = |row: &Row| -> rusqlite::Result<(TaskStatus, i64)> {
        Ok((row.get(0)?, row.get(1)?))
    };
    let rows: Vec<(TaskStatus, i64)> = match job_id {
        Some(job_id) => stmt
            .query_map(params![job_id], map_row)?
            .collect::<Result<_, _>>()?,
        None => stmt.query_map([], map_row)?.collect::<Result<_, _>>()?,
    };
    for (status, count) in rows {
        match status {
            TaskStatus::Pending => stats.pending = count,
            TaskStatus::Claimed => stats.claimed = count,
            TaskStatus::InProgress => stats.in_progress = count,
            TaskStatus::Completed => stats.completed = count,
            TaskStatus::Failed => stats.failed = count,
            TaskStatus::Cancelled => stats.cancelled = count,
            TaskStatus::Paused => stats.paused = count,
            TaskStatus::Resuming => stats.resuming = count,
        }
    }
    Ok(stats)
}

pub fn get_stats(conn: &Connection) -> QueueResult<JobStats> {
    collect_stats(conn, None)
}

pub fn get_job_stats(conn: &Connection, job_id: &str) -> QueueResult<JobStats> {
    collect_stats(conn, Some(job_id))
}

pub fn list_tasks(conn: &Connection, status: Option<TaskStatus>) -> QueueResult<Vec<Task>> {
    let tasks = match status {
        Some(status) => {
            let mut stmt = conn.prepare("SELECT * FROM tasks WHERE status = ?1 ORDER BY id ASC")?;
            stmt.query_map(params![status], row_to_task)?.collect::<Result<_, _>>()?
        }
        None => {
            let mut stmt = conn.prepare("SELECT * FROM tasks ORDER BY id ASC")?;
            stmt.query_map([], row_to_task)?.collect::<Result<_, _>>()?
        }
    };
    Ok(tasks)
}

pub fn list_workers(conn: &Connection) -> QueueResult<Vec<Worker>> {
    let mut stmt = conn.prepare("SELECT * FROM workers ORDER BY worker_id ASC")?;
    let workers = stmt.query_map([], row_to_worker)?.collect::<Result<_, _>>()?;
    Ok(workers)
}

pub fn get_task(conn: &Connection, task_id: i64) -> QueueResult<Option<Task>> {
    conn.query_row("SELECT * FROM tasks WHERE id = ?1", params![task_id], row_to_task)
        .optional()
        .map_err(QueueError::from)
}

pub fn create_job(
    conn: &Connection,
    job_id: &str,
    description: &str,
    orchestrator_id: &str,
    metadata: Option<serde_json::Value>,
) -> QueueResult<()> {
    let now = Utc::now().to_rfc3339();
    conn.execute(
        "INSERT INTO jobs (job_id, description, orchestrator_id, status, created_at, metadata)
         VALUES (?1, ?2, ?3, 'active', ?4, ?5)",
        params![job_id, description, orchestrator_id, now, to_json(&metadata)?],
    )?;
    Ok(())
}

pub fn get_job(conn: &Connection, job_id: &str) -> QueueResult<Option<Job>> {
    conn.query_row("SELECT * FROM jobs WHERE job_id = ?1", params![job_id], row_to_job)
        .optional()
        .map_err(QueueError::from)
}

pub fn get_job_tasks(conn: &Connection, job_id: &str) -> QueueResult<Vec<Task>> {
    let mut stmt = conn.prepare("SELECT * FROM tasks WHERE job_id = ?1 ORDER BY id ASC")?;
    let tasks = stmt.query_map(params![job_id], row_to_task)?.collect::<Result<_, _>>()?;
    Ok(tasks)
}

pub fn complete_job(conn: &Connection, job_id: &str) -> QueueResult<()> {
    let now = Utc::now().to_rfc3339();
    let changed = conn.execute(
        "UPDATE jobs SET status = 'completed', completed_at = ?1 WHERE job_id = ?2",
        params![now, job_id],
    )?;
    if changed == 0 {
        return Err(QueueError::JobNotFound(job_id.to_string()));
    }
    Ok(())
}

pub fn get_child_tasks(conn: &Connection, parent_task_id: i64) -> QueueResult<Vec<Task>> {
    let mut stmt = conn.prepare("SELECT * FROM tasks WHERE parent_task_id = ?1 ORDER BY id ASC")?;
    let tasks = stmt
        .query_map(params![parent_task_id], row_to_task)?
        .collect::<Result<_, _>>()?;
    Ok(tasks)
}

pub fn get_paused_tasks(conn: &Connection) -> QueueResult<Vec<Task>> {
    list_tasks(conn, Some(TaskStatus::Paused))
}

pub fn get_failed_retryable_tasks(conn: &Connection) -> QueueResult<Vec<Task>> {
    let mut stmt = conn.prepare("SELECT * FROM tasks WHERE status = 'failed' AND retry_count < max_retries")?;
    let tasks = stmt.query_map([], row_to_task)?.collect::<Result<_, _>>()?;
    Ok(tasks)
}

pub fn retry_all_failed_tasks(conn: &Connection) -> QueueResult<Vec<i64>> {
    let retryable = get_failed_retryable_tasks(conn)?;
    let mut retried = Vec::new();
    for task in retryable {
        if retry_task(conn, task.id, true)?.is_some() {
            retried.push(task.id);
        }
    }
    Ok(retried)
}
