//! The public, `Clone`-able handle every component uses to talk to the store.

use crate::error::{QueueError, QueueResult};
use crate::store::actor::{self, StoreCommand};
use crate::types::*;
use std::collections::HashMap;
use std::path::Path;
use tokio::sync::{mpsc, oneshot};

/// A cheap handle to the store actor. Cloning just clones the channel sender.
#[derive(Clone)]
pub struct Queue {
    tx: mpsc::Sender<StoreCommand>,
}

macro_rules! call {
    ($self:ident, $variant:ident { $($field:ident: $value:expr),* $(,)? }) => {{
        let (reply, rx) = oneshot::channel();
        $self
            .tx
            .send(StoreCommand::$variant { $($field: $value,)* reply })
            .await
            .map_err(|_| QueueError::ActorGone)?;
        rx.await.map_err(|_| QueueError::ActorGone)?
    }};
}

impl Queue {
    /// Open (or create) the database at `path` and spawn its owning actor.
    pub fn open(path: impl AsRef<Path>) -> QueueResult<Self> {
        let tx = actor::spawn(path)?;
        Ok(Self { tx })
    }

    pub async fn shutdown(&self) {
        let _ = self.tx.send(StoreCommand::Shutdown).await;
    }

    pub async fn add_task(&self, new: NewTask) -> QueueResult<i64> {
        call!(self, AddTask { new: new })
    }

    pub async fn add_task_dependency(&self, task: i64, depends_on: i64) -> QueueResult<()> {
        call!(self, AddTaskDependency { task: task, depends_on: depends_on })
    }

    pub async fn claim_task(&self, worker_id: &str) -> QueueResult<Option<Task>> {
        call!(self, ClaimTask { worker_id: worker_id.to_string() })
    }

    pub async fn start_task(&self, task_id: i64, worker_id: &str) -> QueueResult<()> {
        call!(self, StartTask { task_id: task_id, worker_id: worker_id.to_string() })
    }

    pub async fn complete_task(
        &self,
        task_id: i64,
        worker_id: &str,
        result: Option<TaskResult>,
    ) -> QueueResult<()> {
        call!(self, CompleteTask { task_id: task_id, worker_id: worker_id.to_string(), result: result })
    }

    pub async fn fail_task(
        &self,
        task_id: i64,
        worker_id: &str,
        error: &str,
        auto_retry: bool,
    ) -> QueueResult<()> {
        call!(
            self,
            FailTask {
                task_id: task_id,
                worker_id: worker_id.to_string(),
                error: error.to_string(),
                auto_retry: auto_retry,
            }
        )
    }

    pub async fn retry_task(&self, task_id: i64, include_error_context: bool) -> QueueResult<Option<i64>> {
        call!(self, RetryTask { task_id: task_id, include_error_context: include_error_context })
    }

    pub async fn pause_task(
        &self,
        task_id: i64,
        worker_id: &str,
        checkpoint: Option<Checkpoint>,
    ) -> QueueResult<()> {
        call!(self, PauseTask { task_id: task_id, worker_id: worker_id.to_string(), checkpoint: checkpoint })
    }

    pub async fn cleanup_stale_tasks(&self, timeout_secs: i64) -> QueueResult<usize> {
        call!(self, CleanupStaleTasks { timeout_secs: timeout_secs })
    }

    pub async fn register_worker(&self, worker_id: &str) -> QueueResult<()> {
        call!(self, RegisterWorker { worker_id: worker_id.to_string() })
    }

    pub async fn update_worker_heartbeat(
        &self,
        worker_id: &str,
        status: WorkerStatus,
        current_task_id: Option<i64>,
    ) -> QueueResult<()> {
        call!(
            self,
            UpdateWorkerHeartbeat {
                worker_id: worker_id.to_string(),
                status: status,
                current_task_id: current_task_id,
            }
        )
    }

    pub async fn save_checkpoint(&self, checkpoint: Checkpoint) -> QueueResult<()> {
        call!(self, SaveCheckpoint { checkpoint: checkpoint })
    }

    pub async fn get_checkpoint(&self, task_id: i64) -> QueueResult<Option<Checkpoint>> {
        call!(self, GetCheckpoint { task_id: task_id })
    }

    pub async fn delete_checkpoint(&self, task_id: i64) -> QueueResult<()> {
        call!(self, DeleteCheckpoint { task_id: task_id })
    }

    pub async fn track_file_change(
        &self,
        task_id: i64,
        operation: ChangeOperation,
        file_path: &str,
        before_content: Option<String>,
        after_content: Option<String>,
    ) -> QueueResult<i64> {
        call!(
            self,
            TrackFileChange {
                task_id: task_id,
                operation: operation,
                file_path: file_path.to_string(),
                before_content: before_content,
                after_content: after_content,
            }
        )
    }

    pub async fn get_task_changes(&self, task_id: i64) -> QueueResult<Vec<TaskChange>> {
        call!(self, GetTaskChanges { task_id: task_id })
    }

    pub async fn rollback_task(&self, task_id: i64) -> QueueResult<RollbackResult> {
        call!(self, RollbackTask { task_id: task_id })
    }

    pub async fn set_shared_context(
        &self,
        key: &str,
        value: &str,
        job_id: Option<&str>,
    ) -> QueueResult<()> {
        call!(
            self,
            SetSharedContext {
                job_id: job_id.map(str::to_string),
                key: key.to_string(),
                value: value.to_string(),
            }
        )
    }

    pub async fn get_shared_context(&self, job_id: Option<&str>) -> QueueResult<HashMap<String, String>> {
        call!(self, GetSharedContext { job_id: job_id.map(str::to_string) })
    }

    pub async fn delete_shared_context(&self, key: &str, job_id: Option<&str>) -> QueueResult<()> {
        call!(self, DeleteSharedContext { job_id: job_id.map(str::to_string), key: key.to_string() })
    }

    pub async fn log_worker_progress(
        &self,
        worker_id: &str,
        task_id: Option<i64>,
        message: &str,
        level: LogLevel,
    ) -> QueueResult<i64> {
        call!(
            self,
            LogWorkerProgress {
                worker_id: worker_id.to_string(),
                task_id: task_id,
                message: message.to_string(),
                level: level,
            }
        )
    }

    pub async fn get_worker_logs(
        &self,
        worker_id: Option<&str>,
        task_id: Option<i64>,
        limit: i64,
    ) -> QueueResult<Vec<WorkerLog>> {
        call!(
            self,
            GetWorkerLogs { worker_id: worker_id.map(str::to_string), task_id: task_id, limit: limit }
        )
    }

    pub async fn get_active_progress(&self) -> QueueResult<Vec<Worker>> {
        call!(self, GetActiveProgress {})
    }

    pub async fn get_job_progress(&self, job_id: &str) -> QueueResult<JobStats> {
        self.get_job_stats(job_id).await
    }

    pub async fn get_stats(&self) -> QueueResult<JobStats> {
        call!(self, GetStats {})
    }

    pub async fn get_job_stats(&self, job_id: &str) -> QueueResult<JobStats> {
        call!(self, GetJobStats { job_id: job_id.to_string() })
    }

    pub async fn list_tasks(&self, status: Option<TaskStatus>) -> QueueResult<Vec<Task>> {
        call!(self, ListTasks { status: status })
    }

    pub async fn list_workers(&self) -> QueueResult<Vec<Worker>> {
        call!(self, ListWorkers {})
    }

    pub async fn get_task(&self, task_id: i64) -> QueueResult<Option<Task>> {
        call!(self, GetTask { task_id: task_id })
    }

    pub async fn create_job(
        &self,
        job_id: &str,
        description: &str,
        orchestrator_id: &str,
        metadata: Option<serde_json::Value>,
    ) -> QueueResult<()> {
        call!(
            self,
            CreateJob {
                job_id: job_id.to_string(),
                description: description.to_string(),
                orchestrator_id: orchestrator_id.to_string(),
                metadata: metadata,
            }
        )
    }

    pub async fn get_job(&self, job_id: &str) -> QueueResult<Option<Job>> {
        call!(self, GetJob { job_id: job_id.to_string() })
    }

    pub async fn get_job_tasks(&self, job_id: &str) -> QueueResult<Vec<Task>> {
        call!(self, GetJobTasks { job_id: job_id.to_string() })
    }

    pub async fn complete_job(&self, job_id: &str) -> QueueResult<()> {
        call!(self, CompleteJob { job_id: job_id.to_string() })
    }

    pub async fn get_child_tasks(&self, parent_task_id: i64) -> QueueResult<Vec<Task>> {
        call!(self, GetChildTasks { parent_task_id: parent_task_id })
    }

    pub async fn get_paused_tasks(&self) -> QueueResult<Vec<Task>> {
        call!(self, GetPausedTasks {})
    }

    pub async fn get_failed_retryable_tasks(&self) -> QueueResult<Vec<Task>> {
        call!(self, GetFailedRetryableTasks {})
    }

    pub async fn retry_all_failed_tasks(&self) -> QueueResult<Vec<i64>> {
        call!(self, RetryAllFailedTasks {})
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    async fn open_temp() -> (tempfile::TempDir, Queue) {
        let dir = tempfile::tempdir().unwrap();
        let queue = Queue::open(dir.path().join("tasks.db")).unwrap();
        (dir, queue)
    }

    #[tokio::test]
    async fn add_and_claim_task_roundtrip() {
        let (_dir, queue) = open_temp().await;
        let id = queue
            .add_task(NewTask {
                prompt: "do something".to_string(),
                ..Default::default()
            })
            .await
            .unwrap();

        queue.register_worker("worker_1").await.unwrap();
        let claimed = queue.claim_task("worker_1").await.unwrap().unwrap();
        assert_eq!(claimed.id, id);
        assert_eq!(claimed.status, TaskStatus::Claimed);
        assert_eq!(claimed.worker_id.as_deref(), Some("worker_1"));

        assert!(queue.claim_task("worker_2").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn empty_prompt_rejected() {
        let (_dir, queue) = open_temp().await;
        let err = queue
            .add_task(NewTask {
                prompt: "   ".to_string(),
                ..Default::default()
            })
            .await
            .unwrap_err();
        assert!(matches!(err, QueueError::EmptyPrompt));
    }

    #[tokio::test]
    async fn self_dependency_rejected_as_cycle() {
        let (_dir, queue) = open_temp().await;
        let id = queue
            .add_task(NewTask { prompt: "a".to_string(), ..Default::default() })
            .await
            .unwrap();
        let err = queue.add_task_dependency(id, id).await.unwrap_err();
        assert!(matches!(err, QueueError::DependencyCycle { .. }));
    }

    #[tokio::test]
    async fn claim_respects_unmet_dependency() {
        let (_dir, queue) = open_temp().await;
        let blocker = queue
            .add_task(NewTask { prompt: "blocker".to_string(), ..Default::default() })
            .await
            .unwrap();
        let dependent = queue
            .add_task(NewTask { prompt: "dependent".to_string(), priority: 10, ..Default::default() })
            .await
            .unwrap();
        queue.add_task_dependency(dependent, blocker).await.unwrap();

        queue.register_worker("worker_1").await.unwrap();
        let claimed = queue.claim_task("worker_1").await.unwrap().unwrap();
        assert_eq!(claimed.id, blocker);
    }

    #[tokio::test]
    async fn fail_task_retries_until_exhausted() {
        let (_dir, queue) = open_temp().await;
        let id = queue
            .add_task(NewTask { prompt: "flaky".to_string(), max_retries: 1, ..Default::default() })
            .await
            .unwrap();

        queue.register_worker("worker_1").await.unwrap();
        let claimed = queue.claim_task("worker_1").await.unwrap().unwrap();
        queue.start_task(claimed.id, "worker_1").await.unwrap();
        queue.fail_task(claimed.id, "worker_1", "boom", true).await.unwrap();

        let task = queue.get_task(id).await.unwrap().unwrap();
        assert_eq!(task.status, TaskStatus::Pending);
        assert_eq!(task.retry_count, 1);
        assert!(task.prompt.contains("Previous attempt failed"));

        let claimed = queue.claim_task("worker_1").await.unwrap().unwrap();
        queue.start_task(claimed.id, "worker_1").await.unwrap();
        queue.fail_task(claimed.id, "worker_1", "boom again", true).await.unwrap();

        let task = queue.get_task(id).await.unwrap().unwrap();
        assert_eq!(task.status, TaskStatus::Failed);
        assert_eq!(task.retry_count, 1);
    }

    #[tokio::test]
    async fn shared_context_overlay_job_wins() {
        let (_dir, queue) = open_temp().await;
        queue.set_shared_context("mode", "global", None).await.unwrap();
        queue.set_shared_context("mode", "job-scoped", Some("job-1")).await.unwrap();

        let global = queue.get_shared_context(None).await.unwrap();
        assert_eq!(global["mode"], "global");

        let overlaid = queue.get_shared_context(Some("job-1")).await.unwrap();
        assert_eq!(overlaid["mode"], "job-scoped");
    }

    #[tokio::test]
    async fn repeated_global_set_upserts_instead_of_duplicating() {
        let (_dir, queue) = open_temp().await;
        queue.set_shared_context("mode", "first", None).await.unwrap();
        queue.set_shared_context("mode", "second", None).await.unwrap();

        let global = queue.get_shared_context(None).await.unwrap();
        assert_eq!(global.len(), 1);
        assert_eq!(global["mode"], "second");
    }

    #[tokio::test]
    async fn rollback_restores_modified_file_and_deletes_created_one() {
        let (_dir, queue) = open_temp().await;
        let task_id = queue
            .add_task(NewTask { prompt: "edits".to_string(), ..Default::default() })
            .await
            .unwrap();

        let scratch = tempfile::tempdir().unwrap();
        let created = scratch.path().join("new.txt");
        let modified = scratch.path().join("existing.txt");
        std::fs::write(&modified, "original").unwrap();

        queue
            .track_file_change(
                task_id,
                ChangeOperation::Modify,
                modified.to_str().unwrap(),
                Some("original".to_string()),
                Some("changed".to_string()),
            )
            .await
            .unwrap();
        std::fs::write(&modified, "changed").unwrap();

        queue
            .track_file_change(
                task_id,
                ChangeOperation::Create,
                created.to_str().unwrap(),
                None,
                Some("new content".to_string()),
            )
            .await
            .unwrap();
        std::fs::write(&created, "new content").unwrap();

        let result = queue.rollback_task(task_id).await.unwrap();
        assert!(result.errors.is_empty());
        assert!(!created.exists());
        assert_eq!(std::fs::read_to_string(&modified).unwrap(), "original");
    }
}
