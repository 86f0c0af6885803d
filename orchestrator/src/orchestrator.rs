//! Library surface for decomposing a goal into queued sub-tasks and collecting results.

use crate::availability;
use crate::error::OrchestratorResult;
use crate::status::{self, JobStatus};
use crate::synthesize::TaskOutcome;
use queue::{Config, NewTask, Queue, Task, TaskStatus};
use tracing::info;

pub struct Orchestrator {
    orchestrator_id: String,
    queue: Queue,
    config: Config,
}

/// Fields accepted by `Orchestrator::add_subtask`, mirroring `NewTask` minus the
/// fields the orchestrator derives itself (`job_id`, and `priority`'s default).
#[derive(Debug, Clone, Default)]
pub struct SubtaskSpec {
    pub prompt: String,
    pub working_dir: Option<String>,
    pub context_files: Vec<String>,
    pub expected_outputs: Vec<String>,
    pub metadata: Option<serde_json::Value>,
    pub priority: Option<i64>,
    pub parent_task_id: Option<i64>,
    pub depends_on: Vec<i64>,
    pub allow_external: bool,
}

impl Orchestrator {
    pub fn new(orchestrator_id: impl Into<String>, queue: Queue, config: Config) -> Self {
        Self { orchestrator_id: orchestrator_id.into(), queue, config }
    }

    pub async fn create_job(
        &self,
        description: &str,
        metadata: Option<serde_json::Value>,
    ) -> OrchestratorResult<String> {
        let job_id = format!("job_{}", uuid::Uuid::now_v7().simple());
        self.queue.create_job(&job_id, description, &self.orchestrator_id, metadata).await?;
        info!(job_id = %job_id, description, "created job");
        Ok(job_id)
    }

    pub async fn add_subtask(&self, job_id: &str, spec: SubtaskSpec) -> OrchestratorResult<i64> {
        self.config.validate_working_dir(spec.working_dir.as_deref(), spec.allow_external)?;

        let priority = spec.priority.unwrap_or(self.config.defaults.priority);
        let task_id = self
            .queue
            .add_task(NewTask {
                prompt: spec.prompt.clone(),
                working_dir: spec.working_dir,
                context_files: spec.context_files,
                expected_outputs: spec.expected_outputs,
                metadata: spec.metadata,
                priority,
                job_id: Some(job_id.to_string()),
                parent_task_id: spec.parent_task_id,
                max_retries: 3,
                retry_policy: None,
            })
            .await?;

        for dependency in spec.depends_on {
            self.queue.add_task_dependency(task_id, dependency).await?;
        }

        info!(job_id, task_id, "added subtask");
        Ok(task_id)
    }

    pub async fn get_job_status(&self, job_id: &str) -> OrchestratorResult<JobStatus> {
        let stats = self.queue.get_job_stats(job_id).await?;
        Ok(status::from_stats(job_id, &stats))
    }

    pub async fn wait_and_collect(
        &self,
        job_id: &str,
        poll_interval: Option<std::time::Duration>,
        timeout: Option<std::time::Duration>,
        mut on_progress: impl FnMut(&JobStatus, u64),
    ) -> OrchestratorResult<Vec<TaskOutcome>> {
        let poll_interval =
            poll_interval.unwrap_or_else(|| std::time::Duration::from_secs_f64(self.config.defaults.poll_interval));
        let start = tokio::time::Instant::now();

        loop {
            let job_status = self.get_job_status(job_id).await?;
            let elapsed = start.elapsed();
            on_progress(&job_status, elapsed.as_secs());

            if job_status.in_progress + job_status.pending == 0 {
                break;
            }
            if let Some(timeout) = timeout {
                if elapsed > timeout {
                    break;
                }
            }
            tokio::time::sleep(poll_interval).await;
        }

        let tasks = self.queue.get_job_tasks(job_id).await?;
        let outcomes = tasks.iter().map(TaskOutcome::from).collect();
        self.queue.complete_job(job_id).await?;
        Ok(outcomes)
    }

    pub async fn get_completed_tasks(&self, job_id: &str) -> OrchestratorResult<Vec<Task>> {
        Ok(self
            .queue
            .get_job_tasks(job_id)
            .await?
            .into_iter()
            .filter(|t| t.status == TaskStatus::Completed)
            .collect())
    }

    pub async fn get_failed_tasks(&self, job_id: &str) -> OrchestratorResult<Vec<Task>> {
        Ok(self
            .queue
            .get_job_tasks(job_id)
            .await?
            .into_iter()
            .filter(|t| t.status == TaskStatus::Failed)
            .collect())
    }

    /// Re-enqueues a fresh copy of every failed task in the job, rather than resetting
    /// the existing rows in place.
    pub async fn retry_failed_tasks(&self, job_id: &str) -> OrchestratorResult<Vec<i64>> {
        let failed = self.get_failed_tasks(job_id).await?;
        let mut new_ids = Vec::with_capacity(failed.len());

        for task in failed {
            let spec = SubtaskSpec {
                prompt: task.prompt,
                working_dir: task.working_dir,
                context_files: task.context_files,
                expected_outputs: task.expected_outputs,
                metadata: task.metadata,
                priority: Some(task.priority),
                parent_task_id: task.parent_task_id,
                depends_on: Vec::new(),
                allow_external: true,
            };
            new_ids.push(self.add_subtask(job_id, spec).await?);
        }

        info!(job_id, count = new_ids.len(), "retried failed tasks");
        Ok(new_ids)
    }

    pub async fn create_hierarchical_tasks(
        &self,
        job_id: &str,
        parent_task_id: i64,
        subtasks: Vec<SubtaskSpec>,
    ) -> OrchestratorResult<Vec<i64>> {
        let mut task_ids = Vec::with_capacity(subtasks.len());
        for mut spec in subtasks {
            spec.parent_task_id = Some(parent_task_id);
            task_ids.push(self.add_subtask(job_id, spec).await?);
        }
        Ok(task_ids)
    }

    pub async fn suggested_worker_count(&self, job_id: &str) -> OrchestratorResult<i64> {
        let stats = self.queue.get_job_stats(job_id).await?;
        Ok(availability::suggested_worker_count(&stats))
    }

    pub async fn live_worker_count(&self) -> OrchestratorResult<usize> {
        Ok(availability::count_live_workers(&self.queue).await?)
    }

    pub fn queue(&self) -> &Queue {
        &self.queue
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    async fn open_temp() -> (tempfile::TempDir, Orchestrator) {
        let dir = tempfile::tempdir().unwrap();
        let queue = Queue::open(dir.path().join("tasks.db")).unwrap();
        let orch = Orchestrator::new("test-orch", queue, Config::default());
        (dir, orch)
    }

    #[tokio::test]
    async fn create_job_and_add_subtask_roundtrip() {
        let (_dir, orch) = open_temp().await;
        let job_id = orch.create_job("build a thing", None).await.unwrap();
        assert!(job_id.starts_with("job_"));

        let task_id = orch
            .add_subtask(&job_id, SubtaskSpec { prompt: "do a step".to_string(), ..Default::default() })
            .await
            .unwrap();

        let status = orch.get_job_status(&job_id).await.unwrap();
        assert_eq!(status.total_tasks, 1);
        assert_eq!(status.pending, 1);
        assert!(task_id > 0);
    }

    #[tokio::test]
    async fn retry_failed_tasks_creates_new_rows() {
        let (_dir, orch) = open_temp().await;
        let job_id = orch.create_job("flaky job", None).await.unwrap();
        let task_id = orch
            .add_subtask(&job_id, SubtaskSpec { prompt: "flaky step".to_string(), ..Default::default() })
            .await
            .unwrap();

        orch.queue().register_worker("worker_1").await.unwrap();
        orch.queue().claim_task("worker_1").await.unwrap();
        orch.queue().start_task(task_id, "worker_1").await.unwrap();
        orch.queue().fail_task(task_id, "worker_1", "boom", false).await.unwrap();

        let retried = orch.retry_failed_tasks(&job_id).await.unwrap();
        assert_eq!(retried.len(), 1);
        assert_ne!(retried[0], task_id);

        let status = orch.get_job_status(&job_id).await.unwrap();
        assert_eq!(status.total_tasks, 2);
    }

    #[tokio::test]
    async fn hierarchical_tasks_share_parent() {
        let (_dir, orch) = open_temp().await;
        let job_id = orch.create_job("parent job", None).await.unwrap();
        let parent_id = orch
            .add_subtask(&job_id, SubtaskSpec { prompt: "parent".to_string(), ..Default::default() })
            .await
            .unwrap();

        let children = orch
            .create_hierarchical_tasks(
                &job_id,
                parent_id,
                vec![
                    SubtaskSpec { prompt: "child a".to_string(), ..Default::default() },
                    SubtaskSpec { prompt: "child b".to_string(), ..Default::default() },
                ],
            )
            .await
            .unwrap();

        assert_eq!(children.len(), 2);
        let child_tasks = orch.queue().get_child_tasks(parent_id).await.unwrap();
        assert_eq!(child_tasks.len(), 2);
    }
}
