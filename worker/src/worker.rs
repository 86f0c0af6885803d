//! The worker main loop: claim, execute, verify, complete.

use crate::error::WorkerResult;
use crate::execution::{exit_code_error, run_llm_command, task_timeout_secs};
use crate::heartbeat::{self, CurrentTask};
use crate::prompt::build_effective_prompt;
use queue::{Config, LogLevel, Queue, Task, TaskResult};
use queue::verifier::{ProjectTypeDetector, TaskVerifier, VerificationHook, format_verification_error};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tracing::{error, info, warn};

pub struct Worker {
    worker_id: String,
    queue: Queue,
    config: Config,
    current_task: Arc<CurrentTask>,
    shutdown: Arc<AtomicBool>,
}

impl Worker {
    pub fn new(worker_id: impl Into<String>, queue: Queue, config: Config) -> Self {
        Self {
            worker_id: worker_id.into(),
            queue,
            config,
            current_task: CurrentTask::new(),
            shutdown: Arc::new(AtomicBool::new(false)),
        }
    }

    /// Confirms the store file exists and is openable, and reports pending work.
    pub async fn health_check(&self, db_path: &Path) -> WorkerResult<()> {
        info!(worker_id = %self.worker_id, "performing startup health check");

        if !db_path.exists() {
            error!(
                worker_id = %self.worker_id,
                path = %db_path.display(),
                "database file does not exist; run the orchestrator first or check .klauss.toml"
            );
            return Err(queue::QueueError::Config(format!(
                "database file does not exist: {}",
                db_path.display()
            ))
            .into());
        }

        let pending = self.queue.list_tasks(Some(queue::TaskStatus::Pending)).await?;
        info!(worker_id = %self.worker_id, pending = pending.len(), "health check passed");
        Ok(())
    }

    pub fn request_shutdown(&self) {
        self.shutdown.store(true, Ordering::SeqCst);
    }

    pub async fn run(&self, db_path: &Path) -> WorkerResult<()> {
        self.health_check(db_path).await?;
        self.queue.register_worker(&self.worker_id).await?;
        info!(worker_id = %self.worker_id, "registered");

        let heartbeat = heartbeat::spawn(self.queue.clone(), self.worker_id.clone(), self.current_task.clone());

        self.install_signal_handlers();

        while !self.shutdown.load(Ordering::SeqCst) {
            match self.run_once().await {
                Ok(()) => {}
                Err(e) => {
                    error!(worker_id = %self.worker_id, error = %e, "unexpected error in main loop");
                    if let Some(task_id) = self.current_task.get() {
                        let _ = self
                            .queue
                            .fail_task(task_id, &self.worker_id, &format!("Worker error: {}", e), true)
                            .await;
                        self.current_task.set(None);
                    }
                    tokio::time::sleep(tokio::time::Duration::from_secs(5)).await;
                }
            }
        }

        heartbeat.stop().await;
        info!(worker_id = %self.worker_id, "stopped");
        Ok(())
    }

    fn install_signal_handlers(&self) {
        let shutdown = self.shutdown.clone();
        let worker_id = self.worker_id.clone();
        tokio::spawn(async move {
            let mut sigterm = match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
                Ok(s) => s,
                Err(_) => return,
            };
            tokio::select! {
                _ = tokio::signal::ctrl_c() => {}
                _ = sigterm.recv() => {}
            }
            info!(worker_id = %worker_id, "shutdown signal received");
            shutdown.store(true, Ordering::SeqCst);
        });
    }

    async fn run_once(&self) -> WorkerResult<()> {
        let task = match self.queue.claim_task(&self.worker_id).await? {
            Some(task) => task,
            None => {
                tokio::time::sleep(tokio::time::Duration::from_secs(2)).await;
                return Ok(());
            }
        };

        self.current_task.set(Some(task.id));
        self.queue
            .log_worker_progress(&self.worker_id, Some(task.id), &preview(&task.prompt), LogLevel::Info)
            .await?;
        self.queue.start_task(task.id, &self.worker_id).await?;

        let outcome = self.execute(&task).await;

        match outcome {
            Ok(result) => {
                info!(worker_id = %self.worker_id, task_id = task.id, "task completed");
                self.queue.complete_task(task.id, &self.worker_id, Some(result)).await?;
            }
            Err(message) => {
                warn!(worker_id = %self.worker_id, task_id = task.id, error = %message, "task failed");
                self.queue
                    .log_worker_progress(&self.worker_id, Some(task.id), &preview(&message), LogLevel::Error)
                    .await?;
                self.queue.fail_task(task.id, &self.worker_id, &message, true).await?;
            }
        }

        self.current_task.set(None);
        Ok(())
    }

    async fn execute(&self, task: &Task) -> Result<TaskResult, String> {
        let working_dir: PathBuf = task
            .working_dir
            .clone()
            .map(PathBuf::from)
            .unwrap_or_else(|| std::env::current_dir().unwrap_or_default());

        let shared_context = self
            .queue
            .get_shared_context(task.job_id.as_deref())
            .await
            .map_err(|e| e.to_string())?;
        let effective_prompt = build_effective_prompt(task, &shared_context);

        let output = run_llm_command(&self.config.defaults.llm_command, &effective_prompt, &working_dir)
            .await
            .map_err(|e| format!("failed to spawn LLM command: {}", e))?;

        if output.timed_out {
            return Err(format!("Task execution timeout ({}s)", task_timeout_secs()));
        }

        let mut result = TaskResult {
            stdout: output.stdout.clone(),
            stderr: output.stderr.clone(),
            exit_code: output.exit_code,
            working_dir: Some(output.working_dir.clone()),
            ..Default::default()
        };

        if output.exit_code != 0 {
            return Err(exit_code_error(output.exit_code, &output.stderr));
        }

        let verifier = TaskVerifier::new(working_dir.clone());

        if !task.expected_outputs.is_empty() {
            let (all_exist, file_status) = verifier.check_expected_outputs(&task.expected_outputs);
            result.expected_files_present = file_status.clone();
            if !all_exist {
                let mut missing: Vec<&String> =
                    file_status.iter().filter(|(_, exists)| !**exists).map(|(path, _)| path).collect();
                missing.sort();
                return Err(format!(
                    "Expected output files not created: {}",
                    missing.iter().map(|s| s.as_str()).collect::<Vec<_>>().join(", ")
                ));
            }
        }

        let auto_verify = task
            .metadata
            .as_ref()
            .and_then(|m| m.get("auto_verify"))
            .and_then(|v| v.as_bool())
            .unwrap_or(true);
        let configured_hooks: Vec<VerificationHook> = task
            .metadata
            .as_ref()
            .and_then(|m| m.get("verification_hooks"))
            .and_then(|v| serde_json::from_value(v.clone()).ok())
            .unwrap_or_default();

        let hooks = if !configured_hooks.is_empty() {
            configured_hooks
        } else if auto_verify {
            let project_types = ProjectTypeDetector::detect_project_types(&working_dir);
            ProjectTypeDetector::get_default_hooks(&project_types, &working_dir)
        } else {
            Vec::new()
        };

        if !hooks.is_empty() {
            let (all_passed, verification_results) = verifier.verify_task(&hooks).await;
            result.verification_results = verification_results.iter().map(|r| r.to_hook_result()).collect();

            if !all_passed {
                let message = format_verification_error(&verification_results, &[]);
                return Err(format!("Verification failed:\n{}", message));
            }
        }

        Ok(result)
    }
}

fn preview(text: &str) -> String {
    if text.chars().count() > 60 {
        format!("{}...", text.chars().take(60).collect::<String>())
    } else {
        text.to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::WorkerError;

    #[test]
    fn preview_truncates_long_prompts() {
        let long = "x".repeat(100);
        let shown = preview(&long);
        assert_eq!(shown.chars().count(), 63);
        assert!(shown.ends_with("..."));
    }

    #[test]
    fn preview_keeps_short_prompts_unchanged() {
        assert_eq!(preview("short"), "short");
    }

    #[tokio::test]
    async fn health_check_fails_fast_on_missing_database() {
        let dir = tempfile::tempdir().unwrap();
        let db_path = dir.path().join("tasks.db");
        let queue = Queue::open(&db_path).unwrap();
        let worker = Worker::new("worker_1", queue, Config::default());

        let missing = dir.path().join("does-not-exist.db");
        let err = worker.health_check(&missing).await.unwrap_err();
        assert!(matches!(err, WorkerError::Queue(queue::QueueError::Config(_))));
    }
}
