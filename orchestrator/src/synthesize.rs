use queue::{Task, TaskStatus};

/// The snapshot `wait_and_collect` returns per task: a plain projection of the
/// queue row, independent of the live `Task` the store may have moved on from.
#[derive(Debug, Clone)]
pub struct TaskOutcome {
    pub task_id: i64,
    pub prompt: String,
    pub status: TaskStatus,
    pub result: Option<queue::TaskResult>,
    pub error: Option<String>,
    pub working_dir: Option<String>,
    pub expected_outputs: Vec<String>,
}

impl From<&Task> for TaskOutcome {
    fn from(task: &Task) -> Self {
        Self {
            task_id: task.id,
            prompt: task.prompt.clone(),
            status: task.status,
            result: task.result.clone(),
            error: task.error.clone(),
            working_dir: task.working_dir.clone(),
            expected_outputs: task.expected_outputs.clone(),
        }
    }
}

/// Deterministic human-readable digest of a job's outcomes, suitable for
/// passing straight to an LLM for a synthesis pass.
pub fn synthesize_results(results: &[TaskOutcome], synthesis_prompt: Option<&str>) -> String {
    let mut out = Vec::new();
    let divider = "=".repeat(60);

    out.push(divider.clone());
    out.push("TASK EXECUTION RESULTS".to_string());
    out.push(divider.clone());
    out.push(String::new());

    let completed: Vec<&TaskOutcome> = results.iter().filter(|r| r.status == TaskStatus::Completed).collect();
    let failed: Vec<&TaskOutcome> = results.iter().filter(|r| r.status == TaskStatus::Failed).collect();

    out.push(format!("Summary: {} completed, {} failed", completed.len(), failed.len()));
    out.push(String::new());

    if !completed.is_empty() {
        out.push("COMPLETED TASKS".to_string());
        out.push("-".repeat(60));
        for outcome in &completed {
            out.push(String::new());
            out.push(format!("Task {}: {}", outcome.task_id, outcome.prompt));
            out.push(format!("Working Dir: {}", outcome.working_dir.as_deref().unwrap_or("N/A")));

            if let Some(result) = &outcome.result {
                out.push(format!("Return Code: {}", result.exit_code));
                if !result.stdout.is_empty() {
                    let stdout: String = if result.stdout.chars().count() > 500 {
                        result.stdout.chars().take(500).collect()
                    } else {
                        result.stdout.clone()
                    };
                    out.push(String::new());
                    out.push(format!("Output:\n{}", stdout));
                }
                if !result.expected_files_present.is_empty() {
                    out.push(String::new());
                    out.push(format!("Expected Files: {:?}", result.expected_files_present));
                }
            }
            out.push(String::new());
        }
    }

    if !failed.is_empty() {
        out.push(String::new());
        out.push("FAILED TASKS".to_string());
        out.push("-".repeat(60));
        for outcome in &failed {
            out.push(String::new());
            out.push(format!("Task {}: {}", outcome.task_id, outcome.prompt));
            out.push(format!("Error: {}", outcome.error.as_deref().unwrap_or("unknown")));
            out.push(String::new());
        }
    }

    if let Some(prompt) = synthesis_prompt {
        out.push(divider.clone());
        out.push("SYNTHESIS REQUEST".to_string());
        out.push(divider);
        out.push(prompt.to_string());
    }

    out.join("\n")
}

#[cfg(test)]
mod tests {
    use super::*;

    fn completed(id: i64, stdout: &str) -> TaskOutcome {
        TaskOutcome {
            task_id: id,
            prompt: "do it".to_string(),
            status: TaskStatus::Completed,
            result: Some(queue::TaskResult { stdout: stdout.to_string(), exit_code: 0, ..Default::default() }),
            error: None,
            working_dir: Some("/tmp/x".to_string()),
            expected_outputs: vec![],
        }
    }

    fn failed(id: i64, error: &str) -> TaskOutcome {
        TaskOutcome {
            task_id: id,
            prompt: "do it".to_string(),
            status: TaskStatus::Failed,
            result: None,
            error: Some(error.to_string()),
            working_dir: None,
            expected_outputs: vec![],
        }
    }

    #[test]
    fn omits_empty_sections() {
        let text = synthesize_results(&[completed(1, "ok")], None);
        assert!(text.contains("COMPLETED TASKS"));
        assert!(!text.contains("FAILED TASKS"));
        assert!(!text.contains("SYNTHESIS REQUEST"));
    }

    #[test]
    fn includes_synthesis_request_when_given() {
        let text = synthesize_results(&[failed(2, "boom")], Some("summarize this"));
        assert!(text.contains("FAILED TASKS"));
        assert!(!text.contains("COMPLETED TASKS"));
        assert!(text.contains("SYNTHESIS REQUEST"));
        assert!(text.ends_with("summarize this"));
    }

    #[test]
    fn summary_line_counts_both_kinds() {
        let text = synthesize_results(&[completed(1, "ok"), failed(2, "boom")], None);
        assert!(text.contains("Summary: 1 completed, 1 failed"));
    }
}
