//! Assembles the effective prompt sent to the LLM CLI from a task's shared context,
//! context files, and expected outputs.

use queue::Task;
use std::collections::HashMap;

pub fn build_effective_prompt(task: &Task, shared_context: &HashMap<String, String>) -> String {
    let mut prompt = format!("Task ID: {}\n\n", task.id);

    if !shared_context.is_empty() {
        prompt.push_str("Project Conventions (follow these):\n");
        for (key, value) in shared_context {
            prompt.push_str(&format!("- {}: {}\n", key, value));
        }
        prompt.push('\n');
    }

    if !task.context_files.is_empty() {
        prompt.push_str("Context files to review:\n");
        for file in &task.context_files {
            prompt.push_str(&format!("- {}\n", file));
        }
        prompt.push('\n');
    }

    if !task.expected_outputs.is_empty() {
        prompt.push_str("Expected outputs:\n");
        for output in &task.expected_outputs {
            prompt.push_str(&format!("- {}\n", output));
        }
        prompt.push('\n');
    }

    prompt.push_str(&format!("Task:\n{}\n\n", task.prompt));
    prompt.push_str("Please complete this task. When done, respond with 'TASK_COMPLETE'.");
    prompt
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use queue::TaskStatus;

    fn task_with(prompt: &str, context_files: Vec<String>, expected_outputs: Vec<String>) -> Task {
        Task {
            id: 1,
            prompt: prompt.to_string(),
            working_dir: None,
            context_files,
            expected_outputs,
            metadata: None,
            priority: 5,
            status: TaskStatus::Pending,
            worker_id: None,
            job_id: None,
            parent_task_id: None,
            created_at: Utc::now(),
            claimed_at: None,
            started_at: None,
            completed_at: None,
            result: None,
            error: None,
            last_error: None,
            retry_count: 0,
            max_retries: 3,
            retry_policy: None,
        }
    }

    #[test]
    fn includes_shared_context_and_files() {
        let task = task_with("do the thing", vec!["src/lib.rs".to_string()], vec!["out.txt".to_string()]);
        let mut ctx = HashMap::new();
        ctx.insert("style".to_string(), "snake_case".to_string());

        let prompt = build_effective_prompt(&task, &ctx);
        assert!(prompt.contains("Task ID: 1"));
        assert!(prompt.contains("- style: snake_case"));
        assert!(prompt.contains("- src/lib.rs"));
        assert!(prompt.contains("- out.txt"));
        assert!(prompt.ends_with("respond with 'TASK_COMPLETE'."));
    }

    #[test]
    fn omits_empty_sections() {
        let task = task_with("do the thing", vec![], vec![]);
        let prompt = build_effective_prompt(&task, &HashMap::new());
        assert!(!prompt.contains("Project Conventions"));
        assert!(!prompt.contains("Context files"));
        assert!(!prompt.contains("Expected outputs"));
    }
}
