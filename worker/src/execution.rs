//! Runs the external LLM CLI as a bounded subprocess and captures its output.

use std::path::Path;
use std::time::Duration;
use tokio::io::AsyncWriteExt;
use tokio::process::Command;
use tokio::time::timeout;

const TASK_TIMEOUT_SECS: u64 = 1800;

pub fn task_timeout_secs() -> u64 {
    TASK_TIMEOUT_SECS
}

#[derive(Debug, Clone)]
pub struct ExecutionOutput {
    pub stdout: String,
    pub stderr: String,
    pub exit_code: i32,
    pub working_dir: String,
    pub timed_out: bool,
}

pub async fn run_llm_command(command: &str, prompt: &str, working_dir: &Path) -> std::io::Result<ExecutionOutput> {
    let mut child = Command::new(command)
        .arg("-p")
        .arg("--permission-mode")
        .arg("bypassPermissions")
        .current_dir(working_dir)
        .stdin(std::process::Stdio::piped())
        .stdout(std::process::Stdio::piped())
        .stderr(std::process::Stdio::piped())
        .spawn()?;

    if let Some(mut stdin) = child.stdin.take() {
        stdin.write_all(prompt.as_bytes()).await?;
    }

    let working_dir = working_dir.display().to_string();

    match timeout(Duration::from_secs(TASK_TIMEOUT_SECS), child.wait_with_output()).await {
        Ok(Ok(output)) => Ok(ExecutionOutput {
            stdout: String::from_utf8_lossy(&output.stdout).into_owned(),
            stderr: String::from_utf8_lossy(&output.stderr).into_owned(),
            exit_code: output.status.code().unwrap_or(-1),
            working_dir,
            timed_out: false,
        }),
        Ok(Err(e)) => Err(e),
        Err(_) => Ok(ExecutionOutput {
            stdout: String::new(),
            stderr: String::new(),
            exit_code: -1,
            working_dir,
            timed_out: true,
        }),
    }
}

/// Canonical failure message for a non-zero CLI exit, matching the format the
/// orchestrator and verifier error strings share: short reason, then truncated stderr.
pub fn exit_code_error(exit_code: i32, stderr: &str) -> String {
    let mut msg = format!("Claude CLI exited with code {}", exit_code);
    let trimmed = stderr.trim();
    if !trimmed.is_empty() {
        msg.push_str(": ");
        if trimmed.chars().count() > 500 {
            msg.extend(trimmed.chars().take(500));
        } else {
            msg.push_str(trimmed);
        }
    }
    msg
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn captures_stdout_and_exit_code() {
        let dir = tempfile::tempdir().unwrap();
        let output = run_llm_command("cat", "hello", dir.path()).await.unwrap();
        assert_eq!(output.stdout, "hello");
        assert_eq!(output.exit_code, 0);
        assert!(!output.timed_out);
    }

    #[test]
    fn exit_code_error_includes_truncated_stderr() {
        let msg = exit_code_error(1, "boom\n");
        assert_eq!(msg, "Claude CLI exited with code 1: boom");
    }
}
