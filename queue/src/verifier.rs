//! Post-execution verification: configured or auto-detected hooks run against a working
//! directory, plus expected-output existence checks.

use crate::types::HookResult;
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;
use tokio::time::timeout;
use tracing::{info, warn};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VerificationHook {
    pub command: String,
    pub description: String,
    pub timeout_secs: u64,
    pub fail_on_error: bool,
}

impl VerificationHook {
    pub fn new(command: impl Into<String>, description: impl Into<String>) -> Self {
        Self {
            command: command.into(),
            description: description.into(),
            timeout_secs: 300,
            fail_on_error: true,
        }
    }

    pub fn with_timeout(mut self, secs: u64) -> Self {
        self.timeout_secs = secs;
        self
    }

    pub fn optional(mut self) -> Self {
        self.fail_on_error = false;
        self
    }
}

#[derive(Debug, Clone)]
pub struct VerificationResult {
    pub hook: VerificationHook,
    pub passed: bool,
    pub stdout: String,
    pub stderr: String,
    pub return_code: i32,
    pub error_message: Option<String>,
}

impl VerificationResult {
    pub fn to_hook_result(&self) -> HookResult {
        HookResult {
            hook_description: self.hook.description.clone(),
            passed: self.passed,
            return_code: self.return_code,
            error_message: self.error_message.clone(),
            stdout_preview: (!self.stdout.is_empty()).then(|| truncate(&self.stdout, 500)),
            stderr_preview: (!self.stderr.is_empty()).then(|| truncate(&self.stderr, 500)),
        }
    }
}

fn truncate(s: &str, max: usize) -> String {
    if s.chars().count() <= max {
        s.to_string()
    } else {
        s.chars().take(max).collect()
    }
}

pub struct ProjectTypeDetector;

impl ProjectTypeDetector {
    pub fn detect_project_types(working_dir: &Path) -> Vec<String> {
        let mut detected = Vec::new();

        if working_dir.join("tsconfig.json").exists() {
            detected.push("typescript".to_string());
        }
        if working_dir.join("package.json").exists() {
            detected.push("node".to_string());
            if let Ok(text) = std::fs::read_to_string(working_dir.join("package.json")) {
                if let Ok(value) = serde_json::from_str::<serde_json::Value>(&text) {
                    let has_react = ["dependencies", "devDependencies"].iter().any(|section| {
                        value
                            .get(section)
                            .and_then(|v| v.get("react"))
                            .is_some()
                    });
                    if has_react {
                        detected.push("react".to_string());
                    }
                }
            }
        }
        if working_dir.join("setup.py").exists() || working_dir.join("pyproject.toml").exists() {
            detected.push("python".to_string());
        }
        if working_dir.join("requirements.txt").exists() && !detected.contains(&"python".to_string()) {
            detected.push("python".to_string());
        }
        if working_dir.join("pytest.ini").exists() || working_dir.join("tox.ini").exists() {
            detected.push("python-test".to_string());
        }
        if working_dir.join("go.mod").exists() {
            detected.push("go".to_string());
        }
        if working_dir.join("Cargo.toml").exists() {
            detected.push("rust".to_string());
        }
        detected
    }

    pub fn get_default_hooks(project_types: &[String], working_dir: &Path) -> Vec<VerificationHook> {
        let mut hooks = Vec::new();
        let has = |t: &str| project_types.iter().any(|p| p == t);

        if has("typescript") {
            hooks.push(VerificationHook::new("npx tsc --noEmit", "TypeScript compilation check"));
        }

        if has("node")
            && (working_dir.join(".eslintrc.js").exists()
                || working_dir.join(".eslintrc.json").exists()
                || working_dir.join(".eslintrc").exists())
        {
            hooks.push(
                VerificationHook::new("npx eslint . --ext .js,.jsx,.ts,.tsx", "ESLint check").optional(),
            );
        }

        if has("node") {
            if let Ok(text) = std::fs::read_to_string(working_dir.join("package.json")) {
                if let Ok(value) = serde_json::from_str::<serde_json::Value>(&text) {
                    if value.get("scripts").and_then(|s| s.get("test")).is_some() {
                        hooks.push(
                            VerificationHook::new("npm test", "Run test suite").with_timeout(600),
                        );
                    }
                }
            }
        }

        if has("python") {
            if working_dir.join("mypy.ini").exists() || working_dir.join("setup.cfg").exists() {
                hooks.push(
                    VerificationHook::new("python3 -m mypy .", "Python type checking (mypy)").optional(),
                );
            }
            if working_dir.join("pyproject.toml").exists() {
                hooks.push(
                    VerificationHook::new("python3 -m black --check .", "Python formatting check (black)")
                        .optional(),
                );
            }
        }

        if has("python-test") {
            hooks.push(
                VerificationHook::new("python3 -m pytest", "Run Python tests (pytest)").with_timeout(600),
            );
        }

        if has("go") {
            hooks.push(VerificationHook::new("go build ./...", "Go build check"));
            hooks.push(VerificationHook::new("go test ./...", "Run Go tests").with_timeout(600));
        }

        if has("rust") {
            hooks.push(VerificationHook::new("cargo check", "Rust check"));
            hooks.push(VerificationHook::new("cargo test", "Run Rust tests").with_timeout(600));
        }

        hooks
    }
}

pub struct TaskVerifier {
    working_dir: std::path::PathBuf,
}

impl TaskVerifier {
    pub fn new(working_dir: impl Into<std::path::PathBuf>) -> Self {
        Self { working_dir: working_dir.into() }
    }

    pub async fn run_hook(&self, hook: &VerificationHook) -> VerificationResult {
        info!(description = %hook.description, command = %hook.command, "running verification hook");

        let command = tokio::process::Command::new("sh")
            .arg("-c")
            .arg(&hook.command)
            .current_dir(&self.working_dir)
            .output();

        match timeout(Duration::from_secs(hook.timeout_secs), command).await {
            Ok(Ok(output)) => {
                let passed = output.status.success();
                let return_code = output.status.code().unwrap_or(-1);
                VerificationResult {
                    hook: hook.clone(),
                    passed,
                    stdout: String::from_utf8_lossy(&output.stdout).into_owned(),
                    stderr: String::from_utf8_lossy(&output.stderr).into_owned(),
                    return_code,
                    error_message: (!passed)
                        .then(|| format!("Command failed with exit code {}", return_code)),
                }
            }
            Ok(Err(e)) => VerificationResult {
                hook: hook.clone(),
                passed: false,
                stdout: String::new(),
                stderr: String::new(),
                return_code: -1,
                error_message: Some(format!("Verification error: {}", e)),
            },
            Err(_) => VerificationResult {
                hook: hook.clone(),
                passed: false,
                stdout: String::new(),
                stderr: String::new(),
                return_code: -1,
                error_message: Some(format!("Verification timeout after {}s", hook.timeout_secs)),
            },
        }
    }

    pub async fn verify_task(&self, hooks: &[VerificationHook]) -> (bool, Vec<VerificationResult>) {
        let mut results = Vec::with_capacity(hooks.len());
        let mut all_passed = true;

        for hook in hooks {
            let result = self.run_hook(hook).await;
            if !result.passed && hook.fail_on_error {
                all_passed = false;
                warn!(description = %hook.description, "verification hook failed");
            } else if !result.passed {
                warn!(description = %hook.description, "non-critical verification hook failed");
            }
            results.push(result);
        }

        (all_passed, results)
    }

    pub fn check_expected_outputs(&self, expected_outputs: &[String]) -> (bool, std::collections::HashMap<String, bool>) {
        let mut file_status = std::collections::HashMap::new();
        let mut all_exist = true;

        for expected in expected_outputs {
            let exists = self.working_dir.join(expected).exists();
            file_status.insert(expected.clone(), exists);
            if !exists {
                all_exist = false;
            }
        }

        (all_exist, file_status)
    }
}

/// The exact multi-line error format a test suite can assert on.
pub fn format_verification_error(results: &[VerificationResult], missing_files: &[String]) -> String {
    let mut lines = Vec::new();

    if !missing_files.is_empty() {
        lines.push(format!("Missing output files: {}", missing_files.join(", ")));
    }

    let failed_hooks: Vec<&VerificationResult> =
        results.iter().filter(|r| !r.passed && r.hook.fail_on_error).collect();

    if !failed_hooks.is_empty() {
        lines.push("Verification checks failed:".to_string());
        for result in failed_hooks {
            lines.push(format!(
                "  - {}: {}",
                result.hook.description,
                result.error_message.as_deref().unwrap_or("unknown error")
            ));
            for line in result.stderr.lines().take(5) {
                if !line.trim().is_empty() {
                    lines.push(format!("    {}", line));
                }
            }
        }
    }

    lines.join("\n")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn detects_rust_project() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("Cargo.toml"), "[package]\nname=\"x\"\n").unwrap();
        let types = ProjectTypeDetector::detect_project_types(dir.path());
        assert_eq!(types, vec!["rust".to_string()]);

        let hooks = ProjectTypeDetector::get_default_hooks(&types, dir.path());
        assert_eq!(hooks.len(), 2);
        assert_eq!(hooks[0].command, "cargo check");
        assert_eq!(hooks[1].timeout_secs, 600);
    }

    #[tokio::test]
    async fn run_hook_captures_nonzero_exit() {
        let dir = tempfile::tempdir().unwrap();
        let verifier = TaskVerifier::new(dir.path());
        let hook = VerificationHook::new("exit 1", "always fails");
        let result = verifier.run_hook(&hook).await;
        assert!(!result.passed);
        assert_eq!(result.return_code, 1);
    }

    #[tokio::test]
    async fn format_error_lists_missing_files_and_failed_hooks() {
        let dir = tempfile::tempdir().unwrap();
        let verifier = TaskVerifier::new(dir.path());
        let hook = VerificationHook::new("echo oops 1>&2; exit 1", "lint");
        let result = verifier.run_hook(&hook).await;
        let formatted = format_verification_error(&[result], &["dist/out.js".to_string()]);
        assert!(formatted.starts_with("Missing output files: dist/out.js"));
        assert!(formatted.contains("Verification checks failed:"));
        assert!(formatted.contains("- lint:"));
        assert!(formatted.contains("    oops"));
    }
}
