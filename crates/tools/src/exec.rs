//! `bash` tool — run a shell command in the session's sandbox.
//!
//! Inputs are pre-sanitized against a denylist of dangerous forms before
//! ever reaching the sandbox; this is the sandbox boundary's first line
//! only — the sandbox itself (process confinement, workspace root) is the
//! actual security boundary.

use std::time::Duration;

use regex::RegexSet;
use sa_domain::config::ExecSecurityConfig;
use sa_domain::error::{Error, Result};
use serde::Deserialize;
use serde_json::Value;

use crate::sandbox::Sandbox;

#[derive(Debug, Clone, Deserialize)]
pub struct BashRequest {
    pub command: String,
    /// Working directory relative to the sandbox workspace root.
    #[serde(default)]
    pub cwd: Option<String>,
    /// Override the configured default timeout.
    #[serde(default)]
    pub timeout_sec: Option<u64>,
}

/// Compiled denylist from `ExecSecurityConfig::denied_patterns`.
pub struct DenyList {
    set: RegexSet,
    patterns: Vec<String>,
}

impl DenyList {
    pub fn from_config(cfg: &ExecSecurityConfig) -> std::result::Result<Self, regex::Error> {
        Ok(Self {
            set: RegexSet::new(&cfg.denied_patterns)?,
            patterns: cfg.denied_patterns.clone(),
        })
    }

    /// Return the first matching pattern, if `command` is denied.
    pub fn check(&self, command: &str) -> Option<&str> {
        self.set
            .matches(command)
            .iter()
            .next()
            .map(|idx| self.patterns[idx].as_str())
    }
}

/// Run `req.command` in `sandbox`, truncating combined output at
/// `max_output_chars`. Returns a JSON result suitable for a tool observation.
pub async fn bash(
    sandbox: &dyn Sandbox,
    deny_list: &DenyList,
    default_timeout_sec: u64,
    max_output_chars: usize,
    req: BashRequest,
) -> Result<Value> {
    if let Some(pattern) = deny_list.check(&req.command) {
        return Err(Error::ToolExecution {
            tool: "bash".into(),
            message: format!("command denied by security policy (matched pattern: {pattern})"),
        });
    }

    let timeout = Duration::from_secs(req.timeout_sec.unwrap_or(default_timeout_sec));
    let outcome = sandbox
        .execute(&req.command, req.cwd.as_deref(), timeout)
        .await?;

    let mut combined = outcome.stdout.clone();
    if !outcome.stderr.is_empty() {
        if !combined.is_empty() {
            combined.push('\n');
        }
        combined.push_str(&outcome.stderr);
    }
    if combined.len() > max_output_chars {
        combined.truncate(max_output_chars);
        combined.push_str("\n[output truncated]");
    }

    Ok(serde_json::json!({
        "exit_code": outcome.exit_code,
        "output": combined,
        "success": outcome.exit_code == 0,
    }))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sandbox::SandboxManager;
    use tempfile::TempDir;

    fn deny_list() -> DenyList {
        DenyList::from_config(&ExecSecurityConfig::default()).unwrap()
    }

    #[tokio::test]
    async fn runs_command_and_captures_stdout() {
        let root = TempDir::new().unwrap();
        let manager = SandboxManager::new(root.path(), 10);
        let sandbox = manager.create("s1").await.unwrap();

        let result = bash(
            sandbox.as_ref(),
            &deny_list(),
            30,
            200_000,
            BashRequest {
                command: "echo hi".into(),
                cwd: None,
                timeout_sec: None,
            },
        )
        .await
        .unwrap();

        assert_eq!(result["exit_code"], 0);
        assert_eq!(result["output"], "hi");
        assert_eq!(result["success"], true);
    }

    #[tokio::test]
    async fn denies_dangerous_command() {
        let root = TempDir::new().unwrap();
        let manager = SandboxManager::new(root.path(), 10);
        let sandbox = manager.create("s1").await.unwrap();

        let result = bash(
            sandbox.as_ref(),
            &deny_list(),
            30,
            200_000,
            BashRequest {
                command: "rm -rf /".into(),
                cwd: None,
                timeout_sec: None,
            },
        )
        .await;

        assert!(matches!(result, Err(Error::ToolExecution { .. })));
    }

    #[tokio::test]
    async fn truncates_oversized_output() {
        let root = TempDir::new().unwrap();
        let manager = SandboxManager::new(root.path(), 10);
        let sandbox = manager.create("s1").await.unwrap();

        let result = bash(
            sandbox.as_ref(),
            &deny_list(),
            30,
            10,
            BashRequest {
                command: "printf '%0.sA' {1..50}".into(),
                cwd: None,
                timeout_sec: None,
            },
        )
        .await
        .unwrap();

        assert!(result["output"].as_str().unwrap().contains("[output truncated]"));
    }

    #[tokio::test]
    async fn nonzero_exit_is_not_success() {
        let root = TempDir::new().unwrap();
        let manager = SandboxManager::new(root.path(), 10);
        let sandbox = manager.create("s1").await.unwrap();

        let result = bash(
            sandbox.as_ref(),
            &deny_list(),
            30,
            200_000,
            BashRequest {
                command: "exit 1".into(),
                cwd: None,
                timeout_sec: None,
            },
        )
        .await
        .unwrap();

        assert_eq!(result["exit_code"], 1);
        assert_eq!(result["success"], false);
    }
}
