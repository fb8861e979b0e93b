//! `Sandbox` and `SandboxManager` — the per-session execution environment.
//!
//! This implementation provides a local-process sandbox: commands run under
//! the host's process table, confined to a per-session workspace directory.
//! It satisfies the same trait a container-backed implementation would;
//! swapping in a container runtime is an external-collaborator concern.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::{Duration, Instant};

use parking_lot::RwLock;
use sa_domain::error::{Error, Result};
use tokio::process::Command;

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Sandbox trait
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// Outcome of a single command execution in a sandbox.
#[derive(Debug, Clone)]
pub struct ExecOutcome {
    pub exit_code: i32,
    pub stdout: String,
    pub stderr: String,
}

/// Per-session isolated execution environment: command execution and file
/// I/O, confined to the session's workspace.
#[async_trait::async_trait]
pub trait Sandbox: Send + Sync {
    async fn execute(&self, cmd: &str, cwd: Option<&str>, timeout: Duration) -> Result<ExecOutcome>;
    async fn read_file(&self, path: &str) -> Result<Vec<u8>>;
    async fn write_file(&self, path: &str, bytes: &[u8]) -> Result<()>;
    fn workspace_root(&self) -> &Path;
}

/// A sandbox backed by the host's own process table, confined to a
/// per-session workspace directory on local disk.
pub struct LocalProcessSandbox {
    session_id: String,
    workspace_root: PathBuf,
}

impl LocalProcessSandbox {
    /// Create the sandbox, provisioning `<workspace_root>/<session_id>/{project_files,agent_workspace,out}`.
    pub async fn provision(workspace_root: &Path, session_id: &str) -> Result<Self> {
        let root = workspace_root.join(session_id);
        for sub in ["project_files", "agent_workspace", "out"] {
            tokio::fs::create_dir_all(root.join(sub)).await?;
        }
        Ok(Self {
            session_id: session_id.to_owned(),
            workspace_root: root,
        })
    }

    pub fn session_id(&self) -> &str {
        &self.session_id
    }
}

#[async_trait::async_trait]
impl Sandbox for LocalProcessSandbox {
    async fn execute(&self, cmd: &str, cwd: Option<&str>, timeout: Duration) -> Result<ExecOutcome> {
        let mut command = Command::new("sh");
        command.arg("-c").arg(cmd);
        command.current_dir(self.workspace_root.join(cwd.unwrap_or("agent_workspace")));
        command.stdout(std::process::Stdio::piped());
        command.stderr(std::process::Stdio::piped());

        let child = command
            .spawn()
            .map_err(|e| Error::SandboxUnavailable(format!("failed to spawn command: {e}")))?;

        let output = tokio::time::timeout(timeout, child.wait_with_output())
            .await
            .map_err(|_| Error::ToolTimeout {
                tool: "bash".into(),
                timeout_sec: timeout.as_secs(),
            })?
            .map_err(|e| Error::SandboxUnavailable(format!("command wait failed: {e}")))?;

        Ok(ExecOutcome {
            exit_code: output.status.code().unwrap_or(-1),
            stdout: String::from_utf8_lossy(&output.stdout).into_owned(),
            stderr: String::from_utf8_lossy(&output.stderr).into_owned(),
        })
    }

    async fn read_file(&self, path: &str) -> Result<Vec<u8>> {
        let resolved = crate::file_ops::validate_path(&self.workspace_root, path)
            .map_err(|e| Error::ToolExecution { tool: "file_read".into(), message: e })?;
        tokio::fs::read(resolved).await.map_err(Error::from)
    }

    async fn write_file(&self, path: &str, bytes: &[u8]) -> Result<()> {
        let resolved = crate::file_ops::validate_path(&self.workspace_root, path)
            .map_err(|e| Error::ToolExecution { tool: "file_write".into(), message: e })?;
        if let Some(parent) = resolved.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }
        tokio::fs::write(resolved, bytes).await.map_err(Error::from)
    }

    fn workspace_root(&self) -> &Path {
        &self.workspace_root
    }
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// SandboxManager
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

struct Entry {
    sandbox: Arc<LocalProcessSandbox>,
    last_used: Instant,
}

/// Keyed registry of sandboxes by session id. Creates on demand, reuses
/// existing, destroys on session delete. LRU-evicts idle sandboxes once
/// the configured soft cap is exceeded, never evicting one a caller has
/// marked as having a running task.
pub struct SandboxManager {
    workspace_root: PathBuf,
    soft_cap: usize,
    sandboxes: RwLock<HashMap<String, Entry>>,
}

impl SandboxManager {
    pub fn new(workspace_root: impl Into<PathBuf>, soft_cap: usize) -> Self {
        Self {
            workspace_root: workspace_root.into(),
            soft_cap,
            sandboxes: RwLock::new(HashMap::new()),
        }
    }

    /// Return the existing sandbox for a session, if any.
    pub fn get(&self, session_id: &str) -> Option<Arc<LocalProcessSandbox>> {
        let mut sandboxes = self.sandboxes.write();
        let entry = sandboxes.get_mut(session_id)?;
        entry.last_used = Instant::now();
        Some(entry.sandbox.clone())
    }

    /// Create a new sandbox for a session, provisioning its workspace.
    pub async fn create(&self, session_id: &str) -> Result<Arc<LocalProcessSandbox>> {
        if let Some(existing) = self.get(session_id) {
            return Ok(existing);
        }
        let sandbox = Arc::new(LocalProcessSandbox::provision(&self.workspace_root, session_id).await?);
        self.sandboxes.write().insert(
            session_id.to_owned(),
            Entry {
                sandbox: sandbox.clone(),
                last_used: Instant::now(),
            },
        );
        Ok(sandbox)
    }

    pub fn destroy(&self, session_id: &str) {
        self.sandboxes.write().remove(session_id);
    }

    pub fn len(&self) -> usize {
        self.sandboxes.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.sandboxes.read().is_empty()
    }

    /// Evict idle sandboxes over the soft cap, oldest-`last_used` first.
    /// `busy` lists session ids with a currently running task — never evicted.
    pub fn evict_idle(&self, busy: &std::collections::HashSet<String>) {
        let mut sandboxes = self.sandboxes.write();
        if sandboxes.len() <= self.soft_cap {
            return;
        }
        let mut candidates: Vec<(String, Instant)> = sandboxes
            .iter()
            .filter(|(id, _)| !busy.contains(*id))
            .map(|(id, e)| (id.clone(), e.last_used))
            .collect();
        candidates.sort_by_key(|(_, last_used)| *last_used);

        let over = sandboxes.len() - self.soft_cap;
        for (id, _) in candidates.into_iter().take(over) {
            sandboxes.remove(&id);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[tokio::test]
    async fn create_provisions_workspace_subdirs() {
        let root = TempDir::new().unwrap();
        let manager = SandboxManager::new(root.path(), 10);
        let sandbox = manager.create("s1").await.unwrap();
        assert!(sandbox.workspace_root().join("project_files").is_dir());
        assert!(sandbox.workspace_root().join("agent_workspace").is_dir());
        assert!(sandbox.workspace_root().join("out").is_dir());
    }

    #[tokio::test]
    async fn create_is_idempotent() {
        let root = TempDir::new().unwrap();
        let manager = SandboxManager::new(root.path(), 10);
        let a = manager.create("s1").await.unwrap();
        let b = manager.create("s1").await.unwrap();
        assert_eq!(a.workspace_root(), b.workspace_root());
        assert_eq!(manager.len(), 1);
    }

    #[tokio::test]
    async fn execute_runs_a_command() {
        let root = TempDir::new().unwrap();
        let manager = SandboxManager::new(root.path(), 10);
        let sandbox = manager.create("s1").await.unwrap();
        let out = sandbox
            .execute("echo hello", None, Duration::from_secs(5))
            .await
            .unwrap();
        assert_eq!(out.exit_code, 0);
        assert_eq!(out.stdout.trim(), "hello");
    }

    #[tokio::test]
    async fn execute_times_out() {
        let root = TempDir::new().unwrap();
        let manager = SandboxManager::new(root.path(), 10);
        let sandbox = manager.create("s1").await.unwrap();
        let result = sandbox
            .execute("sleep 5", None, Duration::from_millis(50))
            .await;
        assert!(matches!(result, Err(Error::ToolTimeout { .. })));
    }

    #[tokio::test]
    async fn evict_idle_respects_busy_set() {
        let root = TempDir::new().unwrap();
        let manager = SandboxManager::new(root.path(), 1);
        manager.create("s1").await.unwrap();
        manager.create("s2").await.unwrap();
        let mut busy = std::collections::HashSet::new();
        busy.insert("s1".to_string());
        manager.evict_idle(&busy);
        assert!(manager.get("s1").is_some());
        assert_eq!(manager.len(), 1);
    }
}
