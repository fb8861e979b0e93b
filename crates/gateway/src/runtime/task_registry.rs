//! Process-wide registry mapping a session id to the currently running
//! agent task, decoupled from whatever client connection kicked it off.
//! A disconnect never ends the loop; a reconnecting client looks the
//! task up here and resumes streaming from the
//! [`StreamingBuffer`](crate::runtime::streaming_buffer::StreamingBuffer)
//! at a known chunk index. At most one task per session may be running.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use parking_lot::RwLock;
use tokio::task::JoinHandle;

/// Cooperative, idempotent cancellation flag shared between the task
/// that owns the agent loop and whoever requests cancellation.
#[derive(Clone)]
pub struct CancelToken(Arc<AtomicBool>);

impl CancelToken {
    pub fn new() -> Self {
        Self(Arc::new(AtomicBool::new(false)))
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::Release);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::Acquire)
    }
}

impl Default for CancelToken {
    fn default() -> Self {
        Self::new()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskStatus {
    Running,
    Completed,
    Error,
    Cancelled,
}

struct AgentTask {
    message_id: String,
    cancel: CancelToken,
    handle: JoinHandle<()>,
    status: TaskStatus,
    created_at: Instant,
}

/// Read-only projection of an [`AgentTask`] safe to hand out to API
/// callers (the raw entry holds a non-`Clone` `JoinHandle`).
#[derive(Debug, Clone, serde::Serialize)]
pub struct TaskSnapshot {
    pub session_id: String,
    pub message_id: String,
    pub status: TaskStatus,
    pub created_at_secs_ago: u64,
}

/// Process-global singleton: one entry per session, enforcing the
/// at-most-one-running-task-per-session invariant.
pub struct TaskRegistry {
    tasks: RwLock<HashMap<String, AgentTask>>,
}

impl TaskRegistry {
    pub fn new() -> Self {
        Self {
            tasks: RwLock::new(HashMap::new()),
        }
    }

    /// Register a newly spawned task for `session_id`. If a prior task
    /// for this session is still running, it is cancelled and aborted
    /// first so the replacement is the sole running task.
    pub fn register(
        &self,
        session_id: &str,
        message_id: String,
        handle: JoinHandle<()>,
        cancel: CancelToken,
    ) {
        let mut tasks = self.tasks.write();
        if let Some(prev) = tasks.get(session_id) {
            if prev.status == TaskStatus::Running {
                prev.cancel.cancel();
                prev.handle.abort();
            }
        }
        tasks.insert(
            session_id.to_string(),
            AgentTask {
                message_id,
                cancel,
                handle,
                status: TaskStatus::Running,
                created_at: Instant::now(),
            },
        );
    }

    pub fn get(&self, session_id: &str) -> Option<TaskSnapshot> {
        self.tasks.read().get(session_id).map(|t| TaskSnapshot {
            session_id: session_id.to_string(),
            message_id: t.message_id.clone(),
            status: t.status,
            created_at_secs_ago: t.created_at.elapsed().as_secs(),
        })
    }

    /// Signal cancellation and abort the handle for `session_id`'s
    /// running task. Returns `true` if a running task was found.
    pub fn cancel(&self, session_id: &str) -> bool {
        let tasks = self.tasks.read();
        match tasks.get(session_id) {
            Some(t) if t.status == TaskStatus::Running => {
                t.cancel.cancel();
                t.handle.abort();
                true
            }
            _ => false,
        }
    }

    /// Atomically claim the right to finalize `message_id` for
    /// `session_id`, removing the task entry if the claim succeeds. Only
    /// the first caller for a given task wins: a cancel request racing the
    /// loop's own terminal event (`Done`/`Error`/`Cancelled`) sees `false`
    /// and must not finalize a second time.
    pub fn try_claim_finalize(&self, session_id: &str, message_id: &str) -> bool {
        let mut tasks = self.tasks.write();
        match tasks.get(session_id) {
            Some(t) if t.message_id == message_id => {
                tasks.remove(session_id);
                true
            }
            _ => false,
        }
    }

    pub fn mark_completed(&self, session_id: &str, status: TaskStatus) {
        if let Some(t) = self.tasks.write().get_mut(session_id) {
            t.status = status;
        }
    }

    pub fn cleanup(&self, session_id: &str) {
        self.tasks.write().remove(session_id);
    }

    /// Remove finished entries older than `max_age`.
    pub fn gc(&self, max_age: Duration) {
        self.tasks.write().retain(|_, t| {
            !(t.handle.is_finished() && t.created_at.elapsed() > max_age)
        });
    }
}

impl Default for TaskRegistry {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[tokio::test]
    async fn registering_replaces_and_cancels_prior_running_task() {
        let registry = TaskRegistry::new();
        let cancel1 = CancelToken::new();
        let handle1 = tokio::spawn(async {
            tokio::time::sleep(Duration::from_secs(60)).await;
        });
        registry.register("s1", "m1".into(), handle1, cancel1.clone());

        let cancel2 = CancelToken::new();
        let handle2 = tokio::spawn(async {});
        registry.register("s1", "m2".into(), handle2, cancel2);

        assert!(cancel1.is_cancelled());
        assert_eq!(registry.get("s1").unwrap().message_id, "m2");
    }

    #[tokio::test]
    async fn cancel_sets_flag_and_aborts() {
        let registry = TaskRegistry::new();
        let cancel = CancelToken::new();
        let handle = tokio::spawn(async {
            tokio::time::sleep(Duration::from_secs(60)).await;
        });
        registry.register("s1", "m1".into(), handle, cancel.clone());

        assert!(registry.cancel("s1"));
        assert!(cancel.is_cancelled());
    }

    #[tokio::test]
    async fn at_most_one_running_per_session() {
        let registry = TaskRegistry::new();
        for i in 0..3 {
            let cancel = CancelToken::new();
            let handle = tokio::spawn(async {
                tokio::time::sleep(Duration::from_secs(60)).await;
            });
            registry.register("s1", format!("m{i}"), handle, cancel);
        }
        assert_eq!(registry.get("s1").unwrap().message_id, "m2");
    }

    #[tokio::test]
    async fn try_claim_finalize_wins_once_and_removes_entry() {
        let registry = TaskRegistry::new();
        let cancel = CancelToken::new();
        let handle = tokio::spawn(async {});
        registry.register("s1", "m1".into(), handle, cancel);

        assert!(registry.try_claim_finalize("s1", "m1"));
        assert!(!registry.try_claim_finalize("s1", "m1"));
        assert!(registry.get("s1").is_none());
    }

    #[tokio::test]
    async fn try_claim_finalize_rejects_stale_message_id() {
        let registry = TaskRegistry::new();
        let cancel = CancelToken::new();
        let handle = tokio::spawn(async {});
        registry.register("s1", "m1".into(), handle, cancel);

        assert!(!registry.try_claim_finalize("s1", "m0"));
        assert!(registry.get("s1").is_some());
    }

    #[tokio::test]
    async fn gc_removes_old_finished_tasks() {
        let registry = TaskRegistry::new();
        let cancel = CancelToken::new();
        let handle = tokio::spawn(async {});
        registry.register("s1", "m1".into(), handle, cancel);
        registry.mark_completed("s1", TaskStatus::Completed);

        tokio::time::sleep(Duration::from_millis(20)).await;
        registry.gc(Duration::from_millis(0));

        assert!(registry.get("s1").is_none());
    }
}
