//! Glue between the agent loop, the streaming buffer, the event bus,
//! and durable persistence. Owns the assistant-message lifecycle:
//! open (insert an incomplete row, start buffering, register the
//! task) → stream (append chunks, record actions/observations) →
//! finalize (copy buffered content into durable storage exactly once,
//! verify it, clean up in-memory state). A durable message is either
//! `is_complete: true` with full content, or `is_complete: false` —
//! there is no visible intermediate state.

use std::sync::Arc;

use serde_json::{json, Value};
use tokio::task::JoinHandle;
use uuid::Uuid;

use sa_domain::Result;

use super::event_bus::EventBus;
use super::persistence::{MessagePersistence, ToolActionRecord};
use super::streaming_buffer::StreamingBuffer;
use super::task_registry::{CancelToken, TaskRegistry};

fn turn_tag(session_id: &str) -> String {
    format!("turn:{session_id}")
}

/// Coordinates a single turn's visible lifecycle on top of the shared
/// runtime singletons.
pub struct MessageOrchestrator {
    buffer: Arc<StreamingBuffer>,
    tasks: Arc<TaskRegistry>,
    events: Arc<EventBus>,
    persistence: Arc<MessagePersistence>,
}

impl MessageOrchestrator {
    pub fn new(
        buffer: Arc<StreamingBuffer>,
        tasks: Arc<TaskRegistry>,
        events: Arc<EventBus>,
        persistence: Arc<MessagePersistence>,
    ) -> Self {
        Self {
            buffer,
            tasks,
            events,
            persistence,
        }
    }

    fn emit(&self, session_id: &str, payload: Value) {
        self.events.emit(turn_tag(session_id), payload);
    }

    /// Open a new turn: persist the user's message, mint an assistant
    /// message id, start its buffer, and emit `user_message_saved` +
    /// `start`. Does not register a running task — the caller spawns the
    /// agent-loop task itself (it alone has the resulting `JoinHandle`)
    /// and registers it via [`Self::register_task`] right after.
    pub fn open(&self, session_id: &str, user_content: &str) -> Result<String> {
        let user_message_id = Uuid::new_v4().to_string();
        self.persistence
            .persist_user_message(session_id, &user_message_id, user_content)?;
        self.emit(
            session_id,
            json!({"type": "user_message_saved", "message_id": user_message_id}),
        );

        let message_id = Uuid::new_v4().to_string();
        self.buffer.start(&message_id);
        self.emit(session_id, json!({"type": "start"}));
        Ok(message_id)
    }

    /// Register the just-spawned loop task so it can be looked up and
    /// cancelled through the [`TaskRegistry`].
    pub fn register_task(
        &self,
        session_id: &str,
        message_id: String,
        handle: JoinHandle<()>,
        cancel: CancelToken,
    ) {
        self.tasks.register(session_id, message_id, handle, cancel);
    }

    pub fn chunk(&self, session_id: &str, message_id: &str, text: &str) {
        self.buffer.append(message_id, text);
        self.emit(session_id, json!({"type": "chunk", "content": text}));
    }

    pub fn thought(&self, session_id: &str, text: &str) {
        self.emit(session_id, json!({"type": "thought", "content": text}));
    }

    pub fn action(&self, session_id: &str, tool: &str, args: &Value, step: usize) {
        self.emit(
            session_id,
            json!({"type": "action", "tool": tool, "args": args, "step": step}),
        );
    }

    pub fn observation(&self, session_id: &str, content: &str, success: bool, step: usize) {
        self.emit(
            session_id,
            json!({"type": "observation", "content": content, "success": success, "step": step}),
        );
    }

    pub fn cancel_acknowledged(&self, session_id: &str) {
        self.emit(session_id, json!({"type": "cancel_acknowledged"}));
    }

    /// Finalize a turn that completed normally: write the buffered
    /// content plus tool actions to durable storage exactly once,
    /// verify it landed, then clean up in-memory state.
    ///
    /// Every finalize path first claims `message_id` from the task
    /// registry; only the caller that wins the claim persists and emits
    /// `end`. This is what keeps a WS cancel racing the loop's own
    /// terminal event from finalizing the same message twice.
    pub fn finalize_success(
        &self,
        session_id: &str,
        message_id: &str,
        tool_actions: &[ToolActionRecord],
    ) {
        if !self.tasks.try_claim_finalize(session_id, message_id) {
            tracing::debug!(session_id, message_id, "finalize_success: already finalized, skipping");
            return;
        }
        let content = self.buffer.content(message_id).unwrap_or_default();
        match self
            .persistence
            .finalize_success(session_id, message_id, &content, tool_actions)
        {
            Ok(()) => {
                self.emit(session_id, json!({"type": "persist_success"}));
                self.buffer.complete(message_id);
                self.buffer.cleanup(message_id);
                self.emit(session_id, json!({"type": "end", "message_id": message_id}));
            }
            Err(e) => {
                tracing::error!(session_id, message_id, error = %e, "persist_failure on finalize");
                self.emit(session_id, json!({"type": "persist_failure", "content": e.to_string()}));
                self.buffer.cleanup(message_id);
                self.emit(session_id, json!({"type": "end", "error": true}));
            }
        }
    }

    /// Finalize a cancelled turn. Partial content (if any) is preserved
    /// with `cancelled: true` metadata. No-ops if `message_id` was
    /// already finalized by the loop itself (see [`Self::finalize_success`]).
    pub fn finalize_cancelled(&self, session_id: &str, message_id: &str) {
        if !self.tasks.try_claim_finalize(session_id, message_id) {
            tracing::debug!(session_id, message_id, "finalize_cancelled: already finalized, skipping");
            return;
        }
        let content = self.buffer.content(message_id).unwrap_or_default();
        if let Err(e) = self
            .persistence
            .finalize_cancelled(session_id, message_id, &content)
        {
            tracing::error!(session_id, message_id, error = %e, "persist_failure on cancel");
        }
        self.emit(
            session_id,
            json!({"type": "cancelled", "content": "Response cancelled by user", "partial_content": content}),
        );
        self.buffer.cleanup(message_id);
        self.emit(session_id, json!({"type": "end", "cancelled": true}));
    }

    /// Finalize a turn that ended due to a model/transport error. The
    /// row is left `is_complete: false` in durable storage.
    pub fn finalize_error(&self, session_id: &str, message_id: &str, error: &str) {
        if !self.tasks.try_claim_finalize(session_id, message_id) {
            tracing::debug!(session_id, message_id, "finalize_error: already finalized, skipping");
            return;
        }
        let partial = self.buffer.content(message_id).unwrap_or_default();
        if let Err(e) = self
            .persistence
            .finalize_error(session_id, message_id, &partial, error)
        {
            tracing::error!(session_id, message_id, error = %e, "persist_failure on error finalize");
        }
        self.emit(session_id, json!({"type": "error", "content": error}));
        self.buffer.cleanup(message_id);
        self.emit(session_id, json!({"type": "end", "error": true}));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::runtime::persistence::MessagePersistence;
    use sa_sessions::TranscriptWriter;
    use tempfile::TempDir;

    fn orchestrator() -> (TempDir, MessageOrchestrator) {
        let dir = TempDir::new().unwrap();
        let writer = Arc::new(TranscriptWriter::new(dir.path()));
        let persistence = Arc::new(MessagePersistence::new(writer));
        let orch = MessageOrchestrator::new(
            Arc::new(StreamingBuffer::new()),
            Arc::new(TaskRegistry::new()),
            Arc::new(EventBus::new()),
            persistence,
        );
        (dir, orch)
    }

    #[tokio::test]
    async fn open_stream_finalize_success_persists_full_content() {
        let (_dir, orch) = orchestrator();
        let message_id = orch.open("s1", "hi there").unwrap();
        let cancel = CancelToken::new();
        let handle = tokio::spawn(async {});
        orch.register_task("s1", message_id.clone(), handle, cancel);

        orch.chunk("s1", &message_id, "Hello");
        orch.chunk("s1", &message_id, ", world!");
        orch.finalize_success("s1", &message_id, &[]);

        let history = orch.persistence.load_history("s1").unwrap();
        assert!(history.iter().any(|m| matches!(
            &m.content,
            sa_domain::tool::MessageContent::Text(t) if t == "Hello, world!"
        )));
    }

    #[tokio::test]
    async fn finalize_cancelled_preserves_partial_content() {
        let (_dir, orch) = orchestrator();
        let message_id = orch.open("s1", "write an essay").unwrap();
        let cancel = CancelToken::new();
        let handle = tokio::spawn(async {});
        orch.register_task("s1", message_id.clone(), handle, cancel);

        orch.chunk("s1", &message_id, "Once upon");
        orch.finalize_cancelled("s1", &message_id);

        assert!(orch.tasks.get("s1").is_none());
    }
}
