//! Durable storage of messages and tool actions: an append-only JSONL
//! transcript per session, built on [`sa_sessions::TranscriptWriter`].
//! No relational schema is needed here — `TranscriptLine::metadata` is
//! wide enough to carry the message id, completion state, and
//! tool-action records, so the existing transcript format is reused
//! as-is rather than extended.

use std::sync::Arc;

use sa_domain::tool::Message;
use sa_domain::{Error, Result};
use sa_sessions::{TranscriptLine, TranscriptWriter};
use serde::{Deserialize, Serialize};
use serde_json::json;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ToolActionStatus {
    Success,
    Error,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolActionRecord {
    pub id: String,
    pub message_id: String,
    pub tool_name: String,
    pub input: serde_json::Value,
    pub output: Option<String>,
    pub status: ToolActionStatus,
}

/// Durable store of messages and tool actions, with an atomic finalize
/// step mirroring the orchestrator's open/stream/finalize lifecycle.
pub struct MessagePersistence {
    writer: Arc<TranscriptWriter>,
}

impl MessagePersistence {
    pub fn new(writer: Arc<TranscriptWriter>) -> Self {
        Self { writer }
    }

    pub fn persist_user_message(
        &self,
        session_id: &str,
        message_id: &str,
        content: &str,
    ) -> Result<()> {
        let mut line = TranscriptWriter::line("user", content);
        line.metadata = Some(json!({"message_id": message_id, "is_complete": true}));
        self.writer
            .append(session_id, &[line])
            .map_err(|e| Error::Persistence(e.to_string()))
    }

    /// Finalize a successfully completed assistant turn: write the full
    /// buffered content plus any tool actions, then re-read the
    /// transcript and verify the persisted content length matches what
    /// was passed in. A mismatch is a persistence error, not silently
    /// swallowed.
    pub fn finalize_success(
        &self,
        session_id: &str,
        message_id: &str,
        content: &str,
        tool_actions: &[ToolActionRecord],
    ) -> Result<()> {
        let mut lines = Vec::with_capacity(1 + tool_actions.len());

        let mut assistant_line = TranscriptWriter::line("assistant", content);
        assistant_line.metadata = Some(json!({"message_id": message_id, "is_complete": true}));
        lines.push(assistant_line);

        for action in tool_actions {
            let mut line =
                TranscriptWriter::line("tool_action", action.output.clone().unwrap_or_default());
            line.metadata = Some(json!({
                "message_id": message_id,
                "tool_action": action,
            }));
            lines.push(line);
        }

        self.writer
            .append(session_id, &lines)
            .map_err(|e| Error::Persistence(e.to_string()))?;

        let persisted = self.read_transcript(session_id)?;
        let stored_len = persisted
            .iter()
            .rev()
            .find(|l| {
                l.role == "assistant"
                    && l.metadata
                        .as_ref()
                        .and_then(|m| m.get("message_id"))
                        .and_then(|v| v.as_str())
                        == Some(message_id)
            })
            .map(|l| l.content.len());

        match stored_len {
            Some(len) if len == content.len() => Ok(()),
            Some(len) => Err(Error::Persistence(format!(
                "verify failed for message {message_id}: expected {} bytes, found {len}",
                content.len()
            ))),
            None => Err(Error::Persistence(format!(
                "verify failed for message {message_id}: not found after append"
            ))),
        }
    }

    /// Finalize a cancelled turn. If partial content was streamed it is
    /// preserved with `cancelled: true` metadata; an empty turn is
    /// persisted as incomplete rather than invented out of nothing.
    pub fn finalize_cancelled(
        &self,
        session_id: &str,
        message_id: &str,
        content: &str,
    ) -> Result<()> {
        let mut line = TranscriptWriter::line("assistant", content);
        line.metadata = Some(json!({
            "message_id": message_id,
            "is_complete": !content.is_empty(),
            "cancelled": true,
        }));
        self.writer
            .append(session_id, &[line])
            .map_err(|e| Error::Persistence(e.to_string()))
    }

    /// Finalize a turn that ended in a model/transport error. The row is
    /// left `is_complete: false` so readers skip it by the completeness
    /// invariant; it's cleanable later via an explicit maintenance pass.
    pub fn finalize_error(
        &self,
        session_id: &str,
        message_id: &str,
        partial_content: &str,
        error: &str,
    ) -> Result<()> {
        let mut line = TranscriptWriter::line("assistant", partial_content);
        line.metadata = Some(json!({
            "message_id": message_id,
            "is_complete": false,
            "error": error,
        }));
        self.writer
            .append(session_id, &[line])
            .map_err(|e| Error::Persistence(e.to_string()))
    }

    pub fn read_transcript(&self, session_id: &str) -> Result<Vec<TranscriptLine>> {
        self.writer
            .read(session_id)
            .map_err(|e| Error::Persistence(e.to_string()))
    }

    /// Reconstruct prior turns as `Message` values for the next turn's
    /// context window. Only turns the completeness invariant treats as
    /// visible (`is_complete` true or absent, non-empty content) are
    /// included; tool-action lines are not replayed as messages since
    /// they're folded into the synthetic user turn the loop already
    /// injected during the original run.
    pub fn load_history(&self, session_id: &str) -> Result<Vec<Message>> {
        let lines = self.read_transcript(session_id)?;
        let mut history = Vec::new();
        for line in lines {
            let is_complete = line
                .metadata
                .as_ref()
                .and_then(|m| m.get("is_complete"))
                .and_then(|v| v.as_bool())
                .unwrap_or(true);
            if !is_complete || line.content.is_empty() {
                continue;
            }
            match line.role.as_str() {
                "user" => history.push(Message::user(line.content)),
                "assistant" => history.push(Message::assistant(line.content)),
                _ => {}
            }
        }
        Ok(history)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn persistence() -> (TempDir, MessagePersistence) {
        let dir = TempDir::new().unwrap();
        let writer = Arc::new(TranscriptWriter::new(dir.path()));
        (dir, MessagePersistence::new(writer))
    }

    #[test]
    fn finalize_success_verifies_content_length() {
        let (_dir, p) = persistence();
        p.persist_user_message("s1", "u1", "hi").unwrap();
        p.finalize_success("s1", "m1", "hello there", &[]).unwrap();

        let history = p.load_history("s1").unwrap();
        assert_eq!(history.len(), 2);
    }

    #[test]
    fn finalize_error_leaves_message_incomplete_and_excluded_from_history() {
        let (_dir, p) = persistence();
        p.finalize_error("s1", "m1", "partial", "model stream failed")
            .unwrap();

        let history = p.load_history("s1").unwrap();
        assert!(history.is_empty());
    }

    #[test]
    fn finalize_cancelled_with_content_is_visible() {
        let (_dir, p) = persistence();
        p.finalize_cancelled("s1", "m1", "partial answer").unwrap();

        let history = p.load_history("s1").unwrap();
        assert_eq!(history.len(), 1);
    }

    #[test]
    fn tool_actions_are_persisted_alongside_the_message() {
        let (_dir, p) = persistence();
        let actions = vec![ToolActionRecord {
            id: "a1".into(),
            message_id: "m1".into(),
            tool_name: "bash".into(),
            input: json!({"command": "ls"}),
            output: Some("file.txt".into()),
            status: ToolActionStatus::Success,
        }];
        p.finalize_success("s1", "m1", "done", &actions).unwrap();

        let lines = p.read_transcript("s1").unwrap();
        assert!(lines.iter().any(|l| l.role == "tool_action"));
    }
}
