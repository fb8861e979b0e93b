//! In-memory accumulator of assistant message text chunks, keyed by
//! message id. This is the sole mutable owner of in-flight content until
//! [`MessageOrchestrator`](crate::runtime::message_orchestrator::MessageOrchestrator)
//! copies it into durable storage at finalize time. Never talks to disk.

use std::collections::HashMap;
use std::time::Instant;

use parking_lot::RwLock;
use serde::Serialize;

const DEFAULT_MAX_CHUNKS: usize = 10_000;
const DEFAULT_TRUNCATE_TO: usize = 1_000;

#[derive(Debug, Clone, Serialize)]
pub struct StreamingMeta {
    pub message_id: String,
    pub chunk_count: usize,
    pub byte_count: usize,
    pub is_streaming: bool,
    #[serde(skip)]
    pub start_time: Instant,
    pub error: Option<String>,
}

struct BufferEntry {
    chunks: Vec<String>,
    meta: StreamingMeta,
}

/// Per-message chunk buffer with a soft overflow policy: once the
/// in-memory chunk list exceeds `max_chunks`, it's truncated down to
/// the most recent `truncate_to` chunks so a runaway stream can't grow
/// unbounded, while `chunk_count`/`byte_count` keep tracking all-time
/// totals for diagnostics.
pub struct StreamingBuffer {
    max_chunks: usize,
    truncate_to: usize,
    buffers: RwLock<HashMap<String, BufferEntry>>,
}

impl StreamingBuffer {
    pub fn new() -> Self {
        Self::with_limits(DEFAULT_MAX_CHUNKS, DEFAULT_TRUNCATE_TO)
    }

    pub fn with_limits(max_chunks: usize, truncate_to: usize) -> Self {
        Self {
            max_chunks,
            truncate_to,
            buffers: RwLock::new(HashMap::new()),
        }
    }

    pub fn start(&self, message_id: &str) {
        self.buffers.write().insert(
            message_id.to_string(),
            BufferEntry {
                chunks: Vec::new(),
                meta: StreamingMeta {
                    message_id: message_id.to_string(),
                    chunk_count: 0,
                    byte_count: 0,
                    is_streaming: true,
                    start_time: Instant::now(),
                    error: None,
                },
            },
        );
    }

    pub fn append(&self, message_id: &str, chunk: &str) {
        let mut buffers = self.buffers.write();
        if let Some(entry) = buffers.get_mut(message_id) {
            entry.chunks.push(chunk.to_string());
            entry.meta.chunk_count += 1;
            entry.meta.byte_count += chunk.len();
            if entry.chunks.len() > self.max_chunks {
                let drop_to = entry.chunks.len() - self.truncate_to;
                entry.chunks.drain(0..drop_to);
            }
        }
    }

    pub fn mark_error(&self, message_id: &str, error: impl Into<String>) {
        if let Some(entry) = self.buffers.write().get_mut(message_id) {
            entry.meta.error = Some(error.into());
            entry.meta.is_streaming = false;
        }
    }

    pub fn complete(&self, message_id: &str) {
        if let Some(entry) = self.buffers.write().get_mut(message_id) {
            entry.meta.is_streaming = false;
        }
    }

    /// Full buffered content so far (may be a truncated tail if the
    /// overflow policy kicked in).
    pub fn content(&self, message_id: &str) -> Option<String> {
        self.buffers
            .read()
            .get(message_id)
            .map(|e| e.chunks.concat())
    }

    pub fn get_since(&self, message_id: &str, index: usize) -> Vec<String> {
        self.buffers
            .read()
            .get(message_id)
            .map(|e| e.chunks.iter().skip(index).cloned().collect())
            .unwrap_or_default()
    }

    pub fn meta(&self, message_id: &str) -> Option<StreamingMeta> {
        self.buffers.read().get(message_id).map(|e| e.meta.clone())
    }

    pub fn cleanup(&self, message_id: &str) {
        self.buffers.write().remove(message_id);
    }
}

impl Default for StreamingBuffer {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn accumulates_and_reports_content() {
        let buf = StreamingBuffer::new();
        buf.start("m1");
        buf.append("m1", "Hello, ");
        buf.append("m1", "world!");
        assert_eq!(buf.content("m1").unwrap(), "Hello, world!");
        let meta = buf.meta("m1").unwrap();
        assert_eq!(meta.chunk_count, 2);
        assert_eq!(meta.byte_count, "Hello, world!".len());
    }

    #[test]
    fn overflow_truncates_but_keeps_counting() {
        let buf = StreamingBuffer::with_limits(5, 2);
        buf.start("m1");
        for i in 0..10 {
            buf.append("m1", &i.to_string());
        }
        let meta = buf.meta("m1").unwrap();
        assert_eq!(meta.chunk_count, 10);
        // only the last 2 chunks survive in the tail buffer
        assert_eq!(buf.content("m1").unwrap(), "89");
    }

    #[test]
    fn cleanup_removes_buffer() {
        let buf = StreamingBuffer::new();
        buf.start("m1");
        buf.cleanup("m1");
        assert!(buf.content("m1").is_none());
    }
}
