//! The agent runtime: everything that exists between an HTTP/WebSocket
//! request landing and an assistant message being durably persisted.
//!
//! [`agent_loop`] drives the reasoning/tool loop for a single turn.
//! [`message_orchestrator`] owns the visible open/stream/finalize
//! lifecycle on top of three shared singletons: [`streaming_buffer`]
//! (in-memory content while a turn is in flight), [`task_registry`]
//! (which session has a turn running, and how to cancel it), and
//! [`event_bus`] (fan-out to whatever transport is listening).
//! [`persistence`] is the durable store for messages; [`run_store`] is
//! a separate, append-only record of each turn's execution (model/tool
//! steps) used for `/v1/runs` introspection. [`tools`] builds the
//! per-session `ToolRegistry` the loop dispatches against.

pub mod agent_loop;
pub mod event_bus;
pub mod message_orchestrator;
pub mod persistence;
pub mod run_store;
pub mod streaming_buffer;
pub mod task_registry;
pub mod tools;
pub mod turn;

pub use agent_loop::{LoopContext, LoopEvent};
pub use event_bus::{EventBus, SubscriptionId};
pub use message_orchestrator::MessageOrchestrator;
pub use persistence::{MessagePersistence, ToolActionRecord, ToolActionStatus};
pub use run_store::{NodeKind, Run, RunEvent, RunNode, RunStatus, RunStore};
pub use streaming_buffer::StreamingBuffer;
pub use task_registry::{CancelToken, TaskRegistry, TaskStatus};
pub use turn::spawn_turn;

/// Truncate `s` at `max` bytes, backing up to the nearest preceding char
/// boundary so multi-byte UTF-8 is never split, and append `"..."` when
/// truncation actually occurred.
pub(crate) fn truncate_str(s: &str, max: usize) -> String {
    if s.len() <= max {
        s.to_string()
    } else {
        let mut end = max;
        while !s.is_char_boundary(end) && end > 0 {
            end -= 1;
        }
        format!("{}...", &s[..end])
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn truncate_str_empty() {
        assert_eq!(truncate_str("", 10), "");
    }

    #[test]
    fn truncate_str_within_limit() {
        assert_eq!(truncate_str("hello", 10), "hello");
    }

    #[test]
    fn truncate_str_exact_boundary() {
        assert_eq!(truncate_str("hello", 5), "hello");
    }

    #[test]
    fn truncate_str_ascii_over_limit() {
        assert_eq!(truncate_str("hello world", 5), "hello...");
    }

    #[test]
    fn truncate_str_multibyte_utf8_no_split() {
        let s = "h\u{00e9}llo";
        let result = truncate_str(s, 2);
        assert_eq!(result, "h...");
    }

    #[test]
    fn truncate_str_emoji_boundary() {
        let s = "\u{1F600}abc";
        let result = truncate_str(s, 3);
        assert_eq!(result, "...");
    }

    #[test]
    fn truncate_str_max_zero() {
        let result = truncate_str("abc", 0);
        assert_eq!(result, "...");
    }
}
