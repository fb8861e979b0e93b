//! Session management for SerialAgent: a session key maps to a durable
//! session index entry plus an append-only JSONL transcript, with idle
//! reset.

pub mod lifecycle;
pub mod session_key;
pub mod store;
pub mod transcript;

pub use lifecycle::LifecycleManager;
pub use session_key::{default_session_key, resolve_session_key};
pub use store::{SessionEntry, SessionStore};
pub use transcript::{TranscriptLine, TranscriptWriter};
