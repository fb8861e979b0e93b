//! Error taxonomy shared across crates.
//!
//! `Display` messages are written to be client-safe: full chains and
//! internal detail belong in `tracing::error!`, never in what a transport
//! forwards to a client.

/// Shared error type used across all SerialAgent crates.
#[derive(thiserror::Error, Debug)]
pub enum Error {
    #[error("IO: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON: {0}")]
    Json(#[from] serde_json::Error),

    #[error("HTTP: {0}")]
    Http(String),

    #[error("timeout: {0}")]
    Timeout(String),

    #[error("provider {provider}: {message}")]
    Provider { provider: String, message: String },

    #[error("config: {0}")]
    Config(String),

    #[error("auth: {0}")]
    Auth(String),

    /// `LanguageModel::stream` failed. Fatal to the turn: the loop emits
    /// `LoopEvent::Error` and does not retry automatically.
    #[error("model transport error: {0}")]
    ModelTransport(String),

    /// A tool's execution failed. Surfaced as a failed observation; the
    /// loop continues — this is data, not control flow.
    #[error("tool '{tool}' failed: {message}")]
    ToolExecution { tool: String, message: String },

    /// A tool invocation exceeded its deadline. The message is deterministic
    /// so repeated failures read identically in the transcript.
    #[error("tool '{tool}' timed out after {timeout_sec}s")]
    ToolTimeout { tool: String, timeout_sec: u64 },

    /// Tool-call arguments could not be parsed as JSON. The loop treats
    /// this as an empty argument object and continues.
    #[error("could not parse tool arguments: {0}")]
    ArgumentParse(String),

    /// `SandboxManager::get`/`create` failed. Fatal to the turn.
    #[error("sandbox unavailable: {0}")]
    SandboxUnavailable(String),

    /// `MessageOrchestrator::finalize` failed (write or verify-by-reread).
    #[error("persistence error: {0}")]
    Persistence(String),

    /// The cancel signal fired, or the task handle was aborted.
    #[error("cancelled")]
    Cancelled,

    /// The loop ran `MaxIterations` steps without producing a final answer.
    #[error("reached maximum iterations ({0})")]
    MaxIterationsExceeded(usize),

    #[error("{0}")]
    Other(String),
}

pub type Result<T> = std::result::Result<T, Error>;
