//! Built-in tools and sandbox for SerialAgent's agent loop: `bash`,
//! `file_read`/`file_write`/`file_edit`, `search`, `ast_search`, and
//! `setup_environment`, each bound to a specific sandbox instance at
//! registration time.

pub mod ast_search;
pub mod exec;
pub mod file_ops;
pub mod registry;
pub mod sandbox;
pub mod search;

pub use exec::DenyList;
pub use registry::{Tool, ToolOutcome, ToolRegistry};
pub use sandbox::{ExecOutcome, LocalProcessSandbox, Sandbox, SandboxManager};
