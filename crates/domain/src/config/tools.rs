use serde::{Deserialize, Serialize};

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Tools (bash / file / search)
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// Configuration for the built-in tool set.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ToolsConfig {
    #[serde(default)]
    pub exec: ExecConfig,
    #[serde(default)]
    pub exec_security: ExecSecurityConfig,
    #[serde(default)]
    pub sandbox: SandboxConfig,
}

/// `SandboxManager` pool sizing.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SandboxConfig {
    /// Soft cap on live sandboxes kept warm at once; idle ones beyond this
    /// are LRU-evicted (never one with a running task). Overridable by the
    /// `SANDBOX_POOL_SIZE` environment variable.
    #[serde(default = "d_pool_size")]
    pub pool_size: usize,
}

impl Default for SandboxConfig {
    fn default() -> Self {
        Self {
            pool_size: d_pool_size(),
        }
    }
}

fn d_pool_size() -> usize {
    50
}

/// `bash` tool configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExecConfig {
    /// Hard timeout for a command, used when the tool call doesn't
    /// override it.
    #[serde(default = "d_30")]
    pub timeout_sec: u64,
    /// Max output chars captured from stdout+stderr combined; output
    /// beyond this is truncated with a marker.
    #[serde(default = "d_200000")]
    pub max_output_chars: usize,
}

impl Default for ExecConfig {
    fn default() -> Self {
        Self {
            timeout_sec: 30,
            max_output_chars: 200_000,
        }
    }
}

/// Security configuration for the `bash` tool — audit logging and command denylist.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExecSecurityConfig {
    /// Log every exec invocation at INFO level.
    #[serde(default = "d_true")]
    pub audit_log: bool,
    /// Regex patterns that are denied. Commands matching any pattern are
    /// rejected before the sandbox runs them, and the tool returns a
    /// failed observation.
    #[serde(default = "d_denied_patterns")]
    pub denied_patterns: Vec<String>,
}

impl Default for ExecSecurityConfig {
    fn default() -> Self {
        Self {
            audit_log: true,
            denied_patterns: d_denied_patterns(),
        }
    }
}

// ── serde default helpers ───────────────────────────────────────────

fn d_30() -> u64 {
    30
}
fn d_200000() -> usize {
    200_000
}
fn d_true() -> bool {
    true
}
fn d_denied_patterns() -> Vec<String> {
    vec![
        r"rm\s+-rf\s+/".into(),
        r"mkfs\.".into(),
        r"dd\s+if=.+of=/dev/".into(),
    ]
}
