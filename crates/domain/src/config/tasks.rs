use serde::{Deserialize, Serialize};

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Agent task configuration
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// Configuration for `AgentLoop` and the process-wide `TaskRegistry`.
///
/// There is at most one running task per session — a new turn cancels
/// and replaces any task still running for the same session key.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AgentTaskConfig {
    /// Upper bound on think-act-observe steps before the loop gives up
    /// and emits an explanatory final answer.
    #[serde(default = "d_max_iterations")]
    pub max_iterations: usize,
    /// Timeout applied to each tool invocation, independent of the
    /// tool's own configured timeout (whichever is tighter wins).
    #[serde(default = "d_tool_timeout_sec")]
    pub tool_timeout_sec: u64,
    /// How long a completed/cancelled task entry lingers in the
    /// registry before `gc` removes it.
    #[serde(default = "d_gc_max_age_sec")]
    pub gc_max_age_sec: u64,
}

impl Default for AgentTaskConfig {
    fn default() -> Self {
        Self {
            max_iterations: d_max_iterations(),
            tool_timeout_sec: d_tool_timeout_sec(),
            gc_max_age_sec: d_gc_max_age_sec(),
        }
    }
}

fn d_max_iterations() -> usize {
    10
}
fn d_tool_timeout_sec() -> u64 {
    60
}
fn d_gc_max_age_sec() -> u64 {
    3600
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_spec() {
        let cfg = AgentTaskConfig::default();
        assert_eq!(cfg.max_iterations, 10);
        assert_eq!(cfg.tool_timeout_sec, 60);
        assert_eq!(cfg.gc_max_age_sec, 3600);
    }

    #[test]
    fn deserialize_missing_fields_uses_defaults() {
        let cfg: AgentTaskConfig = serde_json::from_str("{}").unwrap();
        assert_eq!(cfg.max_iterations, 10);
    }

    #[test]
    fn serde_roundtrip() {
        let cfg = AgentTaskConfig {
            max_iterations: 5,
            tool_timeout_sec: 15,
            gc_max_age_sec: 120,
        };
        let json = serde_json::to_string(&cfg).unwrap();
        let back: AgentTaskConfig = serde_json::from_str(&json).unwrap();
        assert_eq!(back.max_iterations, 5);
        assert_eq!(back.tool_timeout_sec, 15);
        assert_eq!(back.gc_max_age_sec, 120);
    }
}
