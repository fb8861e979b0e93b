use serde::{Deserialize, Serialize};

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Sessions
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// Session configuration.
///
/// A `sessionKey` is either supplied by the client in the `message` frame
/// or defaults to `agent:<agent_id>:main` — there is no multi-channel
/// routing here, one WebSocket (or `/v1/chat` caller) maps to one key.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionsConfig {
    /// Unique ID for this agent instance. Used to build the default
    /// session key when a client doesn't supply one.
    #[serde(default = "d_agent_id")]
    pub agent_id: String,

    /// Session lifecycle rules (idle reset).
    #[serde(default)]
    pub lifecycle: LifecycleConfig,
}

impl Default for SessionsConfig {
    fn default() -> Self {
        Self {
            agent_id: d_agent_id(),
            lifecycle: LifecycleConfig::default(),
        }
    }
}

/// Session lifecycle rules.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LifecycleConfig {
    /// Daily reset hour (0–23, local gateway time). `None` disables daily reset.
    #[serde(default)]
    pub daily_reset_hour: Option<u8>,

    /// Idle timeout in minutes. If the last message was more than this many
    /// minutes ago, the session is reset on the next inbound message.
    #[serde(default)]
    pub idle_minutes: Option<u32>,
}

impl Default for LifecycleConfig {
    fn default() -> Self {
        Self {
            daily_reset_hour: None,
            idle_minutes: None,
        }
    }
}

// ── serde default helpers ───────────────────────────────────────────

fn d_agent_id() -> String {
    "serial-agent".into()
}
