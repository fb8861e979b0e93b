//! Session key resolution.
//!
//! A session key is either supplied explicitly by the client (the
//! `session_key` field on a `ChatRequest`, or a value carried by the
//! transport) or defaults to `agent:<agentId>:main` — there is exactly
//! one conversation per key, no per-channel/per-peer routing.

/// Resolve the session key to use for a turn: the client-supplied value
/// if present and non-empty, otherwise the agent's default main key.
pub fn resolve_session_key(agent_id: &str, explicit: Option<&str>) -> String {
    match explicit {
        Some(key) if !key.trim().is_empty() => key.to_owned(),
        _ => default_session_key(agent_id),
    }
}

/// The default session key for an agent: `agent:<agentId>:main`.
pub fn default_session_key(agent_id: &str) -> String {
    format!("agent:{agent_id}:main")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn explicit_key_is_used_verbatim() {
        assert_eq!(
            resolve_session_key("bot1", Some("custom-key")),
            "custom-key"
        );
    }

    #[test]
    fn missing_key_falls_back_to_default() {
        assert_eq!(resolve_session_key("bot1", None), "agent:bot1:main");
    }

    #[test]
    fn blank_key_falls_back_to_default() {
        assert_eq!(resolve_session_key("bot1", Some("   ")), "agent:bot1:main");
    }

    #[test]
    fn default_session_key_format() {
        assert_eq!(default_session_key("serial-agent"), "agent:serial-agent:main");
    }
}
