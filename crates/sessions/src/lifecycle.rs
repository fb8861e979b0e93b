//! Session reset lifecycle — idle timeout and a daily reset hour.
//!
//! Checked when a turn resolves its session. If the session is stale
//! (exceeded the idle timeout, or the configured daily reset hour has
//! passed since the session was last touched), the caller mints a new
//! session ID for the same key via `SessionStore::reset_session`.

use chrono::{DateTime, NaiveTime, TimeZone, Utc};

use sa_domain::config::LifecycleConfig;

use crate::store::SessionEntry;

/// Reason a session was reset, if any.
#[derive(Debug, Clone)]
pub enum ResetReason {
    IdleTimeout { idle_minutes: u32 },
    DailyReset { hour: u32 },
}

impl std::fmt::Display for ResetReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::IdleTimeout { idle_minutes } => write!(f, "idle timeout ({idle_minutes}m)"),
            Self::DailyReset { hour } => write!(f, "daily reset ({hour}:00 UTC)"),
        }
    }
}

/// Evaluates whether a session should be reset before a new turn begins.
pub struct LifecycleManager {
    config: LifecycleConfig,
}

impl LifecycleManager {
    pub fn new(config: LifecycleConfig) -> Self {
        Self { config }
    }

    /// Returns `Some(reason)` if `entry` has been idle longer than the
    /// configured timeout, or if the configured daily reset hour has
    /// passed since `entry` was last touched, as of `now`.
    pub fn should_reset(&self, entry: &SessionEntry, now: DateTime<Utc>) -> Option<ResetReason> {
        if let Some(idle_mins) = self.config.idle_minutes {
            let elapsed = now.signed_duration_since(entry.updated_at).num_minutes();
            if elapsed >= idle_mins as i64 {
                return Some(ResetReason::IdleTimeout {
                    idle_minutes: idle_mins,
                });
            }
        }

        if let Some(hour) = self.config.daily_reset_hour {
            if let Some(time) = NaiveTime::from_hms_opt(hour as u32, 0, 0) {
                let boundary = Utc.from_utc_datetime(&now.date_naive().and_time(time));
                if now >= boundary && entry.updated_at < boundary {
                    return Some(ResetReason::DailyReset { hour });
                }
            }
        }

        None
    }
}
