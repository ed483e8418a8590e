use std::time::Duration as StdDuration;

use time::Duration;

use crate::config::AppConfig;

/// Default trailing window inside which two reports of the same
/// `(moderator, target)` pair are treated as one ban.
pub const DEFAULT_DEDUP_WINDOW_SECONDS: i64 = 30;

/// Tuning for the quota engine itself.
#[derive(Debug, Clone, Copy)]
pub struct EngineSettings {
    pub dedup_window: Duration,
    /// The platform account the engine acts through. Audit entries attributed
    /// to it are the command path's own bans and are already reported.
    pub engine_member_id: Option<i64>,
}

impl Default for EngineSettings {
    fn default() -> Self {
        Self {
            dedup_window: Duration::seconds(DEFAULT_DEDUP_WINDOW_SECONDS),
            engine_member_id: None,
        }
    }
}

impl EngineSettings {
    pub fn from_config(config: &AppConfig) -> Self {
        Self {
            dedup_window: Duration::seconds(config.dedup_window_seconds),
            engine_member_id: None,
        }
    }

    pub fn with_engine_member(mut self, member_id: i64) -> Self {
        self.engine_member_id = Some(member_id);
        self
    }
}

/// Cadence of the audit-trail poller.
#[derive(Debug, Clone, Copy)]
pub struct ListenerSettings {
    pub poll_interval: StdDuration,
    pub poll_limit: u8,
    /// Entries older than startup minus this are skipped on the first poll.
    pub backlog_window: Duration,
}

impl ListenerSettings {
    pub fn from_config(config: &AppConfig) -> Self {
        Self {
            poll_interval: StdDuration::from_secs(config.audit_poll_seconds),
            poll_limit: config.audit_poll_limit,
            backlog_window: Duration::seconds(config.dedup_window_seconds),
        }
    }
}
