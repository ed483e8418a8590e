use serde::Serialize;
use thiserror::Error;
use time::{Duration, OffsetDateTime};

/// Seconds in one day, used to turn an administrator's `interval_days` into
/// the persisted cadence.
pub const SECONDS_PER_DAY: i64 = 86_400;

/// Longest reset cadence an administrator may configure.
pub const MAX_INTERVAL_DAYS: i64 = 3_650;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum QuotaError {
    #[error("initial quota must be greater than zero (got {0})")]
    InitialNotPositive(i32),
    #[error("remaining quota {remaining} must be between 0 and {initial}")]
    RemainingOutOfRange { remaining: i32, initial: i32 },
    #[error("reset interval must be greater than zero (got {0}s)")]
    IntervalNotPositive(i64),
    #[error("reset interval must be between 1 and 3650 days (got {0})")]
    IntervalDaysOutOfRange(i64),
}

/// Ban allowance of one moderator.
///
/// Fields are only writable inside the crate; every value handed out has
/// passed [`ModeratorQuota::new`] or was derived from one by the quota policy,
/// so `0 <= remaining <= initial` always holds.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ModeratorQuota {
    pub(crate) moderator_id: i64,
    pub(crate) remaining: i32,
    pub(crate) initial: i32,
    /// Cadence configured by the last grant, carried across resets.
    pub(crate) interval_seconds: i64,
    #[serde(with = "time::serde::rfc3339")]
    pub(crate) reset_at: OffsetDateTime,
    pub(crate) display_name: Option<String>,
}

impl ModeratorQuota {
    pub fn new(
        moderator_id: i64,
        remaining: i32,
        initial: i32,
        interval_seconds: i64,
        reset_at: OffsetDateTime,
        display_name: Option<String>,
    ) -> Result<Self, QuotaError> {
        if initial <= 0 {
            return Err(QuotaError::InitialNotPositive(initial));
        }
        if !(0..=initial).contains(&remaining) {
            return Err(QuotaError::RemainingOutOfRange { remaining, initial });
        }
        if interval_seconds <= 0 {
            return Err(QuotaError::IntervalNotPositive(interval_seconds));
        }

        Ok(Self {
            moderator_id,
            remaining,
            initial,
            interval_seconds,
            reset_at,
            display_name,
        })
    }

    pub fn moderator_id(&self) -> i64 {
        self.moderator_id
    }

    pub fn remaining(&self) -> i32 {
        self.remaining
    }

    pub fn initial(&self) -> i32 {
        self.initial
    }

    pub fn interval(&self) -> Duration {
        Duration::seconds(self.interval_seconds)
    }

    pub fn interval_seconds(&self) -> i64 {
        self.interval_seconds
    }

    pub fn reset_at(&self) -> OffsetDateTime {
        self.reset_at
    }

    pub fn display_name(&self) -> Option<&str> {
        self.display_name.as_deref()
    }

    pub fn is_exhausted(&self) -> bool {
        self.remaining <= 0
    }
}

/// Why the command path refused a ban. The two reasons are reported to the
/// requester separately and never merged into one message.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum DenyReason {
    NoQuotaConfigured,
    QuotaExhausted,
}

impl DenyReason {
    pub fn code(&self) -> &'static str {
        match self {
            DenyReason::NoQuotaConfigured => "no_quota_configured",
            DenyReason::QuotaExhausted => "quota_exhausted",
        }
    }
}

impl std::fmt::Display for DenyReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            DenyReason::NoQuotaConfigured => f.write_str(
                "no ban quota is configured for this moderator; ask an administrator to grant one",
            ),
            DenyReason::QuotaExhausted => f.write_str(
                "ban quota exhausted; wait for the next reset or ask an administrator for more",
            ),
        }
    }
}
