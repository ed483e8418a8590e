//! Pure quota arithmetic. Both the command path and the reconciliation path
//! go through these functions so they cannot disagree about the numbers.

use time::{Duration, OffsetDateTime};

use crate::domain::quota::{
    DenyReason, ModeratorQuota, QuotaError, MAX_INTERVAL_DAYS, SECONDS_PER_DAY,
};

pub fn is_reset_due(quota: &ModeratorQuota, now: OffsetDateTime) -> bool {
    now >= quota.reset_at
}

/// Refills to `initial` and schedules the next reset one configured interval
/// after `now`.
pub fn apply_reset(quota: &ModeratorQuota, now: OffsetDateTime) -> ModeratorQuota {
    ModeratorQuota {
        remaining: quota.initial,
        reset_at: now + quota.interval(),
        ..quota.clone()
    }
}

/// Applies [`apply_reset`] only when it is due. The flag tells whether it was.
pub fn reset_if_due(quota: ModeratorQuota, now: OffsetDateTime) -> (ModeratorQuota, bool) {
    if is_reset_due(&quota, now) {
        (apply_reset(&quota, now), true)
    } else {
        (quota, false)
    }
}

pub fn apply_decrement(quota: &ModeratorQuota) -> Result<ModeratorQuota, DenyReason> {
    if quota.remaining <= 0 {
        return Err(DenyReason::QuotaExhausted);
    }
    Ok(ModeratorQuota {
        remaining: quota.remaining - 1,
        ..quota.clone()
    })
}

/// Sets a fresh allowance of `amount` bans renewed every `interval_days`.
/// A missing `display_name` keeps the one already on file.
pub fn apply_grant(
    moderator_id: i64,
    previous: Option<&ModeratorQuota>,
    amount: i32,
    interval_days: i64,
    display_name: Option<String>,
    now: OffsetDateTime,
) -> Result<ModeratorQuota, QuotaError> {
    if !(1..=MAX_INTERVAL_DAYS).contains(&interval_days) {
        return Err(QuotaError::IntervalDaysOutOfRange(interval_days));
    }
    let interval_seconds = interval_days * SECONDS_PER_DAY;
    let display_name =
        display_name.or_else(|| previous.and_then(|quota| quota.display_name.clone()));

    ModeratorQuota::new(
        moderator_id,
        amount,
        amount,
        interval_seconds,
        now + Duration::seconds(interval_seconds),
        display_name,
    )
}
