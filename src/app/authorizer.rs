use std::sync::Arc;

use time::OffsetDateTime;
use tracing::info;

use crate::app::error::EngineError;
use crate::app::locks::ModeratorLocks;
use crate::app::policy;
use crate::domain::quota::{DenyReason, ModeratorQuota};
use crate::infra::ledger::LedgerStore;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Authorization {
    Allowed(ModeratorQuota),
    Denied(DenyReason),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Decision {
    pub authorization: Authorization,
    /// A due reset was persisted while evaluating.
    pub reset_applied: bool,
}

/// Loads a quota and persists a due reset. Caller holds the moderator's lock.
pub(crate) async fn load_current(
    ledger: &dyn LedgerStore,
    moderator_id: i64,
    now: OffsetDateTime,
) -> Result<Option<(ModeratorQuota, bool)>, EngineError> {
    let Some(quota) = ledger.get_quota(moderator_id).await? else {
        return Ok(None);
    };

    let (quota, reset) = policy::reset_if_due(quota, now);
    if reset {
        ledger.upsert_quota(&quota).await?;
        info!(
            moderator_id,
            remaining = quota.remaining(),
            reset_at = %quota.reset_at(),
            "ban quota reset"
        );
    }

    Ok(Some((quota, reset)))
}

/// Pre-check for the command path. Never consumes quota; the decrement
/// happens once the platform confirms the ban.
#[derive(Clone)]
pub struct ActionAuthorizer {
    ledger: Arc<dyn LedgerStore>,
    locks: ModeratorLocks,
}

impl ActionAuthorizer {
    pub fn new(ledger: Arc<dyn LedgerStore>, locks: ModeratorLocks) -> Self {
        Self { ledger, locks }
    }

    pub async fn authorize(
        &self,
        moderator_id: i64,
        now: OffsetDateTime,
    ) -> Result<Decision, EngineError> {
        let _guard = self.locks.acquire(moderator_id).await;

        let Some((quota, reset_applied)) =
            load_current(self.ledger.as_ref(), moderator_id, now).await?
        else {
            return Ok(Decision {
                authorization: Authorization::Denied(DenyReason::NoQuotaConfigured),
                reset_applied: false,
            });
        };

        let authorization = if quota.is_exhausted() {
            Authorization::Denied(DenyReason::QuotaExhausted)
        } else {
            Authorization::Allowed(quota)
        };

        Ok(Decision {
            authorization,
            reset_applied,
        })
    }
}
