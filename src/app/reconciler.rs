use std::sync::Arc;

use serde::Serialize;
use time::OffsetDateTime;
use tracing::{debug, info, warn};

use crate::app::authorizer::load_current;
use crate::app::capability::MarkerSync;
use crate::app::error::EngineError;
use crate::app::locks::ModeratorLocks;
use crate::app::policy;
use crate::config::engine::EngineSettings;
use crate::domain::action::{ActionOrigin, ActionRecord, Occurrence};
use crate::domain::quota::ModeratorQuota;
use crate::infra::ledger::LedgerStore;

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Applied {
    pub record: ActionRecord,
    pub quota: ModeratorQuota,
    /// False when the quota was already exhausted: the ban is on record but
    /// nothing was left to take.
    pub counted: bool,
    pub reset_applied: bool,
    pub marker: MarkerSync,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum RejectReason {
    /// The actor has no quota; nothing to enforce.
    NoQuotaConfigured,
    /// Audit entry attributed to the engine's own account; the command path
    /// reports those bans itself.
    IssuedByEngine,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum Observation {
    Applied(Applied),
    Deduplicated { record_id: i64 },
    Rejected { reason: RejectReason },
}

/// Merges command reports and audit-trail reports into one ledger entry per
/// real ban.
///
/// Two reports for the same `(moderator, target)` pair whose timestamps lie
/// within `dedup_window` of each other are the same ban, whichever arrives
/// first. The lookup and the write both run under the moderator's lock, so
/// racing reports serialise and the second one finds the first.
#[derive(Clone)]
pub struct EventReconciler {
    ledger: Arc<dyn LedgerStore>,
    locks: ModeratorLocks,
    settings: EngineSettings,
}

impl EventReconciler {
    pub fn new(ledger: Arc<dyn LedgerStore>, locks: ModeratorLocks, settings: EngineSettings) -> Self {
        Self {
            ledger,
            locks,
            settings,
        }
    }

    pub async fn observe(
        &self,
        occurrence: &Occurrence,
        now: OffsetDateTime,
    ) -> Result<Observation, EngineError> {
        if occurrence.origin == ActionOrigin::ExternalAudit
            && self.settings.engine_member_id == Some(occurrence.moderator_id)
        {
            debug!(target_id = occurrence.target_id, "ignoring audit entry issued by the engine");
            return Ok(Observation::Rejected {
                reason: RejectReason::IssuedByEngine,
            });
        }

        let moderator_id = occurrence.moderator_id;
        let _guard = self.locks.acquire(moderator_id).await;

        let window = self.settings.dedup_window;
        if let Some(existing) = self
            .ledger
            .find_record_between(
                moderator_id,
                occurrence.target_id,
                occurrence.observed_at - window,
                occurrence.observed_at + window,
            )
            .await?
        {
            debug!(
                moderator_id,
                target_id = occurrence.target_id,
                record_id = existing.record_id,
                origin = occurrence.origin.as_str(),
                "duplicate ban report"
            );
            return Ok(Observation::Deduplicated {
                record_id: existing.record_id,
            });
        }

        let Some((quota, reset_applied)) =
            load_current(self.ledger.as_ref(), moderator_id, now).await?
        else {
            debug!(moderator_id, "ban by untracked moderator ignored");
            return Ok(Observation::Rejected {
                reason: RejectReason::NoQuotaConfigured,
            });
        };

        let (quota, counted) = match policy::apply_decrement(&quota) {
            Ok(next) => (next, true),
            Err(_) => {
                warn!(
                    moderator_id,
                    target_id = occurrence.target_id,
                    origin = occurrence.origin.as_str(),
                    "ban recorded while quota already exhausted"
                );
                (quota, false)
            }
        };

        let record = if counted {
            self.ledger
                .commit_occurrence(&occurrence.to_record(), &quota)
                .await?
        } else {
            self.ledger.append_record(&occurrence.to_record()).await?
        };

        info!(
            moderator_id,
            target_id = record.target_id,
            record_id = record.record_id,
            origin = record.origin.as_str(),
            remaining = quota.remaining(),
            counted,
            "ban applied to ledger"
        );

        Ok(Observation::Applied(Applied {
            record,
            quota,
            counted,
            reset_applied,
            marker: MarkerSync::Unchanged,
        }))
    }
}
