use std::sync::Arc;

use serde::Serialize;
use time::OffsetDateTime;
use tracing::{info, warn};

use crate::app::authorizer::{ActionAuthorizer, Authorization};
use crate::app::capability::{CapabilitySynchronizer, MarkerSync, SweepReport};
use crate::app::error::EngineError;
use crate::app::locks::ModeratorLocks;
use crate::app::policy;
use crate::app::reconciler::{EventReconciler, Observation};
use crate::config::engine::EngineSettings;
use crate::domain::action::{ActionOrigin, ActionRecord, Occurrence};
use crate::domain::quota::ModeratorQuota;
use crate::infra::ledger::LedgerStore;
use crate::infra::platform::{CapabilityMarker, Notifier};

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct GrantOutcome {
    pub quota: ModeratorQuota,
    pub marker: MarkerSync,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct LedgerStats {
    pub moderators: usize,
    pub actions: i64,
}

/// Entry point for the command surface and the background jobs.
#[derive(Clone)]
pub struct QuotaEngine {
    ledger: Arc<dyn LedgerStore>,
    locks: ModeratorLocks,
    authorizer: ActionAuthorizer,
    reconciler: EventReconciler,
    capability: Arc<CapabilitySynchronizer>,
}

impl QuotaEngine {
    pub fn new(
        ledger: Arc<dyn LedgerStore>,
        marker: Arc<dyn CapabilityMarker>,
        notifier: Arc<dyn Notifier>,
        settings: EngineSettings,
    ) -> Self {
        let locks = ModeratorLocks::new();
        Self {
            authorizer: ActionAuthorizer::new(ledger.clone(), locks.clone()),
            reconciler: EventReconciler::new(ledger.clone(), locks.clone(), settings),
            capability: Arc::new(CapabilitySynchronizer::new(
                ledger.clone(),
                locks.clone(),
                marker,
                notifier,
            )),
            ledger,
            locks,
        }
    }

    pub fn ledger(&self) -> &Arc<dyn LedgerStore> {
        &self.ledger
    }

    pub async fn authorize(&self, moderator_id: i64) -> Result<Authorization, EngineError> {
        self.authorize_at(moderator_id, OffsetDateTime::now_utc()).await
    }

    pub async fn authorize_at(
        &self,
        moderator_id: i64,
        now: OffsetDateTime,
    ) -> Result<Authorization, EngineError> {
        let decision = self.authorizer.authorize(moderator_id, now).await?;
        if decision.reset_applied {
            if let Authorization::Allowed(quota) = &decision.authorization {
                self.sync_marker(quota).await;
            }
        }
        Ok(decision.authorization)
    }

    /// Administrator grant: `amount` bans, refilled every `interval_days`.
    pub async fn grant_quota(
        &self,
        moderator_id: i64,
        amount: i32,
        interval_days: i64,
        display_name: Option<String>,
    ) -> Result<GrantOutcome, EngineError> {
        let now = OffsetDateTime::now_utc();
        let quota = {
            let _guard = self.locks.acquire(moderator_id).await;
            let previous = self.ledger.get_quota(moderator_id).await?;
            let quota = policy::apply_grant(
                moderator_id,
                previous.as_ref(),
                amount,
                interval_days,
                display_name,
                now,
            )?;
            self.ledger.upsert_quota(&quota).await?;
            quota
        };

        info!(
            moderator_id,
            amount,
            interval_days,
            reset_at = %quota.reset_at(),
            "ban quota granted"
        );

        let marker = self.sync_marker(&quota).await;
        Ok(GrantOutcome { quota, marker })
    }

    /// Reported by the command path once its own platform ban succeeded.
    pub async fn record_applied_action(
        &self,
        moderator_id: i64,
        target_id: i64,
        target_name: &str,
        reason: Option<String>,
    ) -> Result<Observation, EngineError> {
        let now = OffsetDateTime::now_utc();
        let occurrence = Occurrence::command(moderator_id, target_id, target_name, reason, now);
        self.observe_at(&occurrence, now).await
    }

    pub async fn observe(&self, occurrence: &Occurrence) -> Result<Observation, EngineError> {
        self.observe_at(occurrence, OffsetDateTime::now_utc()).await
    }

    pub async fn observe_at(
        &self,
        occurrence: &Occurrence,
        now: OffsetDateTime,
    ) -> Result<Observation, EngineError> {
        let mut observation = self.reconciler.observe(occurrence, now).await?;

        if let Observation::Applied(applied) = &mut observation {
            let name = moderator_label(&applied.quota);
            if !applied.counted {
                self.capability
                    .notify(&format!(
                        "**{}** banned **{}** with no bans left. The ban is on record but was not counted.",
                        name, applied.record.target_name
                    ))
                    .await;
            } else if applied.record.origin == ActionOrigin::ExternalAudit {
                self.capability
                    .notify(&format!(
                        "**{}** banned **{}** outside the ban command. The ban was counted; {} left.",
                        name,
                        applied.record.target_name,
                        applied.quota.remaining()
                    ))
                    .await;
            }

            applied.marker = self.sync_marker(&applied.quota).await;
            if applied.marker == MarkerSync::Revoked {
                self.capability
                    .notify(&format!(
                        "**{}** reached the ban limit; the ban role was removed.",
                        name
                    ))
                    .await;
            }
        }

        Ok(observation)
    }

    pub async fn quota(&self, moderator_id: i64) -> Result<ModeratorQuota, EngineError> {
        self.ledger
            .get_quota(moderator_id)
            .await?
            .ok_or(EngineError::NoQuotaConfigured(moderator_id))
    }

    pub async fn query_all_quotas(&self) -> Result<Vec<ModeratorQuota>, EngineError> {
        Ok(self.ledger.list_quotas().await?)
    }

    pub async fn query_history(
        &self,
        moderator_id: Option<i64>,
        limit: i64,
    ) -> Result<Vec<ActionRecord>, EngineError> {
        Ok(self.ledger.list_records(moderator_id, limit).await?)
    }

    /// Removes the moderator's quota and ban role. History stays.
    pub async fn revoke_quota(&self, moderator_id: i64) -> Result<MarkerSync, EngineError> {
        let removed = {
            let _guard = self.locks.acquire(moderator_id).await;
            self.ledger.delete_quota(moderator_id).await?
        };
        if !removed {
            return Err(EngineError::NoQuotaConfigured(moderator_id));
        }

        info!(moderator_id, "ban quota revoked");
        Ok(self.sync_marker_to(moderator_id, None).await)
    }

    pub async fn purge_record(&self, record_id: i64) -> Result<bool, EngineError> {
        let purged = self.ledger.purge_record(record_id).await?;
        if purged {
            info!(record_id, "ban record purged");
        }
        Ok(purged)
    }

    pub async fn stats(&self) -> Result<LedgerStats, EngineError> {
        let moderators = self.ledger.list_quotas().await?.len();
        let actions = self.ledger.count_records().await?;
        Ok(LedgerStats { moderators, actions })
    }

    /// Refills every quota whose reset is due. Each one is re-read under its
    /// lock so a reset already done by live traffic is not repeated.
    pub async fn reset_due_quotas(&self, now: OffsetDateTime) -> Result<usize, EngineError> {
        let mut resets = 0;
        for quota in self.ledger.list_quotas().await? {
            if !policy::is_reset_due(&quota, now) {
                continue;
            }

            let _guard = self.locks.acquire(quota.moderator_id()).await;
            let Some(current) = self.ledger.get_quota(quota.moderator_id()).await? else {
                continue;
            };
            if policy::is_reset_due(&current, now) {
                let refreshed = policy::apply_reset(&current, now);
                self.ledger.upsert_quota(&refreshed).await?;
                info!(
                    moderator_id = refreshed.moderator_id(),
                    remaining = refreshed.remaining(),
                    reset_at = %refreshed.reset_at(),
                    "ban quota reset"
                );
                resets += 1;
            }
        }
        Ok(resets)
    }

    pub async fn sweep(&self) -> Result<SweepReport, EngineError> {
        let tracked: Vec<i64> = self
            .ledger
            .list_quotas()
            .await?
            .iter()
            .map(ModeratorQuota::moderator_id)
            .collect();
        Ok(self.capability.sweep(&tracked).await)
    }

    /// Scheduled pass: due resets first, then the role sweep.
    pub async fn run_maintenance(&self, now: OffsetDateTime) -> Result<SweepReport, EngineError> {
        let resets = self.reset_due_quotas(now).await?;
        let mut report = self.sweep().await?;
        report.resets = resets;
        Ok(report)
    }

    pub async fn pending_marker_syncs(&self) -> Vec<i64> {
        self.capability.pending().await
    }

    async fn sync_marker(&self, quota: &ModeratorQuota) -> MarkerSync {
        self.sync_marker_to(quota.moderator_id(), Some(quota)).await
    }

    async fn sync_marker_to(
        &self,
        moderator_id: i64,
        quota: Option<&ModeratorQuota>,
    ) -> MarkerSync {
        match self.capability.sync(moderator_id).await {
            Ok(outcome) => outcome,
            Err(err) => {
                warn!(error = %err, moderator_id, "ban role out of sync; retrying on next sweep");
                let name = quota.map_or_else(|| format!("<@{}>", moderator_id), moderator_label);
                self.capability
                    .notify(&format!(
                        "Could not update the ban role for **{}**: {}. Retrying on the next sweep.",
                        name, err
                    ))
                    .await;
                MarkerSync::Failed
            }
        }
    }
}

fn moderator_label(quota: &ModeratorQuota) -> String {
    quota
        .display_name()
        .map(str::to_string)
        .unwrap_or_else(|| format!("<@{}>", quota.moderator_id()))
}
