use std::collections::BTreeSet;
use std::sync::Arc;

use serde::Serialize;
use tokio::sync::Mutex;
use tracing::{info, warn};

use crate::app::error::EngineError;
use crate::app::locks::ModeratorLocks;
use crate::domain::quota::ModeratorQuota;
use crate::infra::ledger::LedgerStore;
use crate::infra::platform::{CapabilityMarker, Notifier, PlatformError};

/// State of the ban role after the engine tried to bring it in line with
/// the quota.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum MarkerSync {
    Unchanged,
    Granted,
    Revoked,
    /// The member is no longer in the community space.
    MemberMissing,
    /// Left for the next sweep.
    Failed,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct SweepReport {
    pub resets: usize,
    pub revoked: usize,
    pub granted: usize,
    /// Moderators whose role could not be corrected; retried next sweep.
    pub failures: Vec<i64>,
}

/// Keeps the ban role in step with "quota remaining > 0".
///
/// Every sync holds the moderator's lock and decides from the quota row as it
/// is at that moment, never from a caller's snapshot. A moderator without a
/// row counts as `remaining = 0`.
pub struct CapabilitySynchronizer {
    ledger: Arc<dyn LedgerStore>,
    locks: ModeratorLocks,
    marker: Arc<dyn CapabilityMarker>,
    notifier: Arc<dyn Notifier>,
    pending: Mutex<BTreeSet<i64>>,
}

impl CapabilitySynchronizer {
    pub fn new(
        ledger: Arc<dyn LedgerStore>,
        locks: ModeratorLocks,
        marker: Arc<dyn CapabilityMarker>,
        notifier: Arc<dyn Notifier>,
    ) -> Self {
        Self {
            ledger,
            locks,
            marker,
            notifier,
            pending: Mutex::new(BTreeSet::new()),
        }
    }

    /// Revokes the role when `remaining <= 0`, grants it when quota is left
    /// and the role is missing. A failure is remembered for the next sweep.
    ///
    /// Must not be called while holding the moderator's lock.
    pub async fn sync(&self, moderator_id: i64) -> Result<MarkerSync, EngineError> {
        let _guard = self.locks.acquire(moderator_id).await;

        let outcome = match self.ledger.get_quota(moderator_id).await {
            Ok(quota) => {
                let remaining = quota.as_ref().map_or(0, ModeratorQuota::remaining);
                self.apply(moderator_id, remaining)
                    .await
                    .map_err(|source| EngineError::CapabilitySyncFailed {
                        moderator_id,
                        source,
                    })
            }
            Err(err) => Err(EngineError::StoreUnavailable(err)),
        };

        let mut pending = self.pending.lock().await;
        if outcome.is_ok() {
            pending.remove(&moderator_id);
        } else {
            pending.insert(moderator_id);
        }
        outcome
    }

    async fn apply(&self, moderator_id: i64, remaining: i32) -> Result<MarkerSync, PlatformError> {
        let has_marker = match self.marker.has_marker(moderator_id).await {
            Ok(has_marker) => has_marker,
            Err(PlatformError::NotFound) => return Ok(MarkerSync::MemberMissing),
            Err(err) => return Err(err),
        };

        if remaining <= 0 && has_marker {
            self.marker.revoke_marker(moderator_id).await?;
            info!(moderator_id, "ban role revoked");
            Ok(MarkerSync::Revoked)
        } else if remaining > 0 && !has_marker {
            self.marker.grant_marker(moderator_id).await?;
            info!(moderator_id, remaining, "ban role granted");
            Ok(MarkerSync::Granted)
        } else {
            Ok(MarkerSync::Unchanged)
        }
    }

    /// Moderators whose last sync failed.
    pub async fn pending(&self) -> Vec<i64> {
        self.pending.lock().await.iter().copied().collect()
    }

    /// Full pass over `tracked` plus every earlier failure. Failures go first;
    /// a pending id whose quota is gone only gets its role removed.
    pub async fn sweep(&self, tracked: &[i64]) -> SweepReport {
        let mut order = self.pending().await;
        for moderator_id in tracked {
            if !order.contains(moderator_id) {
                order.push(*moderator_id);
            }
        }

        let mut report = SweepReport::default();
        for moderator_id in order {
            match self.sync(moderator_id).await {
                Ok(MarkerSync::Revoked) => report.revoked += 1,
                Ok(MarkerSync::Granted) => report.granted += 1,
                Ok(_) => {}
                Err(err) => {
                    warn!(error = %err, moderator_id, "sweep could not correct ban role");
                    report.failures.push(moderator_id);
                }
            }
        }

        if report.revoked > 0 || !report.failures.is_empty() {
            self.notify(&sweep_notice(&report)).await;
        }

        report
    }

    pub async fn notify(&self, message: &str) {
        if let Err(err) = self.notifier.notify(message).await {
            warn!(error = %err, "failed to deliver admin notice");
        }
    }
}

fn sweep_notice(report: &SweepReport) -> String {
    let mut message = format!(
        "Sweep: ban role removed from {} moderator(s) with no bans left.",
        report.revoked
    );
    if !report.failures.is_empty() {
        let ids: Vec<String> = report.failures.iter().map(|id| format!("<@{}>", id)).collect();
        message.push_str(&format!(
            "\nCould not update the ban role for {} moderator(s): {}. \
             Check that the bot's role sits above the ban role.",
            report.failures.len(),
            ids.join(", ")
        ));
    }
    message
}
