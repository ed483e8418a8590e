use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use time::OffsetDateTime;
use tracing::{debug, info, warn};

use crate::app::engine::QuotaEngine;
use crate::app::error::EngineError;
use crate::app::reconciler::Observation;
use crate::config::engine::ListenerSettings;
use crate::infra::platform::AuditTrail;

const ERROR_BACKOFF_MS: u64 = 5000;

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct PollSummary {
    pub applied: usize,
    pub deduplicated: usize,
    pub rejected: usize,
    /// Entries from before the listener started.
    pub skipped: usize,
}

/// Pulls new ban entries from the platform's audit trail and feeds them to
/// the engine. The cursor only moves past an entry once the engine has
/// accepted it, so a ledger outage re-delivers the entry on the next poll.
pub struct AuditListener {
    settings: ListenerSettings,
    cursor: Option<i64>,
    oldest_relevant: OffsetDateTime,
}

impl AuditListener {
    pub fn new(settings: ListenerSettings, started_at: OffsetDateTime) -> Self {
        Self {
            settings,
            cursor: None,
            oldest_relevant: started_at - settings.backlog_window,
        }
    }

    pub fn cursor(&self) -> Option<i64> {
        self.cursor
    }

    pub async fn poll_once(
        &mut self,
        engine: &QuotaEngine,
        trail: &dyn AuditTrail,
    ) -> Result<PollSummary> {
        let entries = trail
            .recent_bans(self.cursor, self.settings.poll_limit)
            .await?;

        let mut summary = PollSummary::default();
        for entry in entries {
            let entry_id = entry.entry_id;
            if entry.occurred_at < self.oldest_relevant {
                summary.skipped += 1;
                self.cursor = Some(entry_id);
                continue;
            }

            match engine.observe(&entry.into_occurrence()).await {
                Ok(Observation::Applied(_)) => summary.applied += 1,
                Ok(Observation::Deduplicated { .. }) => summary.deduplicated += 1,
                Ok(Observation::Rejected { .. }) => summary.rejected += 1,
                Err(err @ EngineError::StoreUnavailable(_)) => return Err(err.into()),
                Err(err) => {
                    warn!(error = %err, entry_id, "audit entry could not be applied");
                }
            }
            self.cursor = Some(entry_id);
        }

        Ok(summary)
    }
}

pub async fn run(
    engine: QuotaEngine,
    trail: Arc<dyn AuditTrail>,
    settings: ListenerSettings,
) -> Result<()> {
    info!("audit listener started");
    let mut listener = AuditListener::new(settings, OffsetDateTime::now_utc());
    loop {
        match listener.poll_once(&engine, trail.as_ref()).await {
            Ok(summary) => {
                if summary != PollSummary::default() {
                    debug!(
                        applied = summary.applied,
                        deduplicated = summary.deduplicated,
                        rejected = summary.rejected,
                        skipped = summary.skipped,
                        cursor = ?listener.cursor(),
                        "audit poll processed"
                    );
                }
                tokio::time::sleep(settings.poll_interval).await;
            }
            Err(err) => {
                warn!(error = ?err, "audit poll failed, backing off");
                tokio::time::sleep(Duration::from_millis(ERROR_BACKOFF_MS)).await;
            }
        }
    }
}
