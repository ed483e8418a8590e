use std::time::Duration;

use anyhow::Result;
use time::OffsetDateTime;
use tokio::time::{interval, MissedTickBehavior};
use tracing::{error, info};

use crate::app::engine::QuotaEngine;

/// Runs due quota resets and the ban-role sweep every `period`.
pub async fn run(engine: QuotaEngine, period: Duration) -> Result<()> {
    info!(period_seconds = period.as_secs(), "maintenance loop started");
    let mut ticker = interval(period);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

    loop {
        ticker.tick().await;
        match engine.run_maintenance(OffsetDateTime::now_utc()).await {
            Ok(report) => info!(
                resets = report.resets,
                revoked = report.revoked,
                granted = report.granted,
                failures = report.failures.len(),
                "maintenance pass finished"
            ),
            Err(err) => error!(error = %err, "maintenance pass failed"),
        }
    }
}
