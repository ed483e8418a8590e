use thiserror::Error;

use crate::domain::quota::QuotaError;
use crate::infra::ledger::StoreError;
use crate::infra::platform::PlatformError;

#[derive(Debug, Error)]
pub enum EngineError {
    #[error("no ban quota is configured for moderator {0}")]
    NoQuotaConfigured(i64),
    #[error("ledger store unavailable: {0}")]
    StoreUnavailable(#[from] StoreError),
    #[error("capability marker sync failed for moderator {moderator_id}: {source}")]
    CapabilitySyncFailed {
        moderator_id: i64,
        #[source]
        source: PlatformError,
    },
    #[error("invalid quota: {0}")]
    InvalidQuota(#[from] QuotaError),
}
