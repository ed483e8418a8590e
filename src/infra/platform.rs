use async_trait::async_trait;
use thiserror::Error;
use time::OffsetDateTime;

use crate::domain::action::Occurrence;

#[derive(Debug, Error)]
pub enum PlatformError {
    #[error("missing permission on the platform")]
    Forbidden,
    #[error("member or resource not found on the platform")]
    NotFound,
    #[error("platform request failed: {0}")]
    Http(#[from] reqwest::Error),
    #[error("unexpected platform response: {0}")]
    Unexpected(String),
}

/// A ban read back from the platform's audit trail.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AuditEntry {
    /// Monotonic platform id of the entry, used as the poll cursor.
    pub entry_id: i64,
    pub actor_id: i64,
    pub target_id: i64,
    pub target_name: String,
    pub reason: Option<String>,
    pub occurred_at: OffsetDateTime,
}

impl AuditEntry {
    pub fn into_occurrence(self) -> Occurrence {
        Occurrence::external(
            self.actor_id,
            self.target_id,
            self.target_name,
            self.reason,
            self.occurred_at,
        )
    }
}

/// The role that grants the ban privilege.
#[async_trait]
pub trait CapabilityMarker: Send + Sync {
    async fn has_marker(&self, member_id: i64) -> Result<bool, PlatformError>;

    async fn grant_marker(&self, member_id: i64) -> Result<(), PlatformError>;

    async fn revoke_marker(&self, member_id: i64) -> Result<(), PlatformError>;
}

#[async_trait]
pub trait AuditTrail: Send + Sync {
    /// Bans newer than `after`, oldest first.
    async fn recent_bans(&self, after: Option<i64>, limit: u8)
        -> Result<Vec<AuditEntry>, PlatformError>;
}

/// Administrator-facing notices. Delivery is best effort.
#[async_trait]
pub trait Notifier: Send + Sync {
    async fn notify(&self, message: &str) -> Result<(), PlatformError>;
}
