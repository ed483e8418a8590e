use serde::{Deserialize, Serialize};
use time::OffsetDateTime;

/// Which observation path reported a ban.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ActionOrigin {
    /// Reported by the command surface after its own platform call succeeded.
    Command,
    /// Read back from the platform's audit trail.
    ExternalAudit,
}

impl ActionOrigin {
    pub fn as_str(&self) -> &'static str {
        match self {
            ActionOrigin::Command => "command",
            ActionOrigin::ExternalAudit => "external_audit",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "command" => Some(ActionOrigin::Command),
            "external_audit" => Some(ActionOrigin::ExternalAudit),
            _ => None,
        }
    }
}

/// One ledger row. Exactly one exists per real-world ban.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ActionRecord {
    pub record_id: i64,
    pub moderator_id: i64,
    pub target_id: i64,
    /// Snapshot taken when the ban was recorded; the account may disappear later.
    pub target_name: String,
    pub reason: Option<String>,
    #[serde(with = "time::serde::rfc3339")]
    pub applied_at: OffsetDateTime,
    pub origin: ActionOrigin,
}

/// A row about to be appended; the store assigns `record_id`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewActionRecord {
    pub moderator_id: i64,
    pub target_id: i64,
    pub target_name: String,
    pub reason: Option<String>,
    pub applied_at: OffsetDateTime,
    pub origin: ActionOrigin,
}

impl NewActionRecord {
    pub fn with_id(self, record_id: i64) -> ActionRecord {
        ActionRecord {
            record_id,
            moderator_id: self.moderator_id,
            target_id: self.target_id,
            target_name: self.target_name,
            reason: self.reason,
            applied_at: self.applied_at,
            origin: self.origin,
        }
    }
}

/// A report that moderator `moderator_id` banned `target_id`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Occurrence {
    pub moderator_id: i64,
    pub target_id: i64,
    pub target_name: String,
    pub reason: Option<String>,
    pub origin: ActionOrigin,
    pub observed_at: OffsetDateTime,
}

impl Occurrence {
    pub fn command(
        moderator_id: i64,
        target_id: i64,
        target_name: impl Into<String>,
        reason: Option<String>,
        observed_at: OffsetDateTime,
    ) -> Self {
        Self {
            moderator_id,
            target_id,
            target_name: target_name.into(),
            reason,
            origin: ActionOrigin::Command,
            observed_at,
        }
    }

    pub fn external(
        moderator_id: i64,
        target_id: i64,
        target_name: impl Into<String>,
        reason: Option<String>,
        observed_at: OffsetDateTime,
    ) -> Self {
        Self {
            moderator_id,
            target_id,
            target_name: target_name.into(),
            reason,
            origin: ActionOrigin::ExternalAudit,
            observed_at,
        }
    }

    pub fn to_record(&self) -> NewActionRecord {
        NewActionRecord {
            moderator_id: self.moderator_id,
            target_id: self.target_id,
            target_name: self.target_name.clone(),
            reason: self.reason.clone(),
            applied_at: self.observed_at,
            origin: self.origin,
        }
    }
}
