use async_trait::async_trait;
use sqlx::postgres::{PgConnection, PgRow};
use sqlx::Row;
use thiserror::Error;
use time::OffsetDateTime;

use crate::domain::action::{ActionOrigin, ActionRecord, NewActionRecord};
use crate::domain::quota::ModeratorQuota;
use crate::infra::db::Db;

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),
    #[error("ledger store is offline")]
    Offline,
    #[error("corrupt ledger row: {0}")]
    Corrupt(String),
}

/// Durable home of quota rows and the ban history.
///
/// Every mutating call is atomic. Quota writes are last-writer-wins; callers
/// compute the next state while holding the moderator's lock.
#[async_trait]
pub trait LedgerStore: Send + Sync {
    async fn get_quota(&self, moderator_id: i64) -> Result<Option<ModeratorQuota>, StoreError>;

    async fn upsert_quota(&self, quota: &ModeratorQuota) -> Result<(), StoreError>;

    /// Returns false when no quota existed.
    async fn delete_quota(&self, moderator_id: i64) -> Result<bool, StoreError>;

    /// All tracked moderators, ordered by id.
    async fn list_quotas(&self) -> Result<Vec<ModeratorQuota>, StoreError>;

    async fn append_record(&self, record: &NewActionRecord) -> Result<ActionRecord, StoreError>;

    /// Appends `record` and writes `quota` in the same transaction.
    async fn commit_occurrence(
        &self,
        record: &NewActionRecord,
        quota: &ModeratorQuota,
    ) -> Result<ActionRecord, StoreError>;

    /// Newest record for the pair with `applied_at` inside `[from, to]`.
    async fn find_record_between(
        &self,
        moderator_id: i64,
        target_id: i64,
        from: OffsetDateTime,
        to: OffsetDateTime,
    ) -> Result<Option<ActionRecord>, StoreError>;

    /// Newest first.
    async fn list_records(
        &self,
        moderator_id: Option<i64>,
        limit: i64,
    ) -> Result<Vec<ActionRecord>, StoreError>;

    async fn count_records(&self) -> Result<i64, StoreError>;

    /// Returns false when the record did not exist.
    async fn purge_record(&self, record_id: i64) -> Result<bool, StoreError>;

    async fn ping(&self) -> Result<(), StoreError>;
}

#[derive(Clone)]
pub struct PgLedger {
    db: Db,
}

impl PgLedger {
    pub fn new(db: Db) -> Self {
        Self { db }
    }
}

const QUOTA_COLUMNS: &str =
    "moderator_id, remaining, initial, interval_seconds, reset_at, display_name";
const RECORD_COLUMNS: &str =
    "id, moderator_id, target_id, target_name, reason, origin, applied_at";

fn quota_from_row(row: &PgRow) -> Result<ModeratorQuota, StoreError> {
    let moderator_id: i64 = row.try_get("moderator_id")?;
    ModeratorQuota::new(
        moderator_id,
        row.try_get("remaining")?,
        row.try_get("initial")?,
        row.try_get("interval_seconds")?,
        row.try_get("reset_at")?,
        row.try_get("display_name")?,
    )
    .map_err(|err| StoreError::Corrupt(format!("moderator {}: {}", moderator_id, err)))
}

fn record_from_row(row: &PgRow) -> Result<ActionRecord, StoreError> {
    let origin: String = row.try_get("origin")?;
    let origin = ActionOrigin::parse(&origin)
        .ok_or_else(|| StoreError::Corrupt(format!("unknown origin {:?}", origin)))?;

    Ok(ActionRecord {
        record_id: row.try_get("id")?,
        moderator_id: row.try_get("moderator_id")?,
        target_id: row.try_get("target_id")?,
        target_name: row.try_get("target_name")?,
        reason: row.try_get("reason")?,
        applied_at: row.try_get("applied_at")?,
        origin,
    })
}

async fn insert_record(
    conn: &mut PgConnection,
    record: &NewActionRecord,
) -> Result<ActionRecord, sqlx::Error> {
    let record_id: i64 = sqlx::query_scalar(
        "INSERT INTO action_records \
         (moderator_id, target_id, target_name, reason, origin, applied_at) \
         VALUES ($1, $2, $3, $4, $5, $6) \
         RETURNING id",
    )
    .bind(record.moderator_id)
    .bind(record.target_id)
    .bind(&record.target_name)
    .bind(&record.reason)
    .bind(record.origin.as_str())
    .bind(record.applied_at)
    .fetch_one(&mut *conn)
    .await?;

    Ok(record.clone().with_id(record_id))
}

async fn write_quota(conn: &mut PgConnection, quota: &ModeratorQuota) -> Result<(), sqlx::Error> {
    sqlx::query(
        "INSERT INTO moderator_quotas \
         (moderator_id, remaining, initial, interval_seconds, reset_at, display_name) \
         VALUES ($1, $2, $3, $4, $5, $6) \
         ON CONFLICT (moderator_id) DO UPDATE SET \
             remaining = EXCLUDED.remaining, \
             initial = EXCLUDED.initial, \
             interval_seconds = EXCLUDED.interval_seconds, \
             reset_at = EXCLUDED.reset_at, \
             display_name = COALESCE(EXCLUDED.display_name, moderator_quotas.display_name), \
             updated_at = now()",
    )
    .bind(quota.moderator_id())
    .bind(quota.remaining())
    .bind(quota.initial())
    .bind(quota.interval_seconds())
    .bind(quota.reset_at())
    .bind(quota.display_name())
    .execute(&mut *conn)
    .await?;

    Ok(())
}

#[async_trait]
impl LedgerStore for PgLedger {
    async fn get_quota(&self, moderator_id: i64) -> Result<Option<ModeratorQuota>, StoreError> {
        let row = sqlx::query(&format!(
            "SELECT {} FROM moderator_quotas WHERE moderator_id = $1",
            QUOTA_COLUMNS
        ))
        .bind(moderator_id)
        .fetch_optional(self.db.pool())
        .await?;

        row.as_ref().map(quota_from_row).transpose()
    }

    async fn upsert_quota(&self, quota: &ModeratorQuota) -> Result<(), StoreError> {
        let mut tx = self.db.pool().begin().await?;
        write_quota(&mut tx, quota).await?;
        tx.commit().await?;
        Ok(())
    }

    async fn delete_quota(&self, moderator_id: i64) -> Result<bool, StoreError> {
        let result = sqlx::query("DELETE FROM moderator_quotas WHERE moderator_id = $1")
            .bind(moderator_id)
            .execute(self.db.pool())
            .await?;

        Ok(result.rows_affected() > 0)
    }

    async fn list_quotas(&self) -> Result<Vec<ModeratorQuota>, StoreError> {
        let rows = sqlx::query(&format!(
            "SELECT {} FROM moderator_quotas ORDER BY moderator_id",
            QUOTA_COLUMNS
        ))
        .fetch_all(self.db.pool())
        .await?;

        rows.iter().map(quota_from_row).collect()
    }

    async fn append_record(&self, record: &NewActionRecord) -> Result<ActionRecord, StoreError> {
        let mut tx = self.db.pool().begin().await?;
        let stored = insert_record(&mut tx, record).await?;
        tx.commit().await?;
        Ok(stored)
    }

    async fn commit_occurrence(
        &self,
        record: &NewActionRecord,
        quota: &ModeratorQuota,
    ) -> Result<ActionRecord, StoreError> {
        let mut tx = self.db.pool().begin().await?;
        let stored = insert_record(&mut tx, record).await?;
        write_quota(&mut tx, quota).await?;
        tx.commit().await?;
        Ok(stored)
    }

    async fn find_record_between(
        &self,
        moderator_id: i64,
        target_id: i64,
        from: OffsetDateTime,
        to: OffsetDateTime,
    ) -> Result<Option<ActionRecord>, StoreError> {
        let row = sqlx::query(&format!(
            "SELECT {} FROM action_records \
             WHERE moderator_id = $1 AND target_id = $2 \
               AND applied_at >= $3 AND applied_at <= $4 \
             ORDER BY applied_at DESC, id DESC \
             LIMIT 1",
            RECORD_COLUMNS
        ))
        .bind(moderator_id)
        .bind(target_id)
        .bind(from)
        .bind(to)
        .fetch_optional(self.db.pool())
        .await?;

        row.as_ref().map(record_from_row).transpose()
    }

    async fn list_records(
        &self,
        moderator_id: Option<i64>,
        limit: i64,
    ) -> Result<Vec<ActionRecord>, StoreError> {
        let rows = match moderator_id {
            Some(moderator_id) => {
                sqlx::query(&format!(
                    "SELECT {} FROM action_records \
                     WHERE moderator_id = $1 \
                     ORDER BY applied_at DESC, id DESC \
                     LIMIT $2",
                    RECORD_COLUMNS
                ))
                .bind(moderator_id)
                .bind(limit)
                .fetch_all(self.db.pool())
                .await?
            }
            None => {
                sqlx::query(&format!(
                    "SELECT {} FROM action_records \
                     ORDER BY applied_at DESC, id DESC \
                     LIMIT $1",
                    RECORD_COLUMNS
                ))
                .bind(limit)
                .fetch_all(self.db.pool())
                .await?
            }
        };

        rows.iter().map(record_from_row).collect()
    }

    async fn count_records(&self) -> Result<i64, StoreError> {
        let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM action_records")
            .fetch_one(self.db.pool())
            .await?;
        Ok(count)
    }

    async fn purge_record(&self, record_id: i64) -> Result<bool, StoreError> {
        let result = sqlx::query("DELETE FROM action_records WHERE id = $1")
            .bind(record_id)
            .execute(self.db.pool())
            .await?;

        Ok(result.rows_affected() > 0)
    }

    async fn ping(&self) -> Result<(), StoreError> {
        sqlx::query("SELECT 1").execute(self.db.pool()).await?;
        Ok(())
    }
}
