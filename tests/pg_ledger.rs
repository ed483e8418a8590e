//! Runs against a real Postgres when `TEST_DATABASE_URL` is set; otherwise
//! every test returns early.

use sqlx::postgres::PgPoolOptions;
use time::{Duration, OffsetDateTime};

use warden::domain::action::{ActionOrigin, Occurrence};
use warden::domain::quota::ModeratorQuota;
use warden::infra::db::Db;
use warden::infra::ledger::{LedgerStore, PgLedger};

async fn ledger() -> Option<PgLedger> {
    let url = std::env::var("TEST_DATABASE_URL").ok()?;
    let pool = PgPoolOptions::new()
        .max_connections(5)
        .connect(&url)
        .await
        .expect("failed to connect to TEST_DATABASE_URL");
    let db = Db::from_pool(pool);
    db.migrate().await.expect("failed to apply ledger schema");
    Some(PgLedger::new(db))
}

/// Postgres keeps microseconds.
fn now_micros() -> OffsetDateTime {
    let now = OffsetDateTime::now_utc();
    now.replace_nanosecond(now.nanosecond() / 1_000 * 1_000)
        .unwrap()
}

fn unique_id() -> i64 {
    OffsetDateTime::now_utc().unix_timestamp_nanos() as i64
}

#[tokio::test]
async fn quota_round_trip_and_delete() {
    let Some(ledger) = ledger().await else { return };
    let moderator_id = unique_id();
    let reset_at = now_micros() + Duration::days(7);

    let quota = ModeratorQuota::new(
        moderator_id,
        2,
        3,
        Duration::days(7).whole_seconds(),
        reset_at,
        Some("alice".into()),
    )
    .unwrap();
    ledger.upsert_quota(&quota).await.unwrap();
    assert_eq!(ledger.get_quota(moderator_id).await.unwrap(), Some(quota.clone()));

    // Writing without a name keeps the stored one.
    let unnamed = ModeratorQuota::new(moderator_id, 1, 3, quota.interval_seconds(), reset_at, None)
        .unwrap();
    ledger.upsert_quota(&unnamed).await.unwrap();
    let stored = ledger.get_quota(moderator_id).await.unwrap().unwrap();
    assert_eq!(stored.remaining(), 1);
    assert_eq!(stored.display_name(), Some("alice"));

    assert!(ledger.delete_quota(moderator_id).await.unwrap());
    assert!(!ledger.delete_quota(moderator_id).await.unwrap());
    assert_eq!(ledger.get_quota(moderator_id).await.unwrap(), None);
}

#[tokio::test]
async fn commit_occurrence_writes_record_and_quota_together() {
    let Some(ledger) = ledger().await else { return };
    let moderator_id = unique_id();
    let now = now_micros();

    let quota = ModeratorQuota::new(moderator_id, 3, 3, 86_400, now + Duration::days(1), None)
        .unwrap();
    ledger.upsert_quota(&quota).await.unwrap();

    let spent = ModeratorQuota::new(moderator_id, 2, 3, 86_400, quota.reset_at(), None).unwrap();
    let occurrence = Occurrence::external(moderator_id, 99, "user-99", Some("spam".into()), now);
    let record = ledger
        .commit_occurrence(&occurrence.to_record(), &spent)
        .await
        .unwrap();

    assert_eq!(record.origin, ActionOrigin::ExternalAudit);
    assert_eq!(record.applied_at, now);
    assert_eq!(
        ledger.get_quota(moderator_id).await.unwrap().unwrap().remaining(),
        2
    );

    let found = ledger
        .find_record_between(
            moderator_id,
            99,
            now - Duration::seconds(30),
            now + Duration::seconds(30),
        )
        .await
        .unwrap();
    assert_eq!(found.map(|r| r.record_id), Some(record.record_id));

    let outside = ledger
        .find_record_between(
            moderator_id,
            99,
            now + Duration::minutes(1),
            now + Duration::minutes(2),
        )
        .await
        .unwrap();
    assert!(outside.is_none());

    let history = ledger.list_records(Some(moderator_id), 10).await.unwrap();
    assert_eq!(history.len(), 1);

    assert!(ledger.purge_record(record.record_id).await.unwrap());
    assert!(!ledger.purge_record(record.record_id).await.unwrap());
    ledger.delete_quota(moderator_id).await.unwrap();
}
