mod common;

use std::time::Duration as StdDuration;

use time::{Duration, OffsetDateTime};

use warden::config::engine::ListenerSettings;
use warden::jobs::audit_listener::{AuditListener, PollSummary};

use common::{audit_entry, ENGINE_MEMBER_ID, MODERATOR, OTHER_MODERATOR};

fn settings(poll_limit: u8) -> ListenerSettings {
    ListenerSettings {
        poll_interval: StdDuration::from_millis(10),
        poll_limit,
        backlog_window: Duration::seconds(30),
    }
}

#[tokio::test]
async fn poll_applies_new_entries_and_skips_backlog() {
    let app = common::app();
    app.grant(MODERATOR, 5, 30).await;
    let started = OffsetDateTime::now_utc();

    app.platform
        .push_audit(audit_entry(100, MODERATOR, 1, started - Duration::hours(3)));
    app.platform.push_audit(audit_entry(101, MODERATOR, 2, started));
    app.platform
        .push_audit(audit_entry(102, OTHER_MODERATOR, 3, started));
    app.platform
        .push_audit(audit_entry(103, ENGINE_MEMBER_ID, 4, started));

    let mut listener = AuditListener::new(settings(50), started);
    let summary = listener
        .poll_once(&app.engine, app.platform.as_ref())
        .await
        .unwrap();

    assert_eq!(
        summary,
        PollSummary {
            applied: 1,
            deduplicated: 0,
            rejected: 2,
            skipped: 1,
        }
    );
    assert_eq!(listener.cursor(), Some(103));
    assert_eq!(app.quota(MODERATOR).await.remaining(), 4);
    assert_eq!(app.record_count().await, 1);

    let idle = listener
        .poll_once(&app.engine, app.platform.as_ref())
        .await
        .unwrap();
    assert_eq!(idle, PollSummary::default());
}

#[tokio::test]
async fn poll_merges_entries_the_command_path_already_reported() {
    let app = common::app();
    app.grant(MODERATOR, 5, 30).await;
    let started = OffsetDateTime::now_utc();

    app.engine
        .record_applied_action(MODERATOR, 7, "user-7", None)
        .await
        .unwrap();
    app.platform
        .push_audit(audit_entry(200, MODERATOR, 7, OffsetDateTime::now_utc()));

    let mut listener = AuditListener::new(settings(50), started);
    let summary = listener
        .poll_once(&app.engine, app.platform.as_ref())
        .await
        .unwrap();

    assert_eq!(summary.deduplicated, 1);
    assert_eq!(app.record_count().await, 1);
    assert_eq!(app.quota(MODERATOR).await.remaining(), 4);
}

#[tokio::test]
async fn poll_respects_the_batch_limit() {
    let app = common::app();
    app.grant(MODERATOR, 10, 30).await;
    let started = OffsetDateTime::now_utc();
    for entry_id in 1..=5 {
        app.platform
            .push_audit(audit_entry(entry_id, MODERATOR, entry_id, started));
    }

    let mut listener = AuditListener::new(settings(2), started);
    let first = listener
        .poll_once(&app.engine, app.platform.as_ref())
        .await
        .unwrap();
    assert_eq!(first.applied, 2);
    assert_eq!(listener.cursor(), Some(2));

    let second = listener
        .poll_once(&app.engine, app.platform.as_ref())
        .await
        .unwrap();
    assert_eq!(second.applied, 2);
    assert_eq!(listener.cursor(), Some(4));
}

#[tokio::test]
async fn store_outage_leaves_the_entry_for_the_next_poll() {
    let app = common::app();
    app.grant(MODERATOR, 3, 30).await;
    let started = OffsetDateTime::now_utc();
    app.platform.push_audit(audit_entry(300, MODERATOR, 1, started));

    let mut listener = AuditListener::new(settings(50), started);
    app.ledger.set_offline(true);
    assert!(listener
        .poll_once(&app.engine, app.platform.as_ref())
        .await
        .is_err());
    assert_eq!(listener.cursor(), None);

    app.ledger.set_offline(false);
    let summary = listener
        .poll_once(&app.engine, app.platform.as_ref())
        .await
        .unwrap();
    assert_eq!(summary.applied, 1);
    assert_eq!(listener.cursor(), Some(300));
    assert_eq!(app.quota(MODERATOR).await.remaining(), 2);
}
