#![allow(dead_code)]

use std::collections::HashSet;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use axum::body::{Body, Bytes};
use axum::http::{Method, Request, StatusCode};
use axum::Router;
use http_body_util::BodyExt;
use serde_json::Value;
use time::{Duration, OffsetDateTime};
use tokio::sync::oneshot;
use tower::ServiceExt;

use warden::app::engine::QuotaEngine;
use warden::config::engine::EngineSettings;
use warden::domain::quota::ModeratorQuota;
use warden::infra::ledger::LedgerStore;
use warden::infra::memory::MemoryLedger;
use warden::infra::platform::{AuditEntry, AuditTrail, CapabilityMarker, Notifier, PlatformError};
use warden::AppState;

// ---------------------------------------------------------------------------
// Constants
// ---------------------------------------------------------------------------

pub const TEST_ADMIN_TOKEN: &str = "test-admin-token-12345";
pub const ENGINE_MEMBER_ID: i64 = 900_000_000_000_000_001;
pub const MODERATOR: i64 = 200_000_000_000_000_001;
pub const OTHER_MODERATOR: i64 = 200_000_000_000_000_002;

// ---------------------------------------------------------------------------
// FakePlatform: in-process stand-in for the chat platform
// ---------------------------------------------------------------------------

struct MarkerCheckStall {
    member_id: i64,
    entered: oneshot::Sender<()>,
    release: oneshot::Receiver<()>,
}

#[derive(Default)]
pub struct FakePlatform {
    markers: Mutex<HashSet<i64>>,
    stall: Mutex<Option<MarkerCheckStall>>,
    departed: Mutex<HashSet<i64>>,
    forbidden: AtomicBool,
    notices: Mutex<Vec<String>>,
    audit: Mutex<Vec<AuditEntry>>,
}

impl FakePlatform {
    pub fn has(&self, member_id: i64) -> bool {
        self.markers.lock().unwrap().contains(&member_id)
    }

    pub fn give_marker(&self, member_id: i64) {
        self.markers.lock().unwrap().insert(member_id);
    }

    pub fn take_marker(&self, member_id: i64) {
        self.markers.lock().unwrap().remove(&member_id);
    }

    pub fn depart(&self, member_id: i64) {
        self.departed.lock().unwrap().insert(member_id);
    }

    /// Refuse every role change with `Forbidden`, as when the bot's role sits
    /// below the ban role.
    pub fn set_forbidden(&self, forbidden: bool) {
        self.forbidden.store(forbidden, Ordering::SeqCst);
    }

    /// Parks the next `has_marker` call for `member_id`. The first channel
    /// fires once the call is parked; sending on the second lets it read the
    /// role and return.
    pub fn stall_next_marker_check(
        &self,
        member_id: i64,
    ) -> (oneshot::Receiver<()>, oneshot::Sender<()>) {
        let (entered_tx, entered_rx) = oneshot::channel();
        let (release_tx, release_rx) = oneshot::channel();
        *self.stall.lock().unwrap() = Some(MarkerCheckStall {
            member_id,
            entered: entered_tx,
            release: release_rx,
        });
        (entered_rx, release_tx)
    }

    pub fn notices(&self) -> Vec<String> {
        self.notices.lock().unwrap().clone()
    }

    pub fn push_audit(&self, entry: AuditEntry) {
        self.audit.lock().unwrap().push(entry);
    }

    fn check_allowed(&self) -> Result<(), PlatformError> {
        if self.forbidden.load(Ordering::SeqCst) {
            return Err(PlatformError::Forbidden);
        }
        Ok(())
    }
}

#[async_trait]
impl CapabilityMarker for FakePlatform {
    async fn has_marker(&self, member_id: i64) -> Result<bool, PlatformError> {
        let stall = {
            let mut slot = self.stall.lock().unwrap();
            if slot.as_ref().map_or(false, |stall| stall.member_id == member_id) {
                slot.take()
            } else {
                None
            }
        };
        if let Some(stall) = stall {
            let _ = stall.entered.send(());
            let _ = stall.release.await;
        }

        if self.departed.lock().unwrap().contains(&member_id) {
            return Err(PlatformError::NotFound);
        }
        Ok(self.has(member_id))
    }

    async fn grant_marker(&self, member_id: i64) -> Result<(), PlatformError> {
        self.check_allowed()?;
        self.give_marker(member_id);
        Ok(())
    }

    async fn revoke_marker(&self, member_id: i64) -> Result<(), PlatformError> {
        self.check_allowed()?;
        self.take_marker(member_id);
        Ok(())
    }
}

#[async_trait]
impl AuditTrail for FakePlatform {
    async fn recent_bans(
        &self,
        after: Option<i64>,
        limit: u8,
    ) -> Result<Vec<AuditEntry>, PlatformError> {
        let mut entries: Vec<AuditEntry> = self
            .audit
            .lock()
            .unwrap()
            .iter()
            .filter(|entry| after.map_or(true, |after| entry.entry_id > after))
            .cloned()
            .collect();
        entries.sort_by_key(|entry| entry.entry_id);
        entries.truncate(limit as usize);
        Ok(entries)
    }
}

#[async_trait]
impl Notifier for FakePlatform {
    async fn notify(&self, message: &str) -> Result<(), PlatformError> {
        self.notices.lock().unwrap().push(message.to_string());
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// TestApp: one isolated engine per test
// ---------------------------------------------------------------------------

pub struct TestApp {
    router: Router,
    pub engine: QuotaEngine,
    pub ledger: Arc<MemoryLedger>,
    pub platform: Arc<FakePlatform>,
}

pub struct TestResponse {
    pub status: StatusCode,
    body_bytes: Bytes,
}

impl TestResponse {
    pub fn json(&self) -> Value {
        serde_json::from_slice(&self.body_bytes).unwrap_or(Value::Null)
    }

    pub fn error_message(&self) -> String {
        self.json()["error"].as_str().unwrap_or("").to_string()
    }

    pub fn error_code(&self) -> String {
        self.json()["code"].as_str().unwrap_or("").to_string()
    }
}

pub fn app() -> TestApp {
    TestApp::with_settings(EngineSettings::default().with_engine_member(ENGINE_MEMBER_ID))
}

impl TestApp {
    pub fn with_settings(settings: EngineSettings) -> Self {
        let ledger = Arc::new(MemoryLedger::new());
        let platform = Arc::new(FakePlatform::default());
        let engine = QuotaEngine::new(ledger.clone(), platform.clone(), platform.clone(), settings);

        let state = AppState {
            engine: engine.clone(),
            admin_token: Some(TEST_ADMIN_TOKEN.to_string()),
        };
        let router = warden::http::router(state);

        TestApp {
            router,
            engine,
            ledger,
            platform,
        }
    }

    // ------------------------------------------------------------------
    // Test data helpers
    // ------------------------------------------------------------------

    pub async fn grant(&self, moderator_id: i64, amount: i32, interval_days: i64) -> ModeratorQuota {
        self.engine
            .grant_quota(moderator_id, amount, interval_days, Some(format!("mod-{}", moderator_id)))
            .await
            .expect("grant failed")
            .quota
    }

    /// Writes a quota row directly, bypassing the grant path.
    pub async fn seed_quota(
        &self,
        moderator_id: i64,
        remaining: i32,
        initial: i32,
        interval: Duration,
        reset_at: OffsetDateTime,
    ) -> ModeratorQuota {
        let quota = ModeratorQuota::new(
            moderator_id,
            remaining,
            initial,
            interval.whole_seconds(),
            reset_at,
            Some(format!("mod-{}", moderator_id)),
        )
        .expect("invalid seeded quota");
        self.ledger.upsert_quota(&quota).await.expect("seed failed");
        quota
    }

    pub async fn quota(&self, moderator_id: i64) -> ModeratorQuota {
        self.engine.quota(moderator_id).await.expect("quota missing")
    }

    pub async fn record_count(&self) -> i64 {
        self.ledger.count_records().await.expect("count failed")
    }

    // ------------------------------------------------------------------
    // Low-level request helper
    // ------------------------------------------------------------------

    pub async fn request(
        &self,
        method: Method,
        path: &str,
        body: Option<Value>,
        headers: &[(&str, &str)],
    ) -> TestResponse {
        let mut builder = Request::builder()
            .method(method)
            .uri(path)
            .header("host", "localhost");

        for &(key, value) in headers {
            builder = builder.header(key, value);
        }

        let request = if let Some(body) = body {
            builder
                .header("content-type", "application/json")
                .body(Body::from(serde_json::to_string(&body).unwrap()))
                .unwrap()
        } else {
            builder.body(Body::empty()).unwrap()
        };

        let response = self
            .router
            .clone()
            .oneshot(request)
            .await
            .expect("oneshot failed");

        let status = response.status();
        let body_bytes = response
            .into_body()
            .collect()
            .await
            .expect("failed to collect body")
            .to_bytes();

        TestResponse { status, body_bytes }
    }

    // ------------------------------------------------------------------
    // Convenience HTTP helpers (all send the admin token)
    // ------------------------------------------------------------------

    pub async fn get_admin(&self, path: &str) -> TestResponse {
        self.request(Method::GET, path, None, &[("x-admin-token", TEST_ADMIN_TOKEN)])
            .await
    }

    pub async fn post_admin(&self, path: &str, body: Option<Value>) -> TestResponse {
        self.request(Method::POST, path, body, &[("x-admin-token", TEST_ADMIN_TOKEN)])
            .await
    }

    pub async fn put_admin(&self, path: &str, body: Value) -> TestResponse {
        self.request(Method::PUT, path, Some(body), &[("x-admin-token", TEST_ADMIN_TOKEN)])
            .await
    }

    pub async fn delete_admin(&self, path: &str) -> TestResponse {
        self.request(Method::DELETE, path, None, &[("x-admin-token", TEST_ADMIN_TOKEN)])
            .await
    }
}

/// Asserts the quota invariant for every tracked moderator.
pub async fn assert_quota_bounds(ledger: &MemoryLedger) {
    for quota in ledger.list_quotas().await.expect("list failed") {
        assert!(
            (0..=quota.initial()).contains(&quota.remaining()),
            "moderator {} out of bounds: {}/{}",
            quota.moderator_id(),
            quota.remaining(),
            quota.initial()
        );
    }
}

pub fn audit_entry(
    entry_id: i64,
    actor_id: i64,
    target_id: i64,
    occurred_at: OffsetDateTime,
) -> AuditEntry {
    AuditEntry {
        entry_id,
        actor_id,
        target_id,
        target_name: format!("user-{}", target_id),
        reason: Some("spam".to_string()),
        occurred_at,
    }
}
