use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    Json,
};
use serde::{Deserialize, Serialize};
use time::OffsetDateTime;

use crate::app::authorizer::Authorization;
use crate::app::capability::{MarkerSync, SweepReport};
use crate::app::engine::{GrantOutcome, LedgerStats};
use crate::app::error::EngineError;
use crate::app::reconciler::{Observation, RejectReason};
use crate::domain::action::{ActionRecord, Occurrence};
use crate::domain::quota::{DenyReason, ModeratorQuota};
use crate::http::{AdminToken, AppError};
use crate::AppState;

const DEFAULT_HISTORY_LIMIT: i64 = 10;
const MAX_HISTORY_LIMIT: i64 = 100;
const MAX_TARGET_NAME_CHARS: usize = 100;
const MAX_REASON_CHARS: usize = 512;

#[derive(Serialize)]
pub(crate) struct HealthResponse {
    status: &'static str,
}

#[derive(Serialize)]
pub struct ItemsResponse<T> {
    pub items: Vec<T>,
}

fn engine_failure(err: EngineError, context: &'static str) -> AppError {
    match err {
        EngineError::NoQuotaConfigured(_) => AppError::not_found(DenyReason::NoQuotaConfigured.to_string()),
        EngineError::InvalidQuota(err) => AppError::bad_request(err.to_string()),
        EngineError::StoreUnavailable(err) => {
            tracing::error!(error = ?err, "{}", context);
            AppError::service_unavailable("ledger store unavailable, retry later")
        }
        EngineError::CapabilitySyncFailed { .. } => {
            tracing::error!(error = ?err, "{}", context);
            AppError::bad_gateway(err.to_string())
        }
    }
}

fn validate_ban_details(target_name: &str, reason: Option<&str>) -> Result<(), AppError> {
    if target_name.trim().is_empty() {
        return Err(AppError::bad_request("target_name is required"));
    }
    if target_name.chars().count() > MAX_TARGET_NAME_CHARS {
        return Err(AppError::bad_request("target_name is too long"));
    }
    if reason.map_or(false, |reason| reason.chars().count() > MAX_REASON_CHARS) {
        return Err(AppError::bad_request("reason is too long"));
    }
    Ok(())
}

pub(crate) async fn health(State(state): State<AppState>) -> Json<HealthResponse> {
    let ledger = state.engine.ledger().ping().await.is_ok();
    let status = if ledger { "ok" } else { "degraded" };

    Json(HealthResponse { status })
}

pub async fn list_moderators(
    _admin: AdminToken,
    State(state): State<AppState>,
) -> Result<Json<ItemsResponse<ModeratorQuota>>, AppError> {
    let items = state
        .engine
        .query_all_quotas()
        .await
        .map_err(|err| engine_failure(err, "failed to list quotas"))?;

    Ok(Json(ItemsResponse { items }))
}

pub async fn get_moderator(
    _admin: AdminToken,
    Path(id): Path<i64>,
    State(state): State<AppState>,
) -> Result<Json<ModeratorQuota>, AppError> {
    let quota = state
        .engine
        .quota(id)
        .await
        .map_err(|err| engine_failure(err, "failed to load quota"))?;

    Ok(Json(quota))
}

#[derive(Deserialize)]
pub struct GrantRequest {
    pub amount: i32,
    pub interval_days: i64,
    pub display_name: Option<String>,
}

pub async fn grant_quota(
    _admin: AdminToken,
    Path(id): Path<i64>,
    State(state): State<AppState>,
    Json(payload): Json<GrantRequest>,
) -> Result<Json<GrantOutcome>, AppError> {
    let outcome = state
        .engine
        .grant_quota(id, payload.amount, payload.interval_days, payload.display_name)
        .await
        .map_err(|err| engine_failure(err, "failed to grant quota"))?;

    Ok(Json(outcome))
}

#[derive(Serialize)]
pub struct RevokeResponse {
    pub marker: MarkerSync,
}

pub async fn revoke_quota(
    _admin: AdminToken,
    Path(id): Path<i64>,
    State(state): State<AppState>,
) -> Result<Json<RevokeResponse>, AppError> {
    let marker = state
        .engine
        .revoke_quota(id)
        .await
        .map_err(|err| engine_failure(err, "failed to revoke quota"))?;

    Ok(Json(RevokeResponse { marker }))
}

#[derive(Serialize)]
pub struct AuthorizeResponse {
    pub allowed: bool,
    pub quota: ModeratorQuota,
}

pub async fn authorize(
    _admin: AdminToken,
    Path(id): Path<i64>,
    State(state): State<AppState>,
) -> Result<Json<AuthorizeResponse>, AppError> {
    let authorization = state
        .engine
        .authorize(id)
        .await
        .map_err(|err| engine_failure(err, "failed to authorize ban"))?;

    match authorization {
        Authorization::Allowed(quota) => Ok(Json(AuthorizeResponse {
            allowed: true,
            quota,
        })),
        Authorization::Denied(reason) => Err(AppError::denied(reason)),
    }
}

#[derive(Deserialize)]
pub struct ActionRequest {
    pub moderator_id: i64,
    pub target_id: i64,
    pub target_name: String,
    pub reason: Option<String>,
}

pub async fn record_action(
    _admin: AdminToken,
    State(state): State<AppState>,
    Json(payload): Json<ActionRequest>,
) -> Result<Json<Observation>, AppError> {
    validate_ban_details(&payload.target_name, payload.reason.as_deref())?;

    let observation = state
        .engine
        .record_applied_action(
            payload.moderator_id,
            payload.target_id,
            &payload.target_name,
            payload.reason,
        )
        .await
        .map_err(|err| engine_failure(err, "failed to record ban"))?;

    // The command path treats an untracked moderator as a denial.
    if let Observation::Rejected {
        reason: RejectReason::NoQuotaConfigured,
    } = observation
    {
        return Err(AppError::denied(DenyReason::NoQuotaConfigured));
    }

    Ok(Json(observation))
}

#[derive(Deserialize)]
pub struct AuditEventRequest {
    pub moderator_id: i64,
    pub target_id: i64,
    pub target_name: String,
    pub reason: Option<String>,
    #[serde(default, with = "time::serde::rfc3339::option")]
    pub observed_at: Option<OffsetDateTime>,
}

pub async fn ingest_audit_event(
    _admin: AdminToken,
    State(state): State<AppState>,
    Json(payload): Json<AuditEventRequest>,
) -> Result<Json<Observation>, AppError> {
    validate_ban_details(&payload.target_name, payload.reason.as_deref())?;

    let now = OffsetDateTime::now_utc();
    let occurrence = Occurrence::external(
        payload.moderator_id,
        payload.target_id,
        payload.target_name,
        payload.reason,
        payload.observed_at.unwrap_or(now),
    );

    let observation = state
        .engine
        .observe_at(&occurrence, now)
        .await
        .map_err(|err| engine_failure(err, "failed to ingest audit event"))?;

    Ok(Json(observation))
}

#[derive(Deserialize)]
pub struct HistoryQuery {
    pub moderator_id: Option<i64>,
    pub limit: Option<i64>,
}

pub async fn list_history(
    _admin: AdminToken,
    State(state): State<AppState>,
    Query(query): Query<HistoryQuery>,
) -> Result<Json<ItemsResponse<ActionRecord>>, AppError> {
    let limit = query.limit.unwrap_or(DEFAULT_HISTORY_LIMIT);
    if !(1..=MAX_HISTORY_LIMIT).contains(&limit) {
        return Err(AppError::bad_request(format!(
            "limit must be between 1 and {}",
            MAX_HISTORY_LIMIT
        )));
    }

    let items = state
        .engine
        .query_history(query.moderator_id, limit)
        .await
        .map_err(|err| engine_failure(err, "failed to list ban history"))?;

    Ok(Json(ItemsResponse { items }))
}

pub async fn purge_record(
    _admin: AdminToken,
    Path(record_id): Path<i64>,
    State(state): State<AppState>,
) -> Result<StatusCode, AppError> {
    let purged = state
        .engine
        .purge_record(record_id)
        .await
        .map_err(|err| engine_failure(err, "failed to purge ban record"))?;

    if purged {
        Ok(StatusCode::NO_CONTENT)
    } else {
        Err(AppError::not_found("ban record not found"))
    }
}

pub async fn stats(
    _admin: AdminToken,
    State(state): State<AppState>,
) -> Result<Json<LedgerStats>, AppError> {
    let stats = state
        .engine
        .stats()
        .await
        .map_err(|err| engine_failure(err, "failed to load ledger stats"))?;

    Ok(Json(stats))
}

pub async fn sweep(
    _admin: AdminToken,
    State(state): State<AppState>,
) -> Result<Json<SweepReport>, AppError> {
    let report = state
        .engine
        .run_maintenance(OffsetDateTime::now_utc())
        .await
        .map_err(|err| engine_failure(err, "failed to run sweep"))?;

    Ok(Json(report))
}
