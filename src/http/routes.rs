use axum::{routing::delete, routing::get, routing::post, routing::put, Router};

use crate::http::handlers;
use crate::AppState;

pub fn health() -> Router<AppState> {
    Router::new().route("/health", get(handlers::health))
}

pub fn moderators() -> Router<AppState> {
    Router::new()
        .route("/moderators", get(handlers::list_moderators))
        .route("/moderators/:id", get(handlers::get_moderator))
        .route(
            "/moderators/:id/quota",
            put(handlers::grant_quota).delete(handlers::revoke_quota),
        )
        .route("/moderators/:id/authorize", post(handlers::authorize))
}

pub fn actions() -> Router<AppState> {
    Router::new()
        .route("/actions", post(handlers::record_action))
        .route("/audit-events", post(handlers::ingest_audit_event))
}

pub fn history() -> Router<AppState> {
    Router::new()
        .route("/history", get(handlers::list_history))
        .route("/history/:record_id", delete(handlers::purge_record))
}

pub fn maintenance() -> Router<AppState> {
    Router::new()
        .route("/stats", get(handlers::stats))
        .route("/sweep", post(handlers::sweep))
}
