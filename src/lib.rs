pub mod app;
pub mod config;
pub mod domain;
pub mod http;
pub mod infra;
pub mod jobs;

use crate::app::engine::QuotaEngine;

#[derive(Clone)]
pub struct AppState {
    pub engine: QuotaEngine,
    pub admin_token: Option<String>,
}
