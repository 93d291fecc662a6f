//! Health check endpoints.

use super::AppState;
use crate::platform::host_platform_tag;
use axum::{extract::State, response::IntoResponse, Json};
use serde_json::json;
use std::sync::OnceLock;
use std::time::Instant;

static START_TIME: OnceLock<Instant> = OnceLock::new();

pub fn init_start_time() {
    START_TIME.get_or_init(Instant::now);
}

/// GET /health - Health check endpoint
pub async fn health(State(state): State<AppState>) -> impl IntoResponse {
    let uptime = START_TIME.get().map(|t| t.elapsed().as_secs()).unwrap_or(0);

    Json(json!({
        "status": "ok",
        "terminal_id": state.terminal_id,
        "version": env!("CARGO_PKG_VERSION"),
        "uptime_secs": uptime,
        "update_in_progress": state.tracker.is_busy().await,
    }))
}

/// GET /version - Daemon and application versions
pub async fn version(State(state): State<AppState>) -> impl IntoResponse {
    Json(json!({
        "daemon": env!("CARGO_PKG_VERSION"),
        "application": *state.app_version.read().await,
        "platform": host_platform_tag(),
    }))
}
