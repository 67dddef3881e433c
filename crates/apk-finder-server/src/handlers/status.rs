//! Root, status, servers and health handlers.

use crate::server::AppState;
use apk_finder_core::{HealthReport, SystemStatus};
use axum::{extract::State, http::StatusCode, response::IntoResponse, Json};
use serde_json::{json, Value};
use std::sync::Arc;

pub async fn handle_root() -> Json<Value> {
    Json(json!({
        "message": "APK Finder API",
        "version": env!("CARGO_PKG_VERSION"),
    }))
}

pub async fn handle_status(State(state): State<Arc<AppState>>) -> Json<SystemStatus> {
    Json(state.finder.status())
}

pub async fn handle_servers(State(state): State<Arc<AppState>>) -> Json<Value> {
    Json(json!({ "code": 200, "data": state.finder.servers() }))
}

/// 200 while the catalog answers, 503 otherwise.
pub async fn handle_health(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    let report: HealthReport = state.finder.health();
    let status = if report.is_healthy() {
        StatusCode::OK
    } else {
        StatusCode::SERVICE_UNAVAILABLE
    };
    (status, Json(report))
}
