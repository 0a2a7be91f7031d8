//! Health check endpoint

use axum::{extract::State, routing::get, Json, Router};
use livecast_core::ScopeHealth;
use serde::Serialize;

use crate::http::AppState;

pub fn create_health_router() -> Router<AppState> {
    Router::new().route("/health", get(health_check))
}

#[derive(Debug, Serialize)]
struct HealthResponse {
    status: &'static str,
    streams: ScopeHealth,
}

/// Always 200 while the process is up; `streams` tells whether the grid
/// data is fresh
async fn health_check(State(state): State<AppState>) -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok",
        streams: state.streams.health(),
    })
}
