use axum::{Json, extract::State};
use serde_json::json;

use banter_types::api::HealthResponse;

use crate::AppState;

pub async fn health(State(state): State<AppState>) -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "healthy",
        version: env!("CARGO_PKG_VERSION"),
        uptime_seconds: state.started_at.elapsed().as_secs(),
        timestamp: chrono::Utc::now(),
    })
}

pub async fn api_status() -> Json<serde_json::Value> {
    Json(json!({
        "api": "banter",
        "version": env!("CARGO_PKG_VERSION"),
        "status": "operational",
        "endpoints": {
            "auth": "/api/register, /api/login, /api/logout, /api/user/profile",
            "chat": "/api/conversations, /api/conversations/{id}/messages",
            "health": "/health",
        },
    }))
}
