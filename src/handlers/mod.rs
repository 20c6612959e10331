// src/handlers/mod.rs

pub mod admin;
pub mod assignment;
pub mod catalog;

use axum::{Json, response::IntoResponse};
use serde_json::json;

/// Liveness probe.
#[utoipa::path(
    get,
    path = "/api/health",
    tag = "system",
    responses((status = 200, description = "Service is up"))
)]
pub async fn health() -> impl IntoResponse {
    Json(json!({ "status": "ok" }))
}
