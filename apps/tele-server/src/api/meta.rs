use axum::{extract::State, response::IntoResponse, Json};
use serde_json::json;

use tele_protocol::RobotProfile;

use crate::{router, AppState};

/// Liveness probe.
#[utoipa::path(
    get,
    path = "/healthz",
    tag = "Meta",
    responses((status = 200, description = "Alive", body = serde_json::Value))
)]
pub async fn healthz() -> axum::response::Response {
    (axum::http::StatusCode::OK, Json(json!({"ok": true}))).into_response()
}

/// Service identity and the endpoints it exposes.
#[utoipa::path(
    get,
    path = "/about",
    tag = "Meta",
    responses((status = 200, description = "Service info", body = serde_json::Value))
)]
pub async fn about() -> axum::response::Response {
    (
        axum::http::StatusCode::OK,
        Json(json!({
            "name": "tele-server",
            "version": env!("CARGO_PKG_VERSION"),
            "endpoints": router::endpoint_list(),
        })),
    )
        .into_response()
}

/// The robot's capability descriptor, served read-only to the dashboard.
#[utoipa::path(
    get,
    path = "/robot/profile",
    tag = "Meta",
    responses((status = 200, description = "Capability descriptor", body = RobotProfile))
)]
pub async fn robot_profile(State(state): State<AppState>) -> axum::response::Response {
    (
        axum::http::StatusCode::OK,
        Json(state.profile().clone()),
    )
        .into_response()
}
