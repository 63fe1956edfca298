use std::path::PathBuf;

use axum::{extract::State, response::IntoResponse, Json};
use serde_json::json;

use tele_protocol::{BagStartRequest, BagStatus};

use crate::{responses, AppState};

/// Launch the exclusive bulk-sensor recording for a session.
#[utoipa::path(
    post,
    path = "/bag/start",
    tag = "Recording",
    request_body = BagStartRequest,
    responses(
        (status = 200, description = "Recording started", body = serde_json::Value),
        (status = 409, description = "A recording is already active"),
        (status = 500, description = "Recorder failed to launch")
    )
)]
pub async fn bag_start(
    State(state): State<AppState>,
    Json(req): Json<BagStartRequest>,
) -> axum::response::Response {
    let label = req.session_name.as_deref().unwrap_or("session");
    let output_path = req.output_path.map(PathBuf::from);
    match state.recorder().start(label, req.topics, output_path).await {
        Ok(handle) => (
            axum::http::StatusCode::OK,
            Json(json!({
                "success": true,
                "path": handle.path.display().to_string(),
                "topics": handle.topics,
                "pid": handle.pid,
            })),
        )
            .into_response(),
        Err(err) => responses::recorder_error(err),
    }
}

/// Stop the active recording after letting the recorder flush.
#[utoipa::path(
    post,
    path = "/bag/stop",
    tag = "Recording",
    responses(
        (status = 200, description = "Recording stopped", body = serde_json::Value),
        (status = 409, description = "No active recording")
    )
)]
pub async fn bag_stop(State(state): State<AppState>) -> axum::response::Response {
    match state.recorder().stop().await {
        Ok(path) => (
            axum::http::StatusCode::OK,
            Json(json!({"success": true, "path": path.display().to_string()})),
        )
            .into_response(),
        Err(err) => responses::recorder_error(err),
    }
}

/// Recording slot snapshot; also reaps a recorder that died on its own.
#[utoipa::path(
    get,
    path = "/bag/status",
    tag = "Recording",
    responses((status = 200, description = "Current state", body = BagStatus))
)]
pub async fn bag_status(State(state): State<AppState>) -> axum::response::Response {
    let status = state.recorder().status().await;
    (axum::http::StatusCode::OK, Json(status)).into_response()
}
