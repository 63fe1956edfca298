use axum::{
    extract::{Path, State},
    response::IntoResponse,
    Json,
};
use serde::Deserialize;
use serde_json::json;
use utoipa::ToSchema;

use tele_topics as topics;

use crate::log_store::StoreError;
use crate::{responses, AppState};

#[derive(Deserialize, ToSchema)]
pub(crate) struct LogsPayload {
    pub session_id: String,
    /// Newline-delimited JSON records.
    pub logs: String,
}

fn store_error(err: StoreError) -> axum::response::Response {
    match &err {
        StoreError::UnknownSession(_) => responses::problem(
            axum::http::StatusCode::NOT_FOUND,
            "Not Found",
            "unknown_session",
            &err,
        ),
        StoreError::InvalidRequest(_) => responses::problem(
            axum::http::StatusCode::BAD_REQUEST,
            "Bad Request",
            "invalid_request",
            &err,
        ),
        StoreError::Io(_) => responses::problem(
            axum::http::StatusCode::INTERNAL_SERVER_ERROR,
            "Error",
            "io_error",
            &err,
        ),
    }
}

/// Incremental append of event records to an existing session log.
///
/// 404 with code `unknown_session` tells the client the append path is not
/// available for this session; it retries with a full `save`.
#[utoipa::path(
    post,
    path = "/experiment/logs/append",
    tag = "Logs",
    request_body = LogsPayload,
    responses(
        (status = 200, description = "Appended", body = serde_json::Value),
        (status = 404, description = "Unknown session; use save"),
        (status = 400, description = "Malformed records")
    )
)]
pub async fn logs_append(
    State(state): State<AppState>,
    Json(req): Json<LogsPayload>,
) -> axum::response::Response {
    match state.log_store().append(&req.session_id, &req.logs).await {
        Ok(appended) => {
            state.bus().publish(
                topics::TOPIC_LOGS_APPENDED,
                &json!({"session_id": req.session_id, "records": appended}),
            );
            (
                axum::http::StatusCode::OK,
                Json(json!({"ok": true, "appended": appended})),
            )
                .into_response()
        }
        Err(err) => store_error(err),
    }
}

/// Idempotent full overwrite of a session log, keyed by session id.
#[utoipa::path(
    post,
    path = "/experiment/logs/save",
    tag = "Logs",
    request_body = LogsPayload,
    responses(
        (status = 200, description = "Saved", body = serde_json::Value),
        (status = 400, description = "Malformed records")
    )
)]
pub async fn logs_save(
    State(state): State<AppState>,
    Json(req): Json<LogsPayload>,
) -> axum::response::Response {
    match state.log_store().save(&req.session_id, &req.logs).await {
        Ok(()) => {
            state.bus().publish(
                topics::TOPIC_LOGS_SAVED,
                &json!({"session_id": req.session_id}),
            );
            (axum::http::StatusCode::OK, Json(json!({"ok": true}))).into_response()
        }
        Err(err) => store_error(err),
    }
}

/// Per-session log metadata for operator review.
#[utoipa::path(
    get,
    path = "/experiment/logs/list",
    tag = "Logs",
    responses((status = 200, description = "Log files", body = serde_json::Value))
)]
pub async fn logs_list(State(state): State<AppState>) -> axum::response::Response {
    match state.log_store().list().await {
        Ok(files) => {
            (axum::http::StatusCode::OK, Json(json!({"files": files}))).into_response()
        }
        Err(err) => store_error(err),
    }
}

/// Raw newline-delimited-JSON artifact for one session.
#[utoipa::path(
    get,
    path = "/experiment/logs/download/{session_id}",
    tag = "Logs",
    params(("session_id" = String, Path, description = "Session id")),
    responses(
        (status = 200, description = "Log file"),
        (status = 404, description = "Unknown session")
    )
)]
pub async fn logs_download(
    State(state): State<AppState>,
    Path(session_id): Path<String>,
) -> axum::response::Response {
    match state.log_store().read(&session_id).await {
        Ok(text) => (
            axum::http::StatusCode::OK,
            [(
                axum::http::header::CONTENT_TYPE,
                "application/x-ndjson; charset=utf-8",
            )],
            text,
        )
            .into_response(),
        Err(err) => store_error(err),
    }
}
