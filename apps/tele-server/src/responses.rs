use axum::{http::StatusCode, response::IntoResponse, Json};
use serde_json::json;

use tele_actions::GatewayError;
use tele_recorder::RecorderError;

/// RFC7807-flavored error body with a stable machine-readable `code`.
pub fn problem(
    status: StatusCode,
    title: &str,
    code: &str,
    detail: impl ToString,
) -> axum::response::Response {
    (
        status,
        Json(json!({
            "type": "about:blank",
            "title": title,
            "status": status.as_u16(),
            "code": code,
            "detail": detail.to_string(),
        })),
    )
        .into_response()
}

pub fn gateway_error(err: GatewayError) -> axum::response::Response {
    let (status, title) = match &err {
        GatewayError::InvalidRequest(_) => (StatusCode::BAD_REQUEST, "Bad Request"),
        GatewayError::UnresolvableType(_) => (StatusCode::BAD_REQUEST, "Bad Request"),
        GatewayError::ServerUnavailable { .. } => {
            (StatusCode::SERVICE_UNAVAILABLE, "Service Unavailable")
        }
        GatewayError::Timeout { .. } => (StatusCode::GATEWAY_TIMEOUT, "Gateway Timeout"),
        GatewayError::Transport(_) => (StatusCode::BAD_GATEWAY, "Bad Gateway"),
    };
    problem(status, title, err.code(), &err)
}

pub fn recorder_error(err: RecorderError) -> axum::response::Response {
    let (status, title) = match &err {
        RecorderError::AlreadyActive | RecorderError::NotRecording => {
            (StatusCode::CONFLICT, "Conflict")
        }
        RecorderError::Process(_) => (StatusCode::INTERNAL_SERVER_ERROR, "Error"),
    };
    problem(status, title, err.code(), &err)
}
