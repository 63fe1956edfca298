use axum::{extract::State, response::IntoResponse, Json};
use serde_json::json;

use tele_protocol::{ActionRequest, ActionResult};
use tele_topics as topics;

use crate::{responses, AppState};

/// Bridge one dashboard button press into a remote action goal and wait
/// for its terminal result.
#[utoipa::path(
    post,
    path = "/generic-action",
    tag = "Actions",
    request_body = ActionRequest,
    responses(
        (status = 200, description = "Terminal result", body = ActionResult),
        (status = 400, description = "Invalid request or unknown action type"),
        (status = 503, description = "No action server reachable"),
        (status = 504, description = "No terminal result within the window"),
        (status = 502, description = "Transport failure")
    )
)]
pub async fn generic_action(
    State(state): State<AppState>,
    Json(req): Json<ActionRequest>,
) -> axum::response::Response {
    state.bus().publish(
        topics::TOPIC_ACTIONS_SUBMITTED,
        &json!({"action": req.action_name, "type": req.action_type}),
    );
    match state.gateway().submit(&req).await {
        Ok(result) => {
            state.bus().publish(
                topics::TOPIC_ACTIONS_COMPLETED,
                &json!({
                    "action": req.action_name,
                    "status": result.status.as_str(),
                    "success": result.success,
                }),
            );
            (axum::http::StatusCode::OK, Json(result)).into_response()
        }
        Err(err) => {
            state.bus().publish(
                topics::TOPIC_ACTIONS_FAILED,
                &json!({"action": req.action_name, "code": err.code()}),
            );
            responses::gateway_error(err)
        }
    }
}
