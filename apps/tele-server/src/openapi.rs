use axum::response::IntoResponse;
use utoipa::OpenApi;

use crate::api;

#[derive(OpenApi)]
#[openapi(
    info(
        title = "tele-server",
        description = "Teleoperation control plane: action gateway, bag recording, experiment logs."
    ),
    paths(
        api::meta::healthz,
        api::meta::about,
        api::meta::robot_profile,
        api::actions::generic_action,
        api::bag::bag_start,
        api::bag::bag_stop,
        api::bag::bag_status,
        api::logs::logs_append,
        api::logs::logs_save,
        api::logs::logs_list,
        api::logs::logs_download,
    ),
    components(schemas(
        tele_protocol::ActionRequest,
        tele_protocol::ActionResult,
        tele_protocol::ActionStatus,
        tele_protocol::BagStartRequest,
        tele_protocol::BagStatus,
        tele_protocol::LogFileMeta,
        tele_protocol::RobotProfile,
        tele_protocol::CapabilityBinding,
        tele_protocol::MovementParams,
        api::logs::LogsPayload,
    ))
)]
pub struct ApiDoc;

pub async fn openapi_yaml() -> axum::response::Response {
    match ApiDoc::openapi().to_yaml() {
        Ok(yaml) => (
            axum::http::StatusCode::OK,
            [(axum::http::header::CONTENT_TYPE, "application/yaml")],
            yaml,
        )
            .into_response(),
        Err(err) => (
            axum::http::StatusCode::INTERNAL_SERVER_ERROR,
            format!("openapi generation failed: {err}"),
        )
            .into_response(),
    }
}
