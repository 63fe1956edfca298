use axum::{
    routing::{get, post},
    Router,
};

use crate::{api, AppState};

pub(crate) mod paths {
    pub const HEALTHZ: &str = "/healthz";
    pub const ABOUT: &str = "/about";
    pub const ROBOT_PROFILE: &str = "/robot/profile";
    pub const OPENAPI: &str = "/spec/openapi.yaml";
    pub const GENERIC_ACTION: &str = "/generic-action";
    pub const BAG_START: &str = "/bag/start";
    pub const BAG_STOP: &str = "/bag/stop";
    pub const BAG_STATUS: &str = "/bag/status";
    pub const LOGS_APPEND: &str = "/experiment/logs/append";
    pub const LOGS_SAVE: &str = "/experiment/logs/save";
    pub const LOGS_LIST: &str = "/experiment/logs/list";
    pub const LOGS_DOWNLOAD: &str = "/experiment/logs/download/{session_id}";
}

pub(crate) fn endpoint_list() -> Vec<&'static str> {
    vec![
        paths::HEALTHZ,
        paths::ABOUT,
        paths::ROBOT_PROFILE,
        paths::OPENAPI,
        paths::GENERIC_ACTION,
        paths::BAG_START,
        paths::BAG_STOP,
        paths::BAG_STATUS,
        paths::LOGS_APPEND,
        paths::LOGS_SAVE,
        paths::LOGS_LIST,
        paths::LOGS_DOWNLOAD,
    ]
}

pub(crate) fn build_router() -> Router<AppState> {
    Router::new()
        .route(paths::HEALTHZ, get(api::meta::healthz))
        .route(paths::ABOUT, get(api::meta::about))
        .route(paths::ROBOT_PROFILE, get(api::meta::robot_profile))
        .route(paths::OPENAPI, get(crate::openapi::openapi_yaml))
        .route(paths::GENERIC_ACTION, post(api::actions::generic_action))
        .route(paths::BAG_START, post(api::bag::bag_start))
        .route(paths::BAG_STOP, post(api::bag::bag_stop))
        .route(paths::BAG_STATUS, get(api::bag::bag_status))
        .route(paths::LOGS_APPEND, post(api::logs::logs_append))
        .route(paths::LOGS_SAVE, post(api::logs::logs_save))
        .route(paths::LOGS_LIST, get(api::logs::logs_list))
        .route(paths::LOGS_DOWNLOAD, get(api::logs::logs_download))
}
