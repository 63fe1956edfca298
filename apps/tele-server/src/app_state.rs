use std::sync::Arc;

use tele_actions::ActionGateway;
use tele_events::Bus;
use tele_protocol::RobotProfile;
use tele_recorder::BagRecorder;

use crate::log_store::LogStore;

#[derive(Clone)]
pub(crate) struct AppState {
    bus: Bus,
    gateway: Arc<ActionGateway>,
    recorder: Arc<BagRecorder>,
    log_store: Arc<LogStore>,
    profile: Arc<RobotProfile>,
}

impl AppState {
    pub fn new(
        bus: Bus,
        gateway: Arc<ActionGateway>,
        recorder: Arc<BagRecorder>,
        log_store: Arc<LogStore>,
        profile: Arc<RobotProfile>,
    ) -> Self {
        Self {
            bus,
            gateway,
            recorder,
            log_store,
            profile,
        }
    }

    pub fn bus(&self) -> &Bus {
        &self.bus
    }

    pub fn gateway(&self) -> &ActionGateway {
        &self.gateway
    }

    pub fn recorder(&self) -> &BagRecorder {
        &self.recorder
    }

    pub fn log_store(&self) -> &LogStore {
        &self.log_store
    }

    pub fn profile(&self) -> &RobotProfile {
        &self.profile
    }
}
