use async_trait::async_trait;
use serde_json::Value;
use tele_protocol::ActionStatus;

/// Terminal outcome of a goal as reported by the remote side, before the
/// gateway normalizes it into an `ActionResult`.
#[derive(Debug, Clone)]
pub struct GoalOutcome {
    pub status: ActionStatus,
    pub payload: Value,
}

#[derive(Debug, thiserror::Error)]
pub enum TransportError {
    /// The bridge or handler could not be reached. Treated as "keep
    /// probing" during the discovery window and as a hard failure after it.
    #[error("unreachable: {0}")]
    Unreachable(String),
    /// The remote side answered with something the transport cannot
    /// interpret.
    #[error("protocol error: {0}")]
    Protocol(String),
}

/// Wire seam between the gateway and the remote actuation protocol.
///
/// Implementations must not enforce their own overall deadlines; the
/// gateway bounds both calls with its discovery and result timeouts.
#[async_trait]
pub trait ActionTransport: Send + Sync {
    /// Probe whether a remote handler is currently reachable under
    /// `action_name`. `Ok(false)` means "not yet"; the gateway retries
    /// until its discovery deadline.
    async fn resolve_handler(
        &self,
        action_name: &str,
        remote_type: &str,
    ) -> Result<bool, TransportError>;

    /// Submit `goal` and follow it to a terminal status.
    async fn execute(
        &self,
        action_name: &str,
        remote_type: &str,
        goal: &Value,
    ) -> Result<GoalOutcome, TransportError>;
}
