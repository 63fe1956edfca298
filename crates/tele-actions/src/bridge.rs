use std::time::Duration;

use async_trait::async_trait;
use serde_json::Value;
use tracing::debug;

use tele_protocol::ActionStatus;

use crate::transport::{ActionTransport, GoalOutcome, TransportError};

/// Transport speaking to the robot-side action bridge over HTTP.
///
/// The bridge fronts the dynamically-typed actuation protocol: handler
/// probes are `GET {base}/actions{name}`, goals are posted to
/// `{base}/actions{name}/goals` and answered with a goal id, and the goal
/// is then followed at `{base}/goals/{id}` until a terminal status shows
/// up. The shared `reqwest::Client` doubles as the per-`(type, name)`
/// client cache the gateway is allowed to keep.
pub struct BridgeTransport {
    base: String,
    client: reqwest::Client,
    poll_interval: Duration,
}

impl BridgeTransport {
    pub fn new(base_url: &str) -> Self {
        Self {
            base: base_url.trim_end_matches('/').to_string(),
            client: reqwest::Client::new(),
            poll_interval: Duration::from_millis(200),
        }
    }

    /// Base URL from `TELE_BRIDGE_URL`, defaulting to the local bridge.
    pub fn from_env() -> Self {
        let base = std::env::var("TELE_BRIDGE_URL")
            .ok()
            .filter(|value| !value.trim().is_empty())
            .unwrap_or_else(|| "http://127.0.0.1:9091".to_string());
        Self::new(&base)
    }

    pub fn with_poll_interval(mut self, poll_interval: Duration) -> Self {
        self.poll_interval = poll_interval.max(Duration::from_millis(10));
        self
    }

    fn action_url(&self, action_name: &str) -> String {
        format!("{}/actions{}", self.base, action_name)
    }
}

#[derive(serde::Deserialize)]
struct GoalAccepted {
    goal_id: String,
}

#[derive(serde::Deserialize)]
struct GoalSnapshot {
    status: String,
    #[serde(default)]
    result: Value,
}

#[async_trait]
impl ActionTransport for BridgeTransport {
    async fn resolve_handler(
        &self,
        action_name: &str,
        _remote_type: &str,
    ) -> Result<bool, TransportError> {
        let url = self.action_url(action_name);
        match self.client.get(&url).send().await {
            Ok(resp) if resp.status().is_success() => Ok(true),
            Ok(resp) if resp.status() == reqwest::StatusCode::NOT_FOUND => Ok(false),
            Ok(resp) => Err(TransportError::Protocol(format!(
                "handler probe for `{action_name}` answered {}",
                resp.status()
            ))),
            Err(err) => Err(TransportError::Unreachable(err.to_string())),
        }
    }

    async fn execute(
        &self,
        action_name: &str,
        remote_type: &str,
        goal: &Value,
    ) -> Result<GoalOutcome, TransportError> {
        let url = format!("{}/goals", self.action_url(action_name));
        let resp = self
            .client
            .post(&url)
            .json(&serde_json::json!({"type": remote_type, "goal": goal}))
            .send()
            .await
            .map_err(|err| TransportError::Unreachable(err.to_string()))?;
        if !resp.status().is_success() {
            return Err(TransportError::Protocol(format!(
                "goal submission for `{action_name}` answered {}",
                resp.status()
            )));
        }
        let accepted: GoalAccepted = resp
            .json()
            .await
            .map_err(|err| TransportError::Protocol(format!("goal ack: {err}")))?;
        debug!(target: "bridge", action = action_name, goal_id = %accepted.goal_id, "goal accepted");

        let goal_url = format!("{}/goals/{}", self.base, accepted.goal_id);
        loop {
            let resp = self
                .client
                .get(&goal_url)
                .send()
                .await
                .map_err(|err| TransportError::Unreachable(err.to_string()))?;
            if !resp.status().is_success() {
                return Err(TransportError::Protocol(format!(
                    "goal poll for `{}` answered {}",
                    accepted.goal_id,
                    resp.status()
                )));
            }
            let snapshot: GoalSnapshot = resp
                .json()
                .await
                .map_err(|err| TransportError::Protocol(format!("goal snapshot: {err}")))?;
            let status = ActionStatus::from_slug(&snapshot.status);
            if status.is_terminal() {
                return Ok(GoalOutcome {
                    status,
                    payload: snapshot.result,
                });
            }
            tokio::time::sleep(self.poll_interval).await;
        }
    }
}
