//! Scriptable in-memory transport for gateway and server tests.

use std::collections::HashMap;
use std::sync::Mutex;
use std::time::Duration;

use async_trait::async_trait;
use serde_json::Value;
use tokio::time::Instant;

use tele_protocol::ActionStatus;

use crate::transport::{ActionTransport, GoalOutcome, TransportError};

/// What the fake remote handler for one action name should do.
#[derive(Debug, Clone)]
pub struct MockBehavior {
    pub status: ActionStatus,
    pub payload: Value,
    pub latency: Duration,
    pub reachable_at: Option<Instant>,
}

impl MockBehavior {
    pub fn finish(status: ActionStatus, payload: Value) -> Self {
        Self {
            status,
            payload,
            latency: Duration::ZERO,
            reachable_at: None,
        }
    }

    pub fn succeed(payload: Value) -> Self {
        Self::finish(ActionStatus::Succeeded, payload)
    }

    pub fn with_latency(mut self, latency: Duration) -> Self {
        self.latency = latency;
        self
    }

    /// Handler only answers discovery probes after `delay` has elapsed.
    pub fn reachable_after(mut self, delay: Duration) -> Self {
        self.reachable_at = Some(Instant::now() + delay);
        self
    }
}

/// Transport whose handlers are scripted per action name. Unknown names
/// never become reachable, which is how tests model an absent server.
#[derive(Default)]
pub struct MockTransport {
    behaviors: Mutex<HashMap<String, MockBehavior>>,
    submitted: Mutex<Vec<String>>,
}

impl MockTransport {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn script(&self, action_name: &str, behavior: MockBehavior) {
        self.behaviors
            .lock()
            .expect("mock behaviors lock")
            .insert(action_name.to_string(), behavior);
    }

    /// Action names whose goals were actually submitted, in order.
    pub fn submitted(&self) -> Vec<String> {
        self.submitted.lock().expect("mock submitted lock").clone()
    }
}

#[async_trait]
impl ActionTransport for MockTransport {
    async fn resolve_handler(
        &self,
        action_name: &str,
        _remote_type: &str,
    ) -> Result<bool, TransportError> {
        let guard = self.behaviors.lock().expect("mock behaviors lock");
        match guard.get(action_name) {
            Some(behavior) => match behavior.reachable_at {
                Some(at) => Ok(Instant::now() >= at),
                None => Ok(true),
            },
            None => Ok(false),
        }
    }

    async fn execute(
        &self,
        action_name: &str,
        _remote_type: &str,
        _goal: &Value,
    ) -> Result<GoalOutcome, TransportError> {
        let behavior = {
            let guard = self.behaviors.lock().expect("mock behaviors lock");
            guard
                .get(action_name)
                .cloned()
                .ok_or_else(|| TransportError::Unreachable(action_name.to_string()))?
        };
        self.submitted
            .lock()
            .expect("mock submitted lock")
            .push(action_name.to_string());
        if behavior.latency > Duration::ZERO {
            tokio::time::sleep(behavior.latency).await;
        }
        Ok(GoalOutcome {
            status: behavior.status,
            payload: behavior.payload,
        })
    }
}
