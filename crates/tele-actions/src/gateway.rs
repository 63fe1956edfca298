use std::sync::Arc;
use std::time::Duration;

use serde_json::Value;
use tokio::time::Instant;
use tracing::{debug, warn};

use tele_protocol::{ActionRequest, ActionResult};

use crate::registry::ActionTypeRegistry;
use crate::transport::{ActionTransport, TransportError};
use crate::GatewayError;

#[derive(Debug, Clone)]
pub struct GatewayOptions {
    /// How long to wait for a remote handler to become reachable.
    pub discovery_timeout: Duration,
    /// How long to wait for a submitted goal to reach a terminal status.
    pub result_timeout: Duration,
    /// Pause between handler probes inside the discovery window.
    pub probe_interval: Duration,
}

impl Default for GatewayOptions {
    fn default() -> Self {
        Self {
            discovery_timeout: Duration::from_secs(5),
            result_timeout: Duration::from_secs(30),
            probe_interval: Duration::from_millis(250),
        }
    }
}

impl GatewayOptions {
    pub fn from_env() -> Self {
        let mut opts = Self::default();
        if let Some(ms) = env_ms("TELE_DISCOVERY_TIMEOUT_MS") {
            opts.discovery_timeout = Duration::from_millis(ms);
        }
        if let Some(ms) = env_ms("TELE_RESULT_TIMEOUT_MS") {
            opts.result_timeout = Duration::from_millis(ms);
        }
        if let Some(ms) = env_ms("TELE_PROBE_INTERVAL_MS") {
            opts.probe_interval = Duration::from_millis(ms.max(10));
        }
        opts
    }
}

fn env_ms(key: &str) -> Option<u64> {
    std::env::var(key)
        .ok()
        .and_then(|value| value.trim().parse::<u64>().ok())
        .filter(|value| *value > 0)
}

/// Stateless-per-call bridge from HTTP requests to the remote actuation
/// protocol. Calls against different action names may run concurrently;
/// the gateway neither serializes nor deduplicates them.
pub struct ActionGateway {
    registry: ActionTypeRegistry,
    transport: Arc<dyn ActionTransport>,
    opts: GatewayOptions,
}

impl ActionGateway {
    pub fn new(registry: ActionTypeRegistry, transport: Arc<dyn ActionTransport>) -> Self {
        Self::with_options(registry, transport, GatewayOptions::default())
    }

    pub fn with_options(
        registry: ActionTypeRegistry,
        transport: Arc<dyn ActionTransport>,
        opts: GatewayOptions,
    ) -> Self {
        Self {
            registry,
            transport,
            opts,
        }
    }

    pub fn registry(&self) -> &ActionTypeRegistry {
        &self.registry
    }

    /// Resolve, discover, submit, and await a terminal result.
    ///
    /// The only suspension points are the bounded handler discovery and the
    /// bounded result wait; a failure on either path surfaces immediately
    /// and nothing is retried here.
    pub async fn submit(&self, req: &ActionRequest) -> Result<ActionResult, GatewayError> {
        let name = req.action_name.trim();
        if name.is_empty() {
            return Err(GatewayError::InvalidRequest(
                "action_name must not be empty".into(),
            ));
        }
        if !name.starts_with('/') {
            return Err(GatewayError::InvalidRequest(format!(
                "action_name `{name}` is not path-like"
            )));
        }
        let descriptor = self.registry.resolve(&req.action_type)?;

        self.await_handler(name, &descriptor.remote_type).await?;

        let result_timeout = descriptor
            .result_timeout_ms
            .map(Duration::from_millis)
            .unwrap_or(self.opts.result_timeout);
        debug!(target: "gateway", action = name, tag = %req.action_type, "submitting goal");
        let outcome = tokio::time::timeout(
            result_timeout,
            self.transport
                .execute(name, &descriptor.remote_type, &req.goal),
        )
        .await
        .map_err(|_| GatewayError::Timeout {
            action: name.to_string(),
            waited_ms: result_timeout.as_millis() as u64,
        })??;

        if !outcome.status.is_terminal() {
            warn!(
                target: "gateway",
                action = name,
                status = outcome.status.as_str(),
                "transport returned a non-terminal status"
            );
        }
        Ok(ActionResult::from_terminal(
            outcome.status,
            sanitize_payload(outcome.payload),
        ))
    }

    /// Poll the transport until a handler answers for `name` or the
    /// discovery deadline passes. The goal is never submitted on failure.
    async fn await_handler(&self, name: &str, remote_type: &str) -> Result<(), GatewayError> {
        let deadline = Instant::now() + self.opts.discovery_timeout;
        loop {
            match self.transport.resolve_handler(name, remote_type).await {
                Ok(true) => return Ok(()),
                Ok(false) | Err(TransportError::Unreachable(_)) => {}
                Err(err @ TransportError::Protocol(_)) => return Err(err.into()),
            }
            let now = Instant::now();
            if now >= deadline {
                return Err(GatewayError::ServerUnavailable {
                    action: name.to_string(),
                    waited_ms: self.opts.discovery_timeout.as_millis() as u64,
                });
            }
            let remaining = deadline - now;
            tokio::time::sleep(self.opts.probe_interval.min(remaining)).await;
        }
    }
}

/// Reduce a terminal payload to plain JSON the dashboard can consume.
/// Underscore-prefixed top-level keys are transport bookkeeping (goal ids,
/// routing hints) and are dropped; everything else passes through.
fn sanitize_payload(payload: Value) -> Value {
    match payload {
        Value::Object(map) => Value::Object(
            map.into_iter()
                .filter(|(key, _)| !key.starts_with('_'))
                .collect(),
        ),
        other => other,
    }
}
