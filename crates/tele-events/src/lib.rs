use serde::{Deserialize, Serialize};
use serde_json::Value;
use tokio::sync::broadcast;

/// Minimal event envelope (RFC3339 time with millis).
#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct Envelope {
    pub time: String,
    pub kind: String,
    pub payload: Value,
}

/// Broadcast bus for JSON-serializable control-plane events.
///
/// Publishing never blocks and never fails: with no subscribers the event
/// is simply dropped, which is the right behavior for an observability
/// side channel.
#[derive(Clone)]
pub struct Bus {
    tx: broadcast::Sender<Envelope>,
}

impl Bus {
    pub fn new(capacity: usize) -> Self {
        let (tx, _rx) = broadcast::channel(capacity.max(1));
        Self { tx }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<Envelope> {
        self.tx.subscribe()
    }

    pub fn publish<T: Serialize>(&self, kind: &str, payload: &T) {
        let now = chrono::Utc::now().to_rfc3339_opts(chrono::SecondsFormat::Millis, true);
        let payload = serde_json::to_value(payload)
            .unwrap_or_else(|_| serde_json::json!({"_ser": "error"}));
        let _ = self.tx.send(Envelope {
            time: now,
            kind: kind.to_string(),
            payload,
        });
    }
}

impl Default for Bus {
    fn default() -> Self {
        Self::new(64)
    }
}
