use async_trait::async_trait;
use serde_json::json;

use tele_protocol::{LogRecord, SessionEvent};

/// Destination for synchronized session logs.
#[derive(Debug, thiserror::Error)]
pub enum SinkError {
    /// Capability signal: the incremental append path is not available for
    /// this session (store never saw it, or does not speak append). The
    /// caller falls back to an idempotent full save. Never user-visible.
    #[error("incremental append unsupported for this session")]
    Unsupported,
    /// Transient failure; safe to retry on the next tick.
    #[error("log store unavailable: {0}")]
    Unavailable(String),
}

#[async_trait]
pub trait LogSink: Send + Sync {
    /// Append `pending` event records to an existing session log.
    /// At-least-once: resending the same records must be tolerated.
    async fn append(&self, session_id: &str, pending: &[SessionEvent]) -> Result<(), SinkError>;

    /// Replace the whole session log with `full_log` (summary record plus
    /// all events). Idempotent, keyed by session id.
    async fn save(&self, session_id: &str, full_log: &str) -> Result<(), SinkError>;
}

/// Sink talking to the log store's HTTP surface.
///
/// `append` answering 404 means the store has no file for this session
/// (the `unknown_session` problem code); that maps onto
/// `SinkError::Unsupported` so the manager resends the full document. A
/// 501 from stores that never grew the append endpoint maps the same way.
pub struct HttpLogSink {
    base: String,
    client: reqwest::Client,
}

impl HttpLogSink {
    pub fn new(base_url: &str) -> Self {
        Self {
            base: base_url.trim_end_matches('/').to_string(),
            client: reqwest::Client::new(),
        }
    }

    /// Base URL from `TELE_SERVER_URL`, defaulting to the local server.
    pub fn from_env() -> Self {
        let base = std::env::var("TELE_SERVER_URL")
            .ok()
            .filter(|value| !value.trim().is_empty())
            .unwrap_or_else(|| "http://127.0.0.1:8090".to_string());
        Self::new(&base)
    }
}

#[async_trait]
impl LogSink for HttpLogSink {
    async fn append(&self, session_id: &str, pending: &[SessionEvent]) -> Result<(), SinkError> {
        let logs = pending
            .iter()
            .map(|event| {
                serde_json::to_string(&LogRecord::Event(event.clone()))
                    .unwrap_or_else(|_| "{}".to_string())
            })
            .collect::<Vec<_>>()
            .join("\n");
        let resp = self
            .client
            .post(format!("{}/experiment/logs/append", self.base))
            .json(&json!({"session_id": session_id, "logs": logs}))
            .send()
            .await
            .map_err(|err| SinkError::Unavailable(err.to_string()))?;
        let status = resp.status();
        if status.is_success() {
            Ok(())
        } else if status == reqwest::StatusCode::NOT_FOUND
            || status == reqwest::StatusCode::NOT_IMPLEMENTED
        {
            Err(SinkError::Unsupported)
        } else {
            Err(SinkError::Unavailable(format!("append answered {status}")))
        }
    }

    async fn save(&self, session_id: &str, full_log: &str) -> Result<(), SinkError> {
        let resp = self
            .client
            .post(format!("{}/experiment/logs/save", self.base))
            .json(&json!({"session_id": session_id, "logs": full_log}))
            .send()
            .await
            .map_err(|err| SinkError::Unavailable(err.to_string()))?;
        if resp.status().is_success() {
            Ok(())
        } else {
            Err(SinkError::Unavailable(format!(
                "save answered {}",
                resp.status()
            )))
        }
    }
}
