use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use tracing::warn;

use tele_protocol::{LogRecord, SessionEvent, SessionSummary};

use crate::SessionError;

/// Everything the manager needs to survive a restart, in one document:
/// the descriptor, the event buffer and the acknowledgement watermark.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PersistedSession {
    pub session: SessionSummary,
    pub events: Vec<SessionEvent>,
    pub watermark: usize,
    pub ended: bool,
}

impl PersistedSession {
    pub fn new(session: SessionSummary) -> Self {
        Self {
            session,
            events: Vec::new(),
            watermark: 0,
            ended: false,
        }
    }

    /// Events not yet acknowledged by the log store.
    pub fn pending(&self) -> &[SessionEvent] {
        &self.events[self.watermark.min(self.events.len())..]
    }

    pub fn fully_synced(&self) -> bool {
        self.watermark >= self.events.len()
    }

    /// Full newline-delimited document for the idempotent resend path:
    /// one summary record, then every event in append order.
    pub fn to_log_text(&self) -> String {
        let mut lines = Vec::with_capacity(self.events.len() + 1);
        lines.push(record_line(&LogRecord::Session(self.session.clone())));
        for event in &self.events {
            lines.push(record_line(&LogRecord::Event(event.clone())));
        }
        lines.join("\n")
    }
}

fn record_line(record: &LogRecord) -> String {
    serde_json::to_string(record).unwrap_or_else(|_| "{}".to_string())
}

/// Durable local home of session documents, one JSON file per session id.
pub struct SessionStore {
    root: PathBuf,
}

impl SessionStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn doc_path(&self, session_id: &str) -> PathBuf {
        self.root.join(format!("{session_id}.json"))
    }

    pub async fn save(&self, doc: &PersistedSession) -> Result<(), SessionError> {
        let bytes = serde_json::to_vec_pretty(doc)
            .map_err(|err| SessionError::Storage(err.to_string()))?;
        save_bytes_atomic(&self.doc_path(&doc.session.session_id), &bytes)
            .await
            .map_err(|err| SessionError::Storage(err.to_string()))
    }

    pub async fn load(&self, session_id: &str) -> Result<Option<PersistedSession>, SessionError> {
        let path = self.doc_path(session_id);
        let bytes = match tokio::fs::read(&path).await {
            Ok(bytes) => bytes,
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(err) => return Err(SessionError::Storage(err.to_string())),
        };
        serde_json::from_slice(&bytes)
            .map(Some)
            .map_err(|err| SessionError::Storage(err.to_string()))
    }

    pub async fn remove(&self, session_id: &str) -> Result<(), SessionError> {
        match tokio::fs::remove_file(self.doc_path(session_id)).await {
            Ok(()) => Ok(()),
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(err) => Err(SessionError::Storage(err.to_string())),
        }
    }

    /// Pick up where a crashed or reloaded process left off.
    ///
    /// An active (non-ended) document wins; failing that, an ended one
    /// still holding unacknowledged events. A document that does not parse
    /// is data loss, not a startup failure: it is renamed aside with a
    /// warning and skipped.
    pub async fn recover(&self) -> Option<PersistedSession> {
        let mut entries = match tokio::fs::read_dir(&self.root).await {
            Ok(entries) => entries,
            Err(_) => return None,
        };
        let mut active: Option<PersistedSession> = None;
        let mut ended_pending: Option<PersistedSession> = None;
        while let Ok(Some(entry)) = entries.next_entry().await {
            let path = entry.path();
            if path.extension().and_then(|ext| ext.to_str()) != Some("json") {
                continue;
            }
            let bytes = match tokio::fs::read(&path).await {
                Ok(bytes) => bytes,
                Err(err) => {
                    warn!(target: "session", "unreadable session document {}: {err}", path.display());
                    continue;
                }
            };
            let doc: PersistedSession = match serde_json::from_slice(&bytes) {
                Ok(doc) => doc,
                Err(err) => {
                    warn!(
                        target: "session",
                        "corrupt session document {} set aside: {err}",
                        path.display()
                    );
                    let _ = tokio::fs::rename(&path, path.with_extension("corrupt")).await;
                    continue;
                }
            };
            if !doc.ended {
                let newer = active
                    .as_ref()
                    .map(|existing| doc.session.start_time > existing.session.start_time)
                    .unwrap_or(true);
                if newer {
                    active = Some(doc);
                }
            } else if !doc.fully_synced() && ended_pending.is_none() {
                ended_pending = Some(doc);
            }
        }
        active.or(ended_pending)
    }
}

/// Write-then-rename so a crash mid-write never truncates the document.
async fn save_bytes_atomic(path: &Path, bytes: &[u8]) -> std::io::Result<()> {
    if let Some(parent) = path.parent() {
        tokio::fs::create_dir_all(parent).await?;
    }
    let tmp = path.with_extension("tmp");
    tokio::fs::write(&tmp, bytes).await?;
    match tokio::fs::rename(&tmp, path).await {
        Ok(()) => Ok(()),
        Err(_) => {
            let _ = tokio::fs::remove_file(path).await;
            let res = tokio::fs::rename(&tmp, path).await;
            if res.is_err() {
                let _ = tokio::fs::remove_file(&tmp).await;
            }
            res
        }
    }
}
