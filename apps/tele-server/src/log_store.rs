use std::path::{Path, PathBuf};

use chrono::{DateTime, SecondsFormat, Utc};
use tracing::warn;

use tele_protocol::LogFileMeta;

#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("no log file for session `{0}`")]
    UnknownSession(String),
    #[error("invalid log payload: {0}")]
    InvalidRequest(String),
    #[error("io error: {0}")]
    Io(String),
}

/// Durable backend for experiment session logs: one newline-delimited-JSON
/// file per session id under the store root. The first record of a file is
/// the session summary; the rest are events.
pub struct LogStore {
    root: PathBuf,
}

impl LogStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    fn file_path(&self, session_id: &str) -> Result<PathBuf, StoreError> {
        validate_session_id(session_id)?;
        Ok(self.root.join(format!("{session_id}.jsonl")))
    }

    /// Append event records to an existing session file.
    ///
    /// Exact-duplicate resends from an at-least-once client are fine: the
    /// file may grow duplicates but never loses records. Appending to a
    /// session the store has never seen fails `UnknownSession`; that is
    /// the capability signal telling the client to send the full document
    /// through `save` instead.
    pub async fn append(&self, session_id: &str, logs: &str) -> Result<usize, StoreError> {
        let path = self.file_path(session_id)?;
        let lines = checked_lines(logs)?;
        if lines.is_empty() {
            return Ok(0);
        }
        if !tokio::fs::try_exists(&path)
            .await
            .map_err(|err| StoreError::Io(err.to_string()))?
        {
            return Err(StoreError::UnknownSession(session_id.to_string()));
        }
        let mut payload = lines.join("\n");
        payload.push('\n');
        append_to_file(&path, payload.as_bytes())
            .await
            .map_err(|err| StoreError::Io(err.to_string()))?;
        Ok(lines.len())
    }

    /// Replace the session's file with `logs` wholesale. Idempotent by
    /// construction: saving the same document twice leaves the same bytes.
    pub async fn save(&self, session_id: &str, logs: &str) -> Result<(), StoreError> {
        let path = self.file_path(session_id)?;
        let lines = checked_lines(logs)?;
        let mut payload = lines.join("\n");
        payload.push('\n');
        save_bytes_atomic(&path, payload.as_bytes())
            .await
            .map_err(|err| StoreError::Io(err.to_string()))
    }

    pub async fn read(&self, session_id: &str) -> Result<String, StoreError> {
        let path = self.file_path(session_id)?;
        match tokio::fs::read_to_string(&path).await {
            Ok(text) => Ok(text),
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => {
                Err(StoreError::UnknownSession(session_id.to_string()))
            }
            Err(err) => Err(StoreError::Io(err.to_string())),
        }
    }

    /// Per-session metadata for operator review, newest first.
    pub async fn list(&self) -> Result<Vec<LogFileMeta>, StoreError> {
        let mut entries = match tokio::fs::read_dir(&self.root).await {
            Ok(entries) => entries,
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(err) => return Err(StoreError::Io(err.to_string())),
        };
        let mut files = Vec::new();
        while let Ok(Some(entry)) = entries.next_entry().await {
            let path = entry.path();
            if path.extension().and_then(|ext| ext.to_str()) != Some("jsonl") {
                continue;
            }
            let Some(session_id) = path.file_stem().and_then(|stem| stem.to_str()) else {
                continue;
            };
            let meta = match entry.metadata().await {
                Ok(meta) => meta,
                Err(err) => {
                    warn!(target: "log_store", "stat {} failed: {err}", path.display());
                    continue;
                }
            };
            let modified = meta.modified().map(format_time).unwrap_or_default();
            let created = meta
                .created()
                .map(format_time)
                .unwrap_or_else(|_| modified.clone());
            files.push(LogFileMeta {
                name: format!("{session_id}.jsonl"),
                session_id: session_id.to_string(),
                created,
                modified,
                size: meta.len(),
            });
        }
        files.sort_by(|a, b| b.modified.cmp(&a.modified));
        Ok(files)
    }
}

/// Session ids are generated as timestamp + hex suffix; anything outside
/// that alphabet is rejected before it can become a path component.
fn validate_session_id(session_id: &str) -> Result<(), StoreError> {
    let ok = !session_id.is_empty()
        && session_id
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '-');
    if ok {
        Ok(())
    } else {
        Err(StoreError::InvalidRequest(format!(
            "bad session id `{session_id}`"
        )))
    }
}

/// Every non-empty line must be a JSON object; a malformed payload is
/// rejected whole so a bad request can never corrupt an existing file.
fn checked_lines(logs: &str) -> Result<Vec<&str>, StoreError> {
    let mut lines = Vec::new();
    for (idx, line) in logs.lines().enumerate() {
        let line = line.trim();
        if line.is_empty() {
            continue;
        }
        match serde_json::from_str::<serde_json::Value>(line) {
            Ok(value) if value.is_object() => lines.push(line),
            Ok(_) => {
                return Err(StoreError::InvalidRequest(format!(
                    "line {} is not a JSON object",
                    idx + 1
                )))
            }
            Err(err) => {
                return Err(StoreError::InvalidRequest(format!(
                    "line {} is not valid JSON: {err}",
                    idx + 1
                )))
            }
        }
    }
    Ok(lines)
}

fn format_time(time: std::time::SystemTime) -> String {
    DateTime::<Utc>::from(time).to_rfc3339_opts(SecondsFormat::Millis, true)
}

async fn append_to_file(path: &Path, bytes: &[u8]) -> std::io::Result<()> {
    use tokio::io::AsyncWriteExt;
    let mut file = tokio::fs::OpenOptions::new()
        .append(true)
        .open(path)
        .await?;
    file.write_all(bytes).await?;
    file.flush().await
}

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

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    const SUMMARY: &str = r#"{"record":"session","session_id":"s1","start_time":"t0"}"#;
    const EVENT_A: &str = r#"{"record":"event","time":"t1","event_type":"observation","action":"wave"}"#;
    const EVENT_B: &str = r#"{"record":"event","time":"t2","event_type":"observation","action":"nod"}"#;

    #[tokio::test]
    async fn append_to_unknown_session_signals_fallback() {
        let dir = tempdir().expect("tempdir");
        let store = LogStore::new(dir.path());
        let err = store.append("s1", EVENT_A).await.expect_err("no file yet");
        assert!(matches!(err, StoreError::UnknownSession(_)));
    }

    #[tokio::test]
    async fn save_then_append_round_trips() {
        let dir = tempdir().expect("tempdir");
        let store = LogStore::new(dir.path());
        store
            .save("s1", &format!("{SUMMARY}\n{EVENT_A}"))
            .await
            .expect("save");
        let appended = store.append("s1", EVENT_B).await.expect("append");
        assert_eq!(appended, 1);
        let text = store.read("s1").await.expect("read");
        let lines: Vec<&str> = text.lines().collect();
        assert_eq!(lines, vec![SUMMARY, EVENT_A, EVENT_B]);
    }

    #[tokio::test]
    async fn duplicate_append_grows_but_never_loses() {
        let dir = tempdir().expect("tempdir");
        let store = LogStore::new(dir.path());
        store.save("s1", SUMMARY).await.expect("save");
        store.append("s1", EVENT_A).await.expect("append");
        store.append("s1", EVENT_A).await.expect("resend");
        let text = store.read("s1").await.expect("read");
        assert_eq!(text.lines().filter(|line| *line == EVENT_A).count(), 2);
        assert_eq!(text.lines().count(), 3);
    }

    #[tokio::test]
    async fn save_is_idempotent() {
        let dir = tempdir().expect("tempdir");
        let store = LogStore::new(dir.path());
        let doc = format!("{SUMMARY}\n{EVENT_A}");
        store.save("s1", &doc).await.expect("save");
        let first = store.read("s1").await.expect("read");
        store.save("s1", &doc).await.expect("resave");
        assert_eq!(store.read("s1").await.expect("read"), first);
    }

    #[tokio::test]
    async fn malformed_lines_reject_without_touching_the_file() {
        let dir = tempdir().expect("tempdir");
        let store = LogStore::new(dir.path());
        store.save("s1", SUMMARY).await.expect("save");
        let err = store
            .append("s1", "{broken json")
            .await
            .expect_err("bad line");
        assert!(matches!(err, StoreError::InvalidRequest(_)));
        let err = store.append("s1", "[1,2,3]").await.expect_err("not object");
        assert!(matches!(err, StoreError::InvalidRequest(_)));
        assert_eq!(store.read("s1").await.expect("read").lines().count(), 1);
    }

    #[tokio::test]
    async fn traversal_ids_are_rejected() {
        let dir = tempdir().expect("tempdir");
        let store = LogStore::new(dir.path());
        for bad in ["../evil", "a/b", "", "x y"] {
            let err = store.save(bad, SUMMARY).await.expect_err("bad id");
            assert!(matches!(err, StoreError::InvalidRequest(_)), "{bad}");
        }
    }

    #[tokio::test]
    async fn list_reports_metadata() {
        let dir = tempdir().expect("tempdir");
        let store = LogStore::new(dir.path());
        store.save("s1", SUMMARY).await.expect("save s1");
        store
            .save("s2", &format!("{SUMMARY}\n{EVENT_A}"))
            .await
            .expect("save s2");
        let files = store.list().await.expect("list");
        assert_eq!(files.len(), 2);
        let s2 = files
            .iter()
            .find(|meta| meta.session_id == "s2")
            .expect("s2 listed");
        assert_eq!(s2.name, "s2.jsonl");
        assert!(s2.size > 0);
        assert!(!s2.modified.is_empty());
    }
}
