use std::sync::Arc;
use std::time::Duration;

use serde_json::{json, Value};
use tokio::sync::Mutex;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use tele_events::Bus;
use tele_protocol::{SessionEvent, SessionSummary};
use tele_topics as topics;

use crate::sink::{LogSink, SinkError};
use crate::store::{PersistedSession, SessionStore};
use crate::SessionError;

#[derive(Debug, Clone)]
pub struct SessionOptions {
    /// Cadence of the background synchronize tick while a session is
    /// active.
    pub sync_interval: Duration,
}

impl Default for SessionOptions {
    fn default() -> Self {
        Self {
            sync_interval: Duration::from_secs(10),
        }
    }
}

impl SessionOptions {
    pub fn from_env() -> Self {
        let mut opts = Self::default();
        if let Some(ms) = std::env::var("TELE_SYNC_INTERVAL_MS")
            .ok()
            .and_then(|value| value.trim().parse::<u64>().ok())
            .filter(|value| *value >= 100)
        {
            opts.sync_interval = Duration::from_millis(ms);
        }
        opts
    }
}

#[derive(Debug, Clone, Default)]
pub struct StartOptions {
    pub name: Option<String>,
    pub operator: Option<String>,
    pub notes: Option<String>,
}

/// What a synchronize call actually did.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SyncOutcome {
    /// Nothing pending.
    Clean,
    /// Incremental append of this many events was acknowledged.
    Appended(usize),
    /// Full document resend (this many events) was acknowledged.
    Resent(usize),
    /// Another synchronize was already in flight; this call did nothing.
    Skipped,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionPhase {
    Idle,
    Active,
    /// Stopped, but the store has not acknowledged every event yet.
    EndedPendingSync,
}

#[derive(Debug, Clone)]
pub struct ManagerStatus {
    pub phase: SessionPhase,
    pub session_id: Option<String>,
    pub events: usize,
    pub watermark: usize,
}

/// Owner of the experiment-session state machine and its durable buffer.
///
/// `log_event` touches local storage only; the network happens on the
/// periodic tick and on explicit `synchronize` calls, which never overlap.
pub struct SessionManager {
    store: SessionStore,
    sink: Arc<dyn LogSink>,
    current: Mutex<Option<PersistedSession>>,
    sync_gate: Mutex<()>,
    ticker: std::sync::Mutex<Option<CancellationToken>>,
    bus: Bus,
    opts: SessionOptions,
}

impl SessionManager {
    /// Build the manager and recover whatever a previous process left in
    /// the store. A recovered active session resumes its periodic sync.
    pub async fn new(
        store: SessionStore,
        sink: Arc<dyn LogSink>,
        bus: Bus,
        opts: SessionOptions,
    ) -> Arc<Self> {
        let recovered = store.recover().await;
        let manager = Arc::new(Self {
            store,
            sink,
            current: Mutex::new(recovered),
            sync_gate: Mutex::new(()),
            ticker: std::sync::Mutex::new(None),
            bus,
            opts,
        });
        let resume_ticks = {
            let guard = manager.current.lock().await;
            match guard.as_ref() {
                Some(doc) if !doc.ended => {
                    info!(
                        target: "session",
                        session_id = %doc.session.session_id,
                        events = doc.events.len(),
                        watermark = doc.watermark,
                        "recovered active session"
                    );
                    true
                }
                Some(doc) => {
                    info!(
                        target: "session",
                        session_id = %doc.session.session_id,
                        pending = doc.pending().len(),
                        "recovered ended session awaiting sync"
                    );
                    false
                }
                None => false,
            }
        };
        if resume_ticks {
            manager.spawn_sync_task();
        }
        manager
    }

    /// Create a session and persist its descriptor before returning, so a
    /// crash right after start cannot lose the session identity.
    pub async fn start_session(self: &Arc<Self>, opts: StartOptions) -> Result<String, SessionError> {
        {
            let guard = self.current.lock().await;
            if let Some(doc) = guard.as_ref() {
                if !doc.ended {
                    return Err(SessionError::SessionActive);
                }
            }
        }
        // An ended predecessor may still hold unsynced events; give it one
        // more chance to drain before refusing.
        if self.phase().await == SessionPhase::EndedPendingSync {
            let _ = self.synchronize().await;
            if self.phase().await == SessionPhase::EndedPendingSync {
                return Err(SessionError::UnsyncedEvents);
            }
        }

        let mut guard = self.current.lock().await;
        if guard.as_ref().map(|doc| !doc.ended).unwrap_or(false) {
            return Err(SessionError::SessionActive);
        }
        let now = now_rfc3339();
        let session_id = new_session_id();
        let doc = PersistedSession::new(SessionSummary {
            session_id: session_id.clone(),
            start_time: now,
            end_time: None,
            name: opts.name,
            operator: opts.operator,
            notes: opts.notes,
        });
        self.store.save(&doc).await?;
        *guard = Some(doc);
        drop(guard);

        self.bus
            .publish(topics::TOPIC_SESSION_STARTED, &json!({"session_id": session_id}));
        self.spawn_sync_task();
        Ok(session_id)
    }

    /// Append one event and persist the buffer. Local file I/O only; this
    /// never waits on the log store.
    pub async fn log_event(
        &self,
        event_type: &str,
        action: &str,
        details: Value,
        operator: Option<String>,
    ) -> Result<(), SessionError> {
        let mut guard = self.current.lock().await;
        let doc = guard
            .as_mut()
            .filter(|doc| !doc.ended)
            .ok_or(SessionError::NoActiveSession)?;
        doc.events.push(SessionEvent {
            time: now_rfc3339(),
            event_type: event_type.to_string(),
            action: action.to_string(),
            details,
            operator,
            session_id: Some(doc.session.session_id.clone()),
        });
        self.store.save(doc).await
    }

    /// Push unacknowledged events to the log store.
    ///
    /// Incremental append first; on the store's capability signal, fall
    /// back to an idempotent full resend. The watermark only moves after an
    /// acknowledged success and only up to the snapshot taken before the
    /// network round trip, so events logged mid-flight stay pending. A
    /// failure leaves the watermark untouched; the next tick retries.
    pub async fn synchronize(&self) -> Result<SyncOutcome, SessionError> {
        let Ok(_gate) = self.sync_gate.try_lock() else {
            return Ok(SyncOutcome::Skipped);
        };

        let (session_id, pending, full_log, snapshot_len) = {
            let mut guard = self.current.lock().await;
            let Some(doc) = guard.as_mut() else {
                return Ok(SyncOutcome::Clean);
            };
            if doc.pending().is_empty() {
                self.finish_if_drained(&mut guard);
                return Ok(SyncOutcome::Clean);
            }
            (
                doc.session.session_id.clone(),
                doc.pending().to_vec(),
                doc.to_log_text(),
                doc.events.len(),
            )
        };

        let outcome = match self.sink.append(&session_id, &pending).await {
            Ok(()) => SyncOutcome::Appended(pending.len()),
            Err(SinkError::Unsupported) => match self.sink.save(&session_id, &full_log).await {
                Ok(()) => SyncOutcome::Resent(snapshot_len),
                Err(err) => return self.sync_failed(&session_id, err).await,
            },
            Err(err) => return self.sync_failed(&session_id, err).await,
        };

        {
            let mut guard = self.current.lock().await;
            if let Some(doc) = guard
                .as_mut()
                .filter(|doc| doc.session.session_id == session_id)
            {
                doc.watermark = doc.watermark.max(snapshot_len);
                self.store.save(doc).await?;
            }
            self.finish_if_drained(&mut guard);
        }
        self.bus.publish(
            topics::TOPIC_SESSION_SYNCED,
            &json!({"session_id": session_id, "acknowledged": snapshot_len}),
        );
        Ok(outcome)
    }

    /// End the active session. The final synchronize is best-effort: the
    /// session is marked ended either way, and an unsynced buffer is
    /// retained (phase `EndedPendingSync`) rather than discarded.
    pub async fn stop_session(&self) -> Result<SessionSummary, SessionError> {
        let summary = {
            let mut guard = self.current.lock().await;
            let doc = guard
                .as_mut()
                .filter(|doc| !doc.ended)
                .ok_or(SessionError::NoActiveSession)?;
            doc.session.end_time = Some(now_rfc3339());
            doc.ended = true;
            self.store.save(doc).await?;
            doc.session.clone()
        };
        self.cancel_sync_task();

        match self.synchronize().await {
            Ok(_) => {}
            Err(err) => {
                warn!(target: "session", "final synchronize after stop failed: {err}");
            }
        }
        self.bus.publish(
            topics::TOPIC_SESSION_ENDED,
            &json!({"session_id": summary.session_id}),
        );
        Ok(summary)
    }

    /// Drop the local document. Refuses while events are unsynced unless
    /// forced; the store-side artifact is untouched either way.
    pub async fn clear(&self, force: bool) -> Result<(), SessionError> {
        let mut guard = self.current.lock().await;
        let Some(doc) = guard.as_ref() else {
            return Ok(());
        };
        if !doc.ended {
            return Err(SessionError::SessionActive);
        }
        if !doc.fully_synced() && !force {
            return Err(SessionError::UnsyncedEvents);
        }
        self.store.remove(&doc.session.session_id).await?;
        *guard = None;
        Ok(())
    }

    pub async fn phase(&self) -> SessionPhase {
        let guard = self.current.lock().await;
        match guard.as_ref() {
            None => SessionPhase::Idle,
            Some(doc) if !doc.ended => SessionPhase::Active,
            Some(_) => SessionPhase::EndedPendingSync,
        }
    }

    pub async fn status(&self) -> ManagerStatus {
        let guard = self.current.lock().await;
        match guard.as_ref() {
            None => ManagerStatus {
                phase: SessionPhase::Idle,
                session_id: None,
                events: 0,
                watermark: 0,
            },
            Some(doc) => ManagerStatus {
                phase: if doc.ended {
                    SessionPhase::EndedPendingSync
                } else {
                    SessionPhase::Active
                },
                session_id: Some(doc.session.session_id.clone()),
                events: doc.events.len(),
                watermark: doc.watermark,
            },
        }
    }

    /// Ended and fully acknowledged means the machine returns to Idle; the
    /// document itself stays on disk read-only until `clear`.
    fn finish_if_drained(&self, guard: &mut Option<PersistedSession>) {
        if guard
            .as_ref()
            .map(|doc| doc.ended && doc.fully_synced())
            .unwrap_or(false)
        {
            *guard = None;
        }
    }

    async fn sync_failed(
        &self,
        session_id: &str,
        err: SinkError,
    ) -> Result<SyncOutcome, SessionError> {
        self.bus.publish(
            topics::TOPIC_SESSION_SYNC_FAILED,
            &json!({"session_id": session_id, "error": err.to_string()}),
        );
        Err(SessionError::SyncFailed(err.to_string()))
    }

    fn spawn_sync_task(self: &Arc<Self>) {
        let token = CancellationToken::new();
        {
            let mut slot = self.ticker.lock().expect("ticker lock");
            if let Some(previous) = slot.replace(token.clone()) {
                previous.cancel();
            }
        }
        let this = Arc::clone(self);
        let interval = self.opts.sync_interval;
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
            ticker.tick().await; // immediate first tick is a no-op
            loop {
                tokio::select! {
                    _ = token.cancelled() => break,
                    _ = ticker.tick() => {
                        if let Err(err) = this.synchronize().await {
                            // Transient; the next tick retries with the
                            // watermark unchanged.
                            warn!(target: "session", "periodic synchronize failed: {err}");
                        }
                    }
                }
            }
        });
    }

    fn cancel_sync_task(&self) {
        if let Some(token) = self.ticker.lock().expect("ticker lock").take() {
            token.cancel();
        }
    }
}

fn now_rfc3339() -> String {
    chrono::Utc::now().to_rfc3339_opts(chrono::SecondsFormat::Millis, true)
}

/// Time-ordered id with a random suffix: unique within practical bounds
/// and still readable in a directory listing.
fn new_session_id() -> String {
    let stamp = chrono::Utc::now().format("%Y%m%d%H%M%S");
    let suffix = uuid::Uuid::new_v4().simple().to_string();
    format!("{stamp}_{}", &suffix[..8])
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;
    use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
    use tele_protocol::LogRecord;
    use tempfile::tempdir;

    /// In-memory stand-in for the log store. Mirrors its contract: append
    /// only works once the session file exists, save creates/replaces it.
    #[derive(Default)]
    struct MemorySink {
        files: std::sync::Mutex<HashMap<String, Vec<String>>>,
        fail_appends: AtomicBool,
        fail_saves: AtomicBool,
        saves: AtomicUsize,
        appends: AtomicUsize,
    }

    impl MemorySink {
        fn lines(&self, session_id: &str) -> Vec<String> {
            self.files
                .lock()
                .expect("files lock")
                .get(session_id)
                .cloned()
                .unwrap_or_default()
        }

        fn summary_records(&self, session_id: &str) -> usize {
            self.lines(session_id)
                .iter()
                .filter(|line| line.contains("\"record\":\"session\""))
                .count()
        }

        fn event_actions(&self, session_id: &str) -> Vec<String> {
            self.lines(session_id)
                .iter()
                .filter_map(|line| serde_json::from_str::<LogRecord>(line).ok())
                .filter_map(|record| match record {
                    LogRecord::Event(event) => Some(event.action),
                    LogRecord::Session(_) => None,
                })
                .collect()
        }
    }

    #[async_trait::async_trait]
    impl LogSink for MemorySink {
        async fn append(
            &self,
            session_id: &str,
            pending: &[SessionEvent],
        ) -> Result<(), SinkError> {
            if self.fail_appends.load(Ordering::SeqCst) {
                return Err(SinkError::Unavailable("sink down".into()));
            }
            let mut files = self.files.lock().expect("files lock");
            let Some(lines) = files.get_mut(session_id) else {
                return Err(SinkError::Unsupported);
            };
            for event in pending {
                lines.push(
                    serde_json::to_string(&LogRecord::Event(event.clone())).expect("serialize"),
                );
            }
            self.appends.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }

        async fn save(&self, session_id: &str, full_log: &str) -> Result<(), SinkError> {
            if self.fail_saves.load(Ordering::SeqCst) {
                return Err(SinkError::Unavailable("sink down".into()));
            }
            let lines = full_log.lines().map(str::to_string).collect();
            self.files
                .lock()
                .expect("files lock")
                .insert(session_id.to_string(), lines);
            self.saves.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }
    }

    async fn manager_with(
        dir: &std::path::Path,
        sink: Arc<MemorySink>,
    ) -> Arc<SessionManager> {
        SessionManager::new(
            SessionStore::new(dir),
            sink,
            Bus::default(),
            SessionOptions {
                sync_interval: Duration::from_secs(3600),
            },
        )
        .await
    }

    #[tokio::test]
    async fn start_persists_descriptor_before_returning() {
        let dir = tempdir().expect("tempdir");
        let sink = Arc::new(MemorySink::default());
        let manager = manager_with(dir.path(), sink).await;
        let id = manager
            .start_session(StartOptions {
                name: Some("trial1".into()),
                ..Default::default()
            })
            .await
            .expect("start");
        let store = SessionStore::new(dir.path());
        let doc = store.load(&id).await.expect("load").expect("persisted");
        assert_eq!(doc.session.name.as_deref(), Some("trial1"));
        assert_eq!(doc.watermark, 0);
        assert!(doc.events.is_empty());
    }

    #[tokio::test]
    async fn second_start_fails_while_active() {
        let dir = tempdir().expect("tempdir");
        let manager = manager_with(dir.path(), Arc::new(MemorySink::default())).await;
        manager
            .start_session(StartOptions::default())
            .await
            .expect("start");
        let err = manager
            .start_session(StartOptions::default())
            .await
            .expect_err("second start");
        assert!(matches!(err, SessionError::SessionActive));
    }

    #[tokio::test]
    async fn log_event_requires_active_session() {
        let dir = tempdir().expect("tempdir");
        let manager = manager_with(dir.path(), Arc::new(MemorySink::default())).await;
        let err = manager
            .log_event("observation", "wave", json!({}), None)
            .await
            .expect_err("idle");
        assert!(matches!(err, SessionError::NoActiveSession));
    }

    #[tokio::test]
    async fn restart_recovers_events_and_watermark() {
        let dir = tempdir().expect("tempdir");
        let sink = Arc::new(MemorySink::default());
        let id = {
            let manager = manager_with(dir.path(), sink.clone()).await;
            let id = manager
                .start_session(StartOptions::default())
                .await
                .expect("start");
            for action in ["wave", "point", "nod"] {
                manager
                    .log_event("observation", action, json!({}), None)
                    .await
                    .expect("log");
            }
            manager.synchronize().await.expect("sync");
            manager
                .log_event("observation", "blink", json!({}), None)
                .await
                .expect("log");
            id
            // manager dropped here: simulated process death
        };

        let manager = manager_with(dir.path(), sink).await;
        let status = manager.status().await;
        assert_eq!(status.phase, SessionPhase::Active);
        assert_eq!(status.session_id.as_deref(), Some(id.as_str()));
        assert_eq!(status.events, 4);
        assert_eq!(status.watermark, 3, "watermark is the last persisted ack");
    }

    #[tokio::test]
    async fn first_sync_falls_back_to_full_save() {
        let dir = tempdir().expect("tempdir");
        let sink = Arc::new(MemorySink::default());
        let manager = manager_with(dir.path(), sink.clone()).await;
        let id = manager
            .start_session(StartOptions::default())
            .await
            .expect("start");
        manager
            .log_event("observation", "wave", json!({}), None)
            .await
            .expect("log");

        // Store has no file yet: append signals unsupported, save lands.
        let outcome = manager.synchronize().await.expect("sync");
        assert_eq!(outcome, SyncOutcome::Resent(1));
        assert_eq!(sink.summary_records(&id), 1);
        assert_eq!(sink.event_actions(&id), vec!["wave".to_string()]);
        assert_eq!(manager.status().await.watermark, 1);

        // Later syncs take the incremental path.
        manager
            .log_event("observation", "point", json!({}), None)
            .await
            .expect("log");
        let outcome = manager.synchronize().await.expect("sync");
        assert_eq!(outcome, SyncOutcome::Appended(1));
        assert_eq!(sink.summary_records(&id), 1, "no duplicate summary");
    }

    #[tokio::test]
    async fn sync_with_nothing_pending_changes_nothing() {
        let dir = tempdir().expect("tempdir");
        let sink = Arc::new(MemorySink::default());
        let manager = manager_with(dir.path(), sink.clone()).await;
        let id = manager
            .start_session(StartOptions::default())
            .await
            .expect("start");
        manager
            .log_event("observation", "wave", json!({}), None)
            .await
            .expect("log");
        manager.synchronize().await.expect("sync");
        let before = sink.lines(&id);

        for _ in 0..3 {
            let outcome = manager.synchronize().await.expect("sync");
            assert_eq!(outcome, SyncOutcome::Clean);
        }
        assert_eq!(sink.lines(&id), before, "idempotent with no new events");
    }

    #[tokio::test]
    async fn failed_sync_keeps_watermark_and_retries_cleanly() {
        let dir = tempdir().expect("tempdir");
        let sink = Arc::new(MemorySink::default());
        let manager = manager_with(dir.path(), sink.clone()).await;
        let _id = manager
            .start_session(StartOptions::default())
            .await
            .expect("start");
        manager
            .log_event("observation", "wave", json!({}), None)
            .await
            .expect("log");
        manager
            .log_event("observation", "point", json!({}), None)
            .await
            .expect("log");

        sink.fail_saves.store(true, Ordering::SeqCst);
        let err = manager.synchronize().await.expect_err("sink down");
        assert!(matches!(err, SessionError::SyncFailed(_)));
        assert_eq!(manager.status().await.watermark, 0, "watermark untouched");

        manager
            .log_event("observation", "nod", json!({}), None)
            .await
            .expect("log");
        sink.fail_saves.store(false, Ordering::SeqCst);
        manager.synchronize().await.expect("retry");
        let status = manager.status().await;
        assert_eq!(status.watermark, 3);

        let id = status.session_id.expect("id");
        let actions = sink.event_actions(&id);
        for action in ["wave", "point", "nod"] {
            assert!(
                actions.iter().any(|a| a == action),
                "event {action} must reach the store at least once"
            );
        }
    }

    #[tokio::test]
    async fn watermark_is_monotonic_and_bounded() {
        let dir = tempdir().expect("tempdir");
        let sink = Arc::new(MemorySink::default());
        let manager = manager_with(dir.path(), sink.clone()).await;
        manager
            .start_session(StartOptions::default())
            .await
            .expect("start");
        let mut last = 0usize;
        for round in 0..4 {
            manager
                .log_event("observation", &format!("e{round}"), json!({}), None)
                .await
                .expect("log");
            if round % 2 == 0 {
                let _ = manager.synchronize().await;
            }
            let status = manager.status().await;
            assert!(status.watermark >= last, "watermark never decreases");
            assert!(status.watermark <= status.events, "watermark bounded");
            last = status.watermark;
        }
    }

    #[tokio::test]
    async fn stop_with_sink_down_leaves_ended_pending_sync() {
        let dir = tempdir().expect("tempdir");
        let sink = Arc::new(MemorySink::default());
        let manager = manager_with(dir.path(), sink.clone()).await;
        manager
            .start_session(StartOptions::default())
            .await
            .expect("start");
        manager
            .log_event("observation", "wave", json!({}), None)
            .await
            .expect("log");

        sink.fail_saves.store(true, Ordering::SeqCst);
        let summary = manager.stop_session().await.expect("stop succeeds anyway");
        assert!(summary.end_time.is_some());
        assert_eq!(manager.phase().await, SessionPhase::EndedPendingSync);

        // Buffer survives; a later sync drains it and returns to Idle.
        sink.fail_saves.store(false, Ordering::SeqCst);
        manager.synchronize().await.expect("drain");
        assert_eq!(manager.phase().await, SessionPhase::Idle);
        let id = summary.session_id;
        assert_eq!(sink.event_actions(&id), vec!["wave".to_string()]);
    }

    #[tokio::test]
    async fn start_after_ended_pending_drains_first() {
        let dir = tempdir().expect("tempdir");
        let sink = Arc::new(MemorySink::default());
        let manager = manager_with(dir.path(), sink.clone()).await;
        manager
            .start_session(StartOptions::default())
            .await
            .expect("start");
        manager
            .log_event("observation", "wave", json!({}), None)
            .await
            .expect("log");
        sink.fail_saves.store(true, Ordering::SeqCst);
        manager.stop_session().await.expect("stop");

        // Still down: the new session must not silently discard the buffer.
        let err = manager
            .start_session(StartOptions::default())
            .await
            .expect_err("predecessor unsynced");
        assert!(matches!(err, SessionError::UnsyncedEvents));

        // Back up: start drains the predecessor, then proceeds.
        sink.fail_saves.store(false, Ordering::SeqCst);
        manager
            .start_session(StartOptions::default())
            .await
            .expect("start after drain");
        assert_eq!(manager.phase().await, SessionPhase::Active);
    }

    #[tokio::test]
    async fn clear_refuses_unsynced_without_force() {
        let dir = tempdir().expect("tempdir");
        let sink = Arc::new(MemorySink::default());
        let manager = manager_with(dir.path(), sink.clone()).await;
        let id = manager
            .start_session(StartOptions::default())
            .await
            .expect("start");
        manager
            .log_event("observation", "wave", json!({}), None)
            .await
            .expect("log");
        sink.fail_saves.store(true, Ordering::SeqCst);
        manager.stop_session().await.expect("stop");

        let err = manager.clear(false).await.expect_err("unsynced");
        assert!(matches!(err, SessionError::UnsyncedEvents));
        manager.clear(true).await.expect("forced clear");
        assert_eq!(manager.phase().await, SessionPhase::Idle);
        assert!(
            SessionStore::new(dir.path())
                .load(&id)
                .await
                .expect("load")
                .is_none(),
            "document removed"
        );
    }
}
