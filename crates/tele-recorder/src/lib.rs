//! Exclusive controller for the external bulk-sensor recording process.
//!
//! Exactly one recording may run system-wide. The slot lives behind an
//! async mutex inside the controller; start and stop hold the lock for
//! their whole critical section, so two concurrent starts can never both
//! succeed. A recorder that dies on its own is detected on the next status
//! poll and the slot is reset instead of reporting stale state.

use std::path::PathBuf;
use std::time::Duration;

use serde_json::json;
use tokio::process::{Child, Command};
use tokio::sync::Mutex;
use tracing::warn;

use tele_events::Bus;
use tele_protocol::BagStatus;
use tele_topics as topics;

#[derive(Debug, Clone)]
pub struct RecorderOptions {
    /// Recorder executable and leading arguments, e.g. `ros2 bag record`.
    pub command: Vec<String>,
    pub output_root: PathBuf,
    /// Topic list used when the caller omits one.
    pub default_topics: Vec<String>,
    /// How long to let the recorder flush after the interrupt before a
    /// hard kill.
    pub settle: Duration,
}

impl Default for RecorderOptions {
    fn default() -> Self {
        Self {
            command: vec!["ros2".into(), "bag".into(), "record".into()],
            output_root: PathBuf::from("bags"),
            default_topics: vec![
                "/camera/color/image_raw/compressed".into(),
                "/joint_states".into(),
                "/tf".into(),
            ],
            settle: Duration::from_secs(2),
        }
    }
}

impl RecorderOptions {
    pub fn from_env() -> Self {
        let mut opts = Self::default();
        if let Ok(cmd) = std::env::var("TELE_BAG_CMD") {
            let parts: Vec<String> = cmd.split_whitespace().map(str::to_string).collect();
            if !parts.is_empty() {
                opts.command = parts;
            }
        }
        if let Ok(dir) = std::env::var("TELE_BAG_DIR") {
            if !dir.trim().is_empty() {
                opts.output_root = PathBuf::from(dir);
            }
        }
        if let Ok(topics) = std::env::var("TELE_BAG_TOPICS") {
            let parts: Vec<String> = topics
                .split(',')
                .map(str::trim)
                .filter(|t| !t.is_empty())
                .map(str::to_string)
                .collect();
            if !parts.is_empty() {
                opts.default_topics = parts;
            }
        }
        if let Some(ms) = std::env::var("TELE_BAG_SETTLE_MS")
            .ok()
            .and_then(|value| value.trim().parse::<u64>().ok())
        {
            opts.settle = Duration::from_millis(ms);
        }
        opts
    }
}

#[derive(Debug, thiserror::Error)]
pub enum RecorderError {
    #[error("a recording is already active")]
    AlreadyActive,
    #[error("no recording is active")]
    NotRecording,
    #[error("failed to launch recorder: {0}")]
    Process(String),
}

impl RecorderError {
    pub fn code(&self) -> &'static str {
        match self {
            RecorderError::AlreadyActive => "recording_already_active",
            RecorderError::NotRecording => "no_active_recording",
            RecorderError::Process(_) => "recording_process_error",
        }
    }
}

/// Snapshot handed back by `start`.
#[derive(Debug, Clone)]
pub struct RecordingHandle {
    pub label: String,
    pub path: PathBuf,
    pub topics: Vec<String>,
    pub pid: Option<u32>,
}

struct ActiveRecording {
    label: String,
    path: PathBuf,
    child: Child,
}

pub struct BagRecorder {
    slot: Mutex<Option<ActiveRecording>>,
    bus: Bus,
    opts: RecorderOptions,
}

impl BagRecorder {
    pub fn new(bus: Bus, opts: RecorderOptions) -> Self {
        Self {
            slot: Mutex::new(None),
            bus,
            opts,
        }
    }

    /// Launch the external recorder for `label`. Fails `AlreadyActive`
    /// while a live recording holds the slot; a recorder that already
    /// exited on its own frees the slot first.
    pub async fn start(
        &self,
        label: &str,
        topics: Option<Vec<String>>,
        output_path: Option<PathBuf>,
    ) -> Result<RecordingHandle, RecorderError> {
        let mut slot = self.slot.lock().await;
        if let Some(active) = slot.as_mut() {
            match active.child.try_wait() {
                Ok(None) => return Err(RecorderError::AlreadyActive),
                Ok(Some(status)) => {
                    self.publish_exited(active, &status.to_string());
                    *slot = None;
                }
                Err(err) => {
                    warn!(target: "recorder", "recorder liveness probe failed: {err}");
                    return Err(RecorderError::AlreadyActive);
                }
            }
        }

        let topics = topics
            .filter(|list| !list.is_empty())
            .unwrap_or_else(|| self.opts.default_topics.clone());
        let path = match output_path {
            Some(path) => path,
            None => {
                let stamp = chrono::Utc::now().format("%Y%m%d_%H%M%S");
                self.opts
                    .output_root
                    .join(format!("{}_{stamp}", sanitize_label(label)))
            }
        };
        if let Some(parent) = path.parent() {
            tokio::fs::create_dir_all(parent)
                .await
                .map_err(|err| RecorderError::Process(err.to_string()))?;
        }

        let (program, base_args) = self
            .opts
            .command
            .split_first()
            .ok_or_else(|| RecorderError::Process("recorder command is empty".into()))?;
        let mut cmd = Command::new(program);
        cmd.args(base_args)
            .arg("-o")
            .arg(&path)
            .args(&topics)
            .stdin(std::process::Stdio::null())
            .stdout(std::process::Stdio::null())
            .stderr(std::process::Stdio::null());
        let child = cmd
            .spawn()
            .map_err(|err| RecorderError::Process(err.to_string()))?;
        let pid = child.id();

        self.bus.publish(
            topics::TOPIC_BAG_STARTED,
            &json!({
                "label": label,
                "path": path.display().to_string(),
                "topics": topics,
                "pid": pid,
            }),
        );
        let handle = RecordingHandle {
            label: label.to_string(),
            path: path.clone(),
            topics,
            pid,
        };
        *slot = Some(ActiveRecording {
            label: label.to_string(),
            path,
            child,
        });
        Ok(handle)
    }

    /// Interrupt the recorder, give it the settle window to flush, then
    /// hard-kill if it is still around. Returns the output path.
    pub async fn stop(&self) -> Result<PathBuf, RecorderError> {
        let mut slot = self.slot.lock().await;
        let mut active = slot.take().ok_or(RecorderError::NotRecording)?;

        interrupt(&mut active.child).await;
        let settled = tokio::time::timeout(self.opts.settle, active.child.wait()).await;
        if settled.is_err() {
            if let Err(err) = active.child.start_kill() {
                warn!(target: "recorder", "hard kill after settle window failed: {err}");
            }
            let _ = active.child.wait().await;
        }

        self.bus.publish(
            topics::TOPIC_BAG_STOPPED,
            &json!({
                "label": active.label,
                "path": active.path.display().to_string(),
            }),
        );
        Ok(active.path)
    }

    /// Pure read; never fails. Detects an unexpectedly dead recorder and
    /// resets the slot so callers never see stale `recording: true`.
    pub async fn status(&self) -> BagStatus {
        let mut slot = self.slot.lock().await;
        let Some(active) = slot.as_mut() else {
            return BagStatus::default();
        };
        match active.child.try_wait() {
            Ok(None) => BagStatus {
                recording: true,
                path: Some(active.path.display().to_string()),
                pid: active.child.id(),
            },
            Ok(Some(status)) => {
                let path = active.path.display().to_string();
                self.publish_exited(active, &status.to_string());
                *slot = None;
                BagStatus {
                    recording: false,
                    path: Some(path),
                    pid: None,
                }
            }
            Err(err) => {
                warn!(target: "recorder", "recorder liveness probe failed: {err}");
                *slot = None;
                BagStatus::default()
            }
        }
    }

    fn publish_exited(&self, active: &ActiveRecording, status: &str) {
        warn!(
            target: "recorder",
            label = %active.label,
            status,
            "recorder exited outside stop()"
        );
        self.bus.publish(
            topics::TOPIC_BAG_EXITED,
            &json!({
                "label": active.label,
                "path": active.path.display().to_string(),
                "status": status,
            }),
        );
    }
}

/// Keep labels filesystem-safe; anything exotic collapses to `_`.
fn sanitize_label(label: &str) -> String {
    let cleaned: String = label
        .trim()
        .chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || c == '-' || c == '_' {
                c
            } else {
                '_'
            }
        })
        .collect();
    if cleaned.is_empty() {
        "session".to_string()
    } else {
        cleaned
    }
}

#[cfg(unix)]
async fn interrupt(child: &mut Child) {
    // tokio only exposes SIGKILL; go through kill(1) for the graceful
    // SIGINT the recorder needs to finalize its output.
    if let Some(pid) = child.id() {
        let sent = Command::new("kill")
            .arg("-INT")
            .arg(pid.to_string())
            .status()
            .await;
        match sent {
            Ok(status) if status.success() => return,
            Ok(status) => {
                warn!(target: "recorder", "kill -INT exited with {status}");
            }
            Err(err) => {
                warn!(target: "recorder", "kill -INT failed to run: {err}");
            }
        }
    }
    if let Err(err) = child.start_kill() {
        warn!(target: "recorder", "start_kill fallback failed: {err}");
    }
}

#[cfg(not(unix))]
async fn interrupt(child: &mut Child) {
    if let Err(err) = child.start_kill() {
        warn!(target: "recorder", "start_kill failed: {err}");
    }
}

#[cfg(all(test, unix))]
mod tests {
    use super::*;
    use tempfile::tempdir;

    fn options(dir: &std::path::Path, command: &str) -> RecorderOptions {
        RecorderOptions {
            command: command.split_whitespace().map(str::to_string).collect(),
            output_root: dir.to_path_buf(),
            default_topics: vec!["/joint_states".into()],
            settle: Duration::from_millis(200),
        }
    }

    #[tokio::test]
    async fn start_is_exclusive() {
        let dir = tempdir().expect("tempdir");
        let recorder = BagRecorder::new(Bus::default(), options(dir.path(), "sleep 30"));
        let handle = recorder.start("trial1", None, None).await.expect("first start");
        assert!(handle.pid.is_some());
        let err = recorder.start("trial2", None, None).await.expect_err("second start");
        assert!(matches!(err, RecorderError::AlreadyActive));
        recorder.stop().await.expect("stop");
    }

    #[tokio::test]
    async fn stop_without_recording_fails() {
        let dir = tempdir().expect("tempdir");
        let recorder = BagRecorder::new(Bus::default(), options(dir.path(), "sleep 30"));
        let err = recorder.stop().await.expect_err("nothing running");
        assert!(matches!(err, RecorderError::NotRecording));
    }

    #[tokio::test]
    async fn status_after_stop_reports_idle() {
        let dir = tempdir().expect("tempdir");
        let recorder = BagRecorder::new(Bus::default(), options(dir.path(), "sleep 30"));
        recorder.start("trial1", None, None).await.expect("start");
        let status = recorder.status().await;
        assert!(status.recording);
        let path = recorder.stop().await.expect("stop");
        assert!(path.to_string_lossy().contains("trial1"));
        let status = recorder.status().await;
        assert!(!status.recording);
        assert!(status.pid.is_none());
    }

    #[tokio::test]
    async fn crashed_recorder_resets_to_idle() {
        let dir = tempdir().expect("tempdir");
        let bus = Bus::new(8);
        let mut rx = bus.subscribe();
        // `true` exits immediately, standing in for a crashed recorder.
        let recorder = BagRecorder::new(bus, options(dir.path(), "true"));
        recorder.start("trial1", None, None).await.expect("start");
        tokio::time::sleep(Duration::from_millis(100)).await;

        let status = recorder.status().await;
        assert!(!status.recording, "dead recorder must not report recording");

        // started, then exited
        let started = rx.recv().await.expect("started event");
        assert_eq!(started.kind, topics::TOPIC_BAG_STARTED);
        let exited = rx.recv().await.expect("exited event");
        assert_eq!(exited.kind, topics::TOPIC_BAG_EXITED);

        // slot is free again
        recorder.start("trial2", None, None).await.expect("restart");
        recorder.stop().await.expect("stop");
    }

    #[tokio::test]
    async fn caller_topics_override_defaults() {
        let dir = tempdir().expect("tempdir");
        let recorder = BagRecorder::new(Bus::default(), options(dir.path(), "sleep 30"));
        let handle = recorder
            .start("trial1", Some(vec!["/tf".into(), "/odom".into()]), None)
            .await
            .expect("start");
        assert_eq!(handle.topics, vec!["/tf".to_string(), "/odom".to_string()]);
        recorder.stop().await.expect("stop");
    }

    #[tokio::test]
    async fn explicit_output_path_wins() {
        let dir = tempdir().expect("tempdir");
        let recorder = BagRecorder::new(Bus::default(), options(dir.path(), "sleep 30"));
        let wanted = dir.path().join("nested").join("trial1_bag");
        let handle = recorder
            .start("trial1", None, Some(wanted.clone()))
            .await
            .expect("start");
        assert_eq!(handle.path, wanted);
        let stopped = recorder.stop().await.expect("stop");
        assert_eq!(stopped, wanted);
    }

    #[test]
    fn labels_are_sanitized() {
        assert_eq!(sanitize_label("trial 1 / morning"), "trial_1___morning");
        assert_eq!(sanitize_label("  "), "session");
    }
}
