use std::collections::BTreeMap;

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use utoipa::ToSchema;

// -------- Actions --------

/// Terminal and in-flight states of a remote action goal.
///
/// Mirrors the remote actuation protocol's status vocabulary; unknown slugs
/// from heterogeneous bridges degrade to `Unknown` instead of failing the
/// whole result.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default, JsonSchema, ToSchema)]
#[serde(rename_all = "snake_case")]
pub enum ActionStatus {
    #[default]
    Unknown,
    Accepted,
    Executing,
    Canceling,
    Succeeded,
    Canceled,
    Aborted,
}

impl ActionStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            ActionStatus::Unknown => "unknown",
            ActionStatus::Accepted => "accepted",
            ActionStatus::Executing => "executing",
            ActionStatus::Canceling => "canceling",
            ActionStatus::Succeeded => "succeeded",
            ActionStatus::Canceled => "canceled",
            ActionStatus::Aborted => "aborted",
        }
    }

    pub fn from_slug(value: &str) -> Self {
        match value.trim().to_ascii_lowercase().as_str() {
            "accepted" => ActionStatus::Accepted,
            "executing" | "active" => ActionStatus::Executing,
            "canceling" => ActionStatus::Canceling,
            "succeeded" | "success" => ActionStatus::Succeeded,
            "canceled" | "cancelled" => ActionStatus::Canceled,
            "aborted" => ActionStatus::Aborted,
            _ => ActionStatus::Unknown,
        }
    }

    /// Succeeded, Canceled and Aborted are end states; everything else may
    /// still make progress.
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            ActionStatus::Succeeded | ActionStatus::Canceled | ActionStatus::Aborted
        )
    }
}

/// One action invocation as submitted by the dashboard.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema, ToSchema)]
pub struct ActionRequest {
    /// Path-like handler name, e.g. `/arm/move`.
    pub action_name: String,
    /// Registry tag resolving to a remote goal/result binding.
    pub action_type: String,
    /// Opaque goal parameters; the remote side is authoritative on shape.
    #[serde(default)]
    pub goal: Value,
}

/// Normalized outcome of an action goal.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema, ToSchema)]
pub struct ActionResult {
    pub status: ActionStatus,
    pub result: Value,
    pub success: bool,
}

impl ActionResult {
    /// Derive `success` from a terminal status and its payload.
    ///
    /// The rule is a deliberate OR: a `succeeded` status wins regardless of
    /// payload, and a payload carrying an explicit boolean `success: true`
    /// wins regardless of status. Some bridged handlers only report success
    /// inside the payload, so neither condition alone is enough.
    pub fn from_terminal(status: ActionStatus, result: Value) -> Self {
        let payload_success = result
            .get("success")
            .and_then(Value::as_bool)
            .unwrap_or(false);
        let success = status == ActionStatus::Succeeded || payload_success;
        Self {
            status,
            result,
            success,
        }
    }
}

// -------- Bag recording --------

#[derive(Debug, Clone, Default, Serialize, Deserialize, JsonSchema, ToSchema)]
pub struct BagStartRequest {
    #[serde(default)]
    pub session_name: Option<String>,
    #[serde(default)]
    pub topics: Option<Vec<String>>,
    /// Explicit output path; computed from the session name and the clock
    /// when omitted.
    #[serde(default)]
    pub output_path: Option<String>,
}

/// Snapshot of the single recording slot.
#[derive(Debug, Clone, Default, Serialize, Deserialize, JsonSchema, ToSchema)]
pub struct BagStatus {
    pub recording: bool,
    #[serde(default)]
    pub path: Option<String>,
    #[serde(default)]
    pub pid: Option<u32>,
}

// -------- Experiment sessions --------

/// Session descriptor; immutable after creation except for `end_time`.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema, ToSchema)]
pub struct SessionSummary {
    pub session_id: String,
    pub start_time: String,
    #[serde(default)]
    pub end_time: Option<String>,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub operator: Option<String>,
    #[serde(default)]
    pub notes: Option<String>,
}

/// One operator-logged event. Append order is the total order; `time` is
/// informational only.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema, ToSchema)]
pub struct SessionEvent {
    pub time: String,
    pub event_type: String,
    pub action: String,
    #[serde(default)]
    pub details: Value,
    #[serde(default)]
    pub operator: Option<String>,
    #[serde(default)]
    pub session_id: Option<String>,
}

/// Self-describing newline-delimited record in a session log file. The
/// first record of a file is always `Session`; the rest are `Event`.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
#[serde(tag = "record", rename_all = "snake_case")]
pub enum LogRecord {
    Session(SessionSummary),
    Event(SessionEvent),
}

/// Store-side metadata for one persisted session log.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema, ToSchema)]
pub struct LogFileMeta {
    pub name: String,
    pub session_id: String,
    pub created: String,
    pub modified: String,
    pub size: u64,
}

// -------- Robot capability descriptor (data-only) --------

/// Channel/action binding backing one capability flag.
#[derive(Debug, Clone, Default, Serialize, Deserialize, JsonSchema, ToSchema)]
pub struct CapabilityBinding {
    pub action_name: String,
    pub action_type: String,
}

impl CapabilityBinding {
    pub fn is_empty(&self) -> bool {
        self.action_name.trim().is_empty() || self.action_type.trim().is_empty()
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, JsonSchema, ToSchema)]
pub struct MovementParams {
    #[serde(default)]
    pub linear_speed: f64,
    #[serde(default)]
    pub angular_speed: f64,
    #[serde(default)]
    pub step_duration_ms: u64,
}

/// Declarative per-robot capability descriptor.
///
/// Consumed by the dashboard to decide which panels to render and by
/// callers to derive `action_name`/`action_type` pairs; the gateway itself
/// never interprets it.
#[derive(Debug, Clone, Default, Serialize, Deserialize, JsonSchema, ToSchema)]
pub struct RobotProfile {
    pub name: String,
    #[serde(default)]
    pub capabilities: BTreeMap<String, bool>,
    #[serde(default)]
    pub bindings: BTreeMap<String, CapabilityBinding>,
    #[serde(default)]
    pub movement: MovementParams,
    #[serde(default)]
    pub action_labels: Vec<String>,
}

impl RobotProfile {
    /// Binding for a capability, honoring the descriptor contract: a flag
    /// without a non-empty binding means the capability is unavailable.
    pub fn binding(&self, capability: &str) -> Option<&CapabilityBinding> {
        if !self.capabilities.get(capability).copied().unwrap_or(false) {
            return None;
        }
        self.bindings
            .get(capability)
            .filter(|binding| !binding.is_empty())
    }

    /// Names of capabilities flagged true but missing a usable binding.
    pub fn unbound_capabilities(&self) -> Vec<String> {
        self.capabilities
            .iter()
            .filter(|(_, enabled)| **enabled)
            .filter(|(name, _)| {
                self.bindings
                    .get(name.as_str())
                    .map(|binding| binding.is_empty())
                    .unwrap_or(true)
            })
            .map(|(name, _)| name.clone())
            .collect()
    }
}
