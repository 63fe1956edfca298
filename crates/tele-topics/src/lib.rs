//! Canonical event topic constants shared across the control plane.
//!
//! Centralizing the strings keeps the server, the recorder and the session
//! manager in sync. Keep each section alphabetized and favor dot.case names.

// Actions
pub const TOPIC_ACTIONS_COMPLETED: &str = "actions.completed";
pub const TOPIC_ACTIONS_FAILED: &str = "actions.failed";
pub const TOPIC_ACTIONS_SUBMITTED: &str = "actions.submitted";

// Bag recording
pub const TOPIC_BAG_EXITED: &str = "bag.record.exited";
pub const TOPIC_BAG_STARTED: &str = "bag.record.started";
pub const TOPIC_BAG_STOPPED: &str = "bag.record.stopped";

// Experiment sessions
pub const TOPIC_SESSION_ENDED: &str = "session.ended";
pub const TOPIC_SESSION_STARTED: &str = "session.started";
pub const TOPIC_SESSION_SYNCED: &str = "session.logs.synced";
pub const TOPIC_SESSION_SYNC_FAILED: &str = "session.logs.sync.failed";

// Log store
pub const TOPIC_LOGS_APPENDED: &str = "logs.appended";
pub const TOPIC_LOGS_SAVED: &str = "logs.saved";
