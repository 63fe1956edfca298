//! Crash-resilient experiment session recorder.
//!
//! Owns the session state machine (`Idle -> Active -> Ended -> Idle`),
//! buffers operator-logged events in a durable local document, and
//! synchronizes them to the log store with an incremental-append fast path
//! and an idempotent full-resend fallback. The durable document carries the
//! descriptor, the event buffer and the acknowledgement watermark together,
//! so recovery after a crash or page reload is a single read.

mod error;
mod manager;
mod sink;
mod store;

pub use error::SessionError;
pub use manager::{ManagerStatus, SessionManager, SessionOptions, SessionPhase, StartOptions, SyncOutcome};
pub use sink::{HttpLogSink, LogSink, SinkError};
pub use store::{PersistedSession, SessionStore};
