#[derive(Debug, thiserror::Error)]
pub enum SessionError {
    #[error("a session is already active")]
    SessionActive,
    #[error("no active session")]
    NoActiveSession,
    #[error("previous session still has unsynced events")]
    UnsyncedEvents,
    #[error("storage error: {0}")]
    Storage(String),
    #[error("synchronization failed: {0}")]
    SyncFailed(String),
}

impl SessionError {
    pub fn code(&self) -> &'static str {
        match self {
            SessionError::SessionActive => "session_active",
            SessionError::NoActiveSession => "no_active_session",
            SessionError::UnsyncedEvents => "unsynced_events",
            SessionError::Storage(_) => "storage_error",
            SessionError::SyncFailed(_) => "sync_failed",
        }
    }
}
