use crate::transport::TransportError;

/// Failure taxonomy surfaced to gateway callers. None of these are retried
/// internally; the caller decides whether a retry makes sense.
#[derive(Debug, thiserror::Error)]
pub enum GatewayError {
    #[error("invalid request: {0}")]
    InvalidRequest(String),
    #[error("unknown action type tag `{0}`")]
    UnresolvableType(String),
    #[error("no action server reachable for `{action}` within {waited_ms}ms")]
    ServerUnavailable { action: String, waited_ms: u64 },
    #[error("action `{action}` did not reach a terminal status within {waited_ms}ms")]
    Timeout { action: String, waited_ms: u64 },
    #[error("transport error: {0}")]
    Transport(String),
}

impl GatewayError {
    /// Stable machine-readable code for HTTP problem bodies and logs.
    pub fn code(&self) -> &'static str {
        match self {
            GatewayError::InvalidRequest(_) => "invalid_request",
            GatewayError::UnresolvableType(_) => "action_type_unresolvable",
            GatewayError::ServerUnavailable { .. } => "action_server_unavailable",
            GatewayError::Timeout { .. } => "action_timeout",
            GatewayError::Transport(_) => "transport_error",
        }
    }
}

impl From<TransportError> for GatewayError {
    fn from(err: TransportError) -> Self {
        GatewayError::Transport(err.to_string())
    }
}
