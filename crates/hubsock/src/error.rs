use thiserror::Error;

/// Errors raised by the push channel and the connection manager.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum HubError {
    /// Network blip, timeout or 5xx. Retried under the backoff policy.
    #[error("transient transport error: {0}")]
    TransientTransport(String),

    /// 401/403 from the hub endpoint. The user has to authenticate again.
    #[error("hub rejected our credentials (status {0})")]
    TerminalAuth(u16),

    /// 404 or an unusable hub url. Retrying will not help.
    #[error("hub endpoint misconfigured: {0}")]
    EndpointMisconfigured(String),

    #[error("not connected to the hub")]
    NotConnected,

    #[error("hub command failed: {0}")]
    CommandFailed(String),

    #[error("decoding failed: {0}")]
    Decode(String),
}

impl HubError {
    /// Terminal errors stop the reconnect loop instead of scheduling a retry.
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            HubError::TerminalAuth(_) | HubError::EndpointMisconfigured(_)
        )
    }
}

impl From<serde_json::Error> for HubError {
    fn from(e: serde_json::Error) -> Self {
        HubError::Decode(e.to_string())
    }
}

/// Raw failures reported by a [`crate::HubTransport`].
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum TransportError {
    /// The upgrade request was answered with a non-101 HTTP status.
    #[error("http status {status}: {message}")]
    Status { status: u16, message: String },

    #[error("invalid hub url: {0}")]
    InvalidUrl(String),

    #[error("handshake failed: {0}")]
    Handshake(String),

    #[error("transport is not open")]
    NotOpen,

    #[error("{0}")]
    Io(String),
}

impl From<String> for TransportError {
    fn from(s: String) -> Self {
        TransportError::Io(s)
    }
}

impl From<TransportError> for HubError {
    fn from(e: TransportError) -> Self {
        match e {
            TransportError::Status { status, .. } if status == 401 || status == 403 => {
                HubError::TerminalAuth(status)
            }
            TransportError::Status {
                status: 404,
                message,
            } => HubError::EndpointMisconfigured(format!("404: {message}")),
            TransportError::InvalidUrl(url) => HubError::EndpointMisconfigured(url),
            other => HubError::TransientTransport(other.to_string()),
        }
    }
}
