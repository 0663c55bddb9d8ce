use thiserror::Error;

/// Failures of the REST notification service. All of them are transient
/// from the store's point of view: nothing is applied and the command can be
/// retried.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ApiError {
    #[error("request failed: {0}")]
    Transport(String),

    #[error("server answered with http {0}")]
    Status(u16),

    #[error("server rejected the request: {0}")]
    Rejected(String),

    #[error("bad response: {0}")]
    Decode(String),
}

impl From<String> for ApiError {
    fn from(s: String) -> Self {
        ApiError::Transport(s)
    }
}

impl From<serde_json::Error> for ApiError {
    fn from(e: serde_json::Error) -> Self {
        ApiError::Decode(e.to_string())
    }
}

#[derive(Error, Debug)]
pub enum Error {
    #[error("hub: {0}")]
    Hub(#[from] hubsock::HubError),

    #[error("api: {0}")]
    Api(#[from] ApiError),

    #[error("config: {0}")]
    Config(String),

    #[error("io: {0}")]
    Io(#[from] std::io::Error),

    #[error("json: {0}")]
    Json(#[from] serde_json::Error),
}

impl From<String> for Error {
    fn from(s: String) -> Self {
        Error::Config(s)
    }
}
