use chart_core::ChartError;

/// Failures of a gateway call or of the payload it returned.
#[derive(Debug, thiserror::Error)]
pub enum ClientError {
    #[error("request was cancelled")]
    Cancelled,
    #[error("transport failure: {0}")]
    Transport(String),
    #[error("{path} returned HTTP {status}: {body}")]
    Status {
        status: u16,
        path: String,
        body: String,
    },
    #[error("could not decode response from {path}: {message}")]
    Decode { path: String, message: String },
    #[error(transparent)]
    Payload(#[from] ChartError),
}

impl ClientError {
    pub fn is_cancelled(&self) -> bool {
        matches!(self, ClientError::Cancelled)
    }
}

impl From<reqwest::Error> for ClientError {
    fn from(err: reqwest::Error) -> Self {
        ClientError::Transport(err.to_string())
    }
}
