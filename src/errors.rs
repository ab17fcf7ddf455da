use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConnectorError {
    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Document not found: {0}")]
    NoSuchDocument(String),

    #[error("Connectivity error: {0}")]
    Connectivity(String),

    #[error("Backend timed out after {0} ms")]
    Timeout(u64),

    #[error("Write conflict: {0}")]
    Conflict(String),

    #[error("Backend error: {0}")]
    Backend(String),

    #[error("Serde JSON: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Config error: {0}")]
    Config(String),

    #[error("I/O error: {0}")]
    Io(String),
}

impl ConnectorError {
    pub(crate) fn validation(msg: impl Into<String>) -> Self {
        Self::Validation(msg.into())
    }

    /// True for failures where the backend could not be reached at all.
    #[must_use]
    pub const fn is_connectivity(&self) -> bool {
        matches!(self, Self::Connectivity(_) | Self::Timeout(_))
    }
}

impl From<std::io::Error> for ConnectorError {
    fn from(e: std::io::Error) -> Self {
        Self::Io(e.to_string())
    }
}

pub type Result<T> = std::result::Result<T, ConnectorError>;
