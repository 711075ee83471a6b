//! Error types for the catalog API client

use std::fmt;
use std::sync::Arc;

/// Errors from the catalog API.
///
/// `Clone` so one failed request can be handed to every caller waiting on it.
#[derive(Debug, Clone)]
pub enum ApiError {
    /// The connectivity monitor reports no network; nothing was sent
    Offline,
    /// Connection, timeout or other transport failure
    Transport(Arc<reqwest::Error>),
    /// Non-success HTTP status
    Status(u16),
    /// Response body did not match the expected shape
    Decode(String),
}

impl fmt::Display for ApiError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Offline => write!(f, "Catalog API unreachable: offline"),
            Self::Transport(e) => write!(f, "Catalog HTTP error: {e}"),
            Self::Status(code) => write!(f, "Catalog API returned status {code}"),
            Self::Decode(msg) => write!(f, "Catalog response could not be decoded: {msg}"),
        }
    }
}

impl std::error::Error for ApiError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::Transport(e) => Some(e.as_ref()),
            _ => None,
        }
    }
}

impl From<reqwest::Error> for ApiError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_decode() {
            Self::Decode(err.to_string())
        } else {
            Self::Transport(Arc::new(err))
        }
    }
}

impl From<serde_json::Error> for ApiError {
    fn from(err: serde_json::Error) -> Self {
        Self::Decode(err.to_string())
    }
}

impl ApiError {
    /// Whether retrying later could plausibly succeed
    pub fn is_transient(&self) -> bool {
        match self {
            Self::Offline | Self::Transport(_) => true,
            Self::Status(code) => *code >= 500 || *code == 429,
            Self::Decode(_) => false,
        }
    }
}

/// Result type for catalog API operations
pub type Result<T> = std::result::Result<T, ApiError>;
