//! Error types for the catalog sync service

use std::fmt;

#[derive(Debug)]
pub enum SyncError {
    Api(catalog_client::ApiError),
    Config(String),
}

impl fmt::Display for SyncError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SyncError::Api(err) => write!(f, "Catalog API error: {}", err),
            SyncError::Config(msg) => write!(f, "Configuration error: {}", msg),
        }
    }
}

impl std::error::Error for SyncError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            SyncError::Api(err) => Some(err),
            SyncError::Config(_) => None,
        }
    }
}

impl From<catalog_client::ApiError> for SyncError {
    fn from(err: catalog_client::ApiError) -> Self {
        SyncError::Api(err)
    }
}

impl From<tracing_subscriber::filter::ParseError> for SyncError {
    fn from(err: tracing_subscriber::filter::ParseError) -> Self {
        SyncError::Config(err.to_string())
    }
}

pub type Result<T> = std::result::Result<T, SyncError>;
