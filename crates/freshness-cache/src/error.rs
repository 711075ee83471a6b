//! Error types for the freshness cache

use thiserror::Error;

/// Why a `load` produced nothing.
///
/// Both variants mean "go to the network"; neither is ever fatal.
#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum CacheError {
    /// Absent, expired, or undecodable
    #[error("cache entry is empty or stale")]
    EmptyOrStale,

    /// The cache directory could not be created at startup
    #[error("cache catalog not found")]
    CacheCatalogNotFound,
}

/// Failures decoding an entry file
#[derive(Error, Debug)]
pub enum CodecError {
    #[error("bad magic bytes")]
    BadMagic,

    #[error("unsupported entry format version {0}")]
    UnsupportedVersion(u8),

    #[error("entry truncated")]
    Truncated,

    #[error("envelope of {0} bytes exceeds limit")]
    EnvelopeTooLarge(usize),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, CacheError>;
