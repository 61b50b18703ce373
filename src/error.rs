// src/error.rs
// Standardized error types for gridcache

use thiserror::Error;

/// Error kinds surfaced by the cache/filter/response core.
#[derive(Error, Debug)]
pub enum GridError {
    #[error("validation error: {0}")]
    Validation(String),

    #[error("cache unavailable: {0}")]
    CacheUnavailable(String),

    #[error("schema mismatch: {0}")]
    SchemaMismatch(String),

    #[error("not found: {kind} {id}")]
    NotFound { kind: String, id: String },

    #[error("upstream error: {0}")]
    Upstream(String),

    #[error("database error: {0}")]
    Db(#[from] rusqlite::Error),

    #[error("pool error: {0}")]
    Pool(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("{0}")]
    Other(String),
}

pub type Result<T> = std::result::Result<T, GridError>;

impl GridError {
    /// True when this error means "treat the cache as absent and fall
    /// through to the upstream fetch collaborator". Any storage-layer
    /// failure (a raw SQL error included, not just an explicit
    /// `CacheUnavailable`) qualifies.
    pub fn is_cache_unavailable(&self) -> bool {
        matches!(self, GridError::CacheUnavailable(_) | GridError::Db(_))
    }

    pub fn to_error_shape(&self) -> serde_json::Value {
        serde_json::json!({ "error": self.to_string() })
    }
}

impl From<deadpool_sqlite::PoolError> for GridError {
    fn from(err: deadpool_sqlite::PoolError) -> Self {
        GridError::CacheUnavailable(err.to_string())
    }
}

impl From<deadpool_sqlite::InteractError> for GridError {
    fn from(err: deadpool_sqlite::InteractError) -> Self {
        GridError::CacheUnavailable(err.to_string())
    }
}

impl From<String> for GridError {
    fn from(s: String) -> Self {
        GridError::Other(s)
    }
}
