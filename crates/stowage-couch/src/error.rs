//! Error types for the Couch adapter

use thiserror::Error;

/// Adapter error types.
///
/// Write outcomes are not errors: a failed or conflicted write resolves
/// its completion handle to `false`. These variants cover the change
/// feed path and request construction.
#[derive(Error, Debug)]
pub enum Error {
    #[error("HTTP transport error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Invalid base URL: {0}")]
    InvalidUrl(String),

    #[error("Change feed buffer exceeds limit: {size} > {max}")]
    BufferOverflow { size: usize, max: usize },
}

/// Result type alias for Couch adapter operations
pub type Result<T> = std::result::Result<T, Error>;
