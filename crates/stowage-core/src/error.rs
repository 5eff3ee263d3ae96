//! Error types for Stowage Core

use thiserror::Error;

/// Core error types
#[derive(Error, Debug)]
pub enum Error {
    #[error("Invalid identifier: {0}")]
    InvalidIdentifier(String),
}

/// Result type alias for Stowage Core operations
pub type Result<T> = std::result::Result<T, Error>;
