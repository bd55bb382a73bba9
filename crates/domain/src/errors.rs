//! Error types used throughout the retry engine

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Main error type for Redrive
#[derive(Error, Debug, Serialize, Deserialize)]
#[serde(tag = "type", content = "message")]
pub enum RedriveError {
    #[error("Persistence error: {0}")]
    Persistence(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Executor error: {0}")]
    Executor(String),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Invalid input: {0}")]
    InvalidInput(String),

    #[error("Internal error: {0}")]
    Internal(String),
}

/// Result type alias for Redrive operations
pub type Result<T> = std::result::Result<T, RedriveError>;
