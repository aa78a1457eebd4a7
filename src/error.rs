//! Error types for the state container.

use thiserror::Error;

/// Main error type for engine-level failures.
///
/// Failures raised by a mutation body are never wrapped in this type: they
/// are the caller's own error and come back unchanged from `try_mutate`.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("Dispatch queue closed: {0}")]
    QueueClosed(String),
}

/// Result type for engine operations.
pub type Result<T> = std::result::Result<T, StoreError>;
