//! Error types for EmberKV
//!
//! Provides a unified error type for all operations. Errors are `Clone` so a
//! group-commit leader can hand the same result to every writer it served.

use std::sync::Arc;

use thiserror::Error;

/// Result type alias using EmberError
pub type Result<T> = std::result::Result<T, EmberError>;

/// Unified error type for EmberKV operations
#[derive(Debug, Clone, Error)]
pub enum EmberError {
    // -------------------------------------------------------------------------
    // I/O Errors
    // -------------------------------------------------------------------------
    #[error("IO error: {0}")]
    Io(#[source] Arc<std::io::Error>),

    // -------------------------------------------------------------------------
    // Ordered Index Errors
    // -------------------------------------------------------------------------
    #[error("Duplicate key inserted into ordered index")]
    DuplicateKey,

    // -------------------------------------------------------------------------
    // Write Path Errors
    // -------------------------------------------------------------------------
    #[error("Writer queue invariant violated: {0}")]
    QueueInvariantViolation(String),

    /// Sticky failure recorded after an indeterminate log sync (or a failed
    /// background flush). Every later write fails with this until reopen.
    #[error("Background error: {0}")]
    Background(#[source] Arc<EmberError>),

    // -------------------------------------------------------------------------
    // WAL Errors
    // -------------------------------------------------------------------------
    #[error("WAL corruption detected: {0}")]
    WalCorruption(String),

    // -------------------------------------------------------------------------
    // Serialization Errors
    // -------------------------------------------------------------------------
    #[error("Serialization error: {0}")]
    Serialization(String),

    // -------------------------------------------------------------------------
    // Configuration Errors
    // -------------------------------------------------------------------------
    #[error("Configuration error: {0}")]
    Config(String),
}

impl EmberError {
    /// Wrap this error as the sticky background error.
    pub fn into_background(self) -> Self {
        match self {
            EmberError::Background(_) => self,
            other => EmberError::Background(Arc::new(other)),
        }
    }

    /// True for the sticky background error kind
    pub fn is_background(&self) -> bool {
        matches!(self, EmberError::Background(_))
    }
}

impl From<std::io::Error> for EmberError {
    fn from(err: std::io::Error) -> Self {
        EmberError::Io(Arc::new(err))
    }
}

impl From<bincode::Error> for EmberError {
    fn from(err: bincode::Error) -> Self {
        EmberError::Serialization(err.to_string())
    }
}
