//! Error types for packetkv
//!
//! Provides a unified error type for all operations.

use std::path::PathBuf;

use thiserror::Error;

/// Result type alias using StoreError
pub type Result<T> = std::result::Result<T, StoreError>;

/// Unified error type for packetkv operations
#[derive(Debug, Error)]
pub enum StoreError {
    // -------------------------------------------------------------------------
    // I/O Errors
    // -------------------------------------------------------------------------
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    // -------------------------------------------------------------------------
    // Persistence Errors
    // -------------------------------------------------------------------------
    #[error("Persistence error: {0}")]
    Persistence(String),

    #[error("Index table verification failed for {}", path.display())]
    ParityMismatch { path: PathBuf },

    #[error("Key not found")]
    NotFound,

    // -------------------------------------------------------------------------
    // Serialization Errors
    // -------------------------------------------------------------------------
    #[error("Serialization error: {0}")]
    Serialization(String),

    // -------------------------------------------------------------------------
    // Configuration Errors
    // -------------------------------------------------------------------------
    #[error("Configuration error: {0}")]
    Configuration(String),

    // -------------------------------------------------------------------------
    // Lifecycle Errors
    // -------------------------------------------------------------------------
    #[error("{0} is already disposed")]
    Disposed(&'static str),

    #[error("Unsupported operation: {0}")]
    Unsupported(&'static str),
}

impl StoreError {
    /// True for failures that mean on-disk state could not be read back
    /// (load errors and startup parity mismatches).
    pub fn is_persistence(&self) -> bool {
        matches!(
            self,
            StoreError::Persistence(_) | StoreError::ParityMismatch { .. }
        )
    }
}
