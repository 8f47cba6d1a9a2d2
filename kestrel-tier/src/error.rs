//! Tier error types.
//!
//! This module defines the error types returned by the remote tiered-store
//! collaborator.

use thiserror::Error;

/// Result type for tier operations.
pub type TierResult<T> = Result<T, TierError>;

/// Errors that can occur while querying the remote tier.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum TierError {
    /// The remote round trip did not complete in time.
    #[error("remote tier timeout during {operation}")]
    Timeout {
        /// What operation timed out.
        operation: &'static str,
    },

    /// The remote tier cannot serve requests right now.
    #[error("remote tier unavailable: {message}")]
    Unavailable {
        /// Error message.
        message: String,
    },

    /// Remote data failed an integrity check.
    #[error("data corruption in remote segment at base offset {base_offset}")]
    DataCorruption {
        /// Base offset of the corrupted segment.
        base_offset: i64,
    },

    /// Manifest error.
    #[error("metadata error: {message}")]
    Metadata {
        /// Error message.
        message: String,
    },
}
