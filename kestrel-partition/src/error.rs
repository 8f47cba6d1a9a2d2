//! Partition view error types.
//!
//! Two layers of errors meet here. Collaborators report [`ClusterError`] (the
//! replication layer) and [`TierError`] (the remote tier). Everything leaving
//! the partition view is an [`ErrorCode`]: one of the five categories the
//! protocol layer understands. Collaborator errors are mapped exactly once,
//! through the `From` impls below.

use kestrel_tier::TierError;
use thiserror::Error;
use tracing::warn;

/// Result type for operations exposed by the partition view.
pub type ProxyResult<T> = Result<T, ErrorCode>;

/// Result type for replication layer operations.
pub type ClusterResult<T> = Result<T, ClusterError>;

/// Error categories exposed to the protocol layer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Error)]
pub enum ErrorCode {
    /// Requested offset lies outside the partition's bounds.
    #[error("offset out of range")]
    OffsetOutOfRange,
    /// Leadership is lost, absent, or the partition is shutting down.
    #[error("not leader for partition")]
    NotLeaderForPartition,
    /// A bounded operation exceeded its deadline.
    #[error("request timed out")]
    RequestTimedOut,
    /// A derived offset is not established yet.
    #[error("offset not available")]
    OffsetNotAvailable,
    /// Anything else.
    #[error("unknown server error")]
    UnknownServerError,
}

impl ErrorCode {
    /// Returns the Kafka wire error code.
    ///
    /// See: <https://kafka.apache.org/protocol#protocol_error_codes>
    #[must_use]
    pub const fn code(self) -> i16 {
        match self {
            Self::UnknownServerError => -1,
            Self::OffsetOutOfRange => 1,
            Self::NotLeaderForPartition => 6,
            Self::RequestTimedOut => 7,
            Self::OffsetNotAvailable => 78,
        }
    }

    /// Returns true if the client should retry the same request.
    #[must_use]
    pub const fn is_retriable(self) -> bool {
        matches!(
            self,
            Self::NotLeaderForPartition | Self::RequestTimedOut | Self::OffsetNotAvailable
        )
    }
}

/// Errors reported by the replication layer.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ClusterError {
    /// This node does not lead the replication group.
    #[error("not leader")]
    NotLeader,

    /// The replication group is shutting down.
    #[error("shutting down")]
    ShuttingDown,

    /// Leadership is moving to another node.
    #[error("leadership transfer in progress")]
    LeadershipTransferInProgress,

    /// The operation did not complete in time.
    #[error("timeout during {operation}")]
    Timeout {
        /// What operation timed out.
        operation: &'static str,
    },

    /// Local storage failed.
    #[error("storage error: {message}")]
    Storage {
        /// Error description.
        message: String,
    },

    /// Internal replication layer error.
    #[error("internal error: {message}")]
    Internal {
        /// Error description.
        message: String,
    },
}

impl From<ClusterError> for ErrorCode {
    fn from(err: ClusterError) -> Self {
        match err {
            ClusterError::NotLeader
            | ClusterError::ShuttingDown
            | ClusterError::LeadershipTransferInProgress => Self::NotLeaderForPartition,
            ClusterError::Timeout { .. } => Self::RequestTimedOut,
            ClusterError::Storage { .. } | ClusterError::Internal { .. } => {
                warn!(error = %err, "replication layer error mapped to unknown_server_error");
                Self::UnknownServerError
            }
        }
    }
}

impl From<TierError> for ErrorCode {
    fn from(err: TierError) -> Self {
        match err {
            TierError::Timeout { .. } => Self::RequestTimedOut,
            TierError::Unavailable { .. }
            | TierError::DataCorruption { .. }
            | TierError::Metadata { .. } => {
                warn!(error = %err, "remote tier error mapped to unknown_server_error");
                Self::UnknownServerError
            }
        }
    }
}
