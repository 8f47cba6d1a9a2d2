//! Partition view configuration.

use std::time::Duration;

use thiserror::Error;

/// Default bound on a remote tier round trip.
const REMOTE_QUERY_TIMEOUT_DEFAULT: Duration = Duration::from_secs(10);

/// Default bound on a linearizable start offset refresh.
const SYNC_START_TIMEOUT_DEFAULT: Duration = Duration::from_secs(5);

/// Default read budget when a reader does not set one (1 MiB).
const READER_MAX_BYTES_DEFAULT: usize = 1024 * 1024;

/// Configuration for a partition view.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PartitionViewConfig {
    /// Bound on every remote tier metadata query.
    pub remote_query_timeout: Duration,
    /// Bound on `sync_effective_start` when the caller gives none.
    pub sync_start_timeout: Duration,
    /// Read budget used when a reader config leaves `max_bytes` at zero.
    pub reader_max_bytes_default: usize,
}

impl Default for PartitionViewConfig {
    fn default() -> Self {
        Self {
            remote_query_timeout: REMOTE_QUERY_TIMEOUT_DEFAULT,
            sync_start_timeout: SYNC_START_TIMEOUT_DEFAULT,
            reader_max_bytes_default: READER_MAX_BYTES_DEFAULT,
        }
    }
}

impl PartitionViewConfig {
    /// Creates a config with short timeouts (for testing).
    #[must_use]
    pub const fn for_testing() -> Self {
        Self {
            remote_query_timeout: Duration::from_millis(500),
            sync_start_timeout: Duration::from_millis(500),
            reader_max_bytes_default: 64 * 1024,
        }
    }

    /// Sets the remote query timeout.
    #[must_use]
    pub const fn with_remote_query_timeout(mut self, timeout: Duration) -> Self {
        self.remote_query_timeout = timeout;
        self
    }

    /// Sets the default synced start timeout.
    #[must_use]
    pub const fn with_sync_start_timeout(mut self, timeout: Duration) -> Self {
        self.sync_start_timeout = timeout;
        self
    }

    /// Sets the default reader byte budget.
    #[must_use]
    pub const fn with_reader_max_bytes_default(mut self, max_bytes: usize) -> Self {
        self.reader_max_bytes_default = max_bytes;
        self
    }

    /// Validates the configuration.
    ///
    /// # Errors
    /// Returns an error if any bound is zero.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.remote_query_timeout.is_zero() {
            return Err(ConfigError::InvalidTiming {
                message: "remote_query_timeout must be > 0".to_string(),
            });
        }
        if self.sync_start_timeout.is_zero() {
            return Err(ConfigError::InvalidTiming {
                message: "sync_start_timeout must be > 0".to_string(),
            });
        }
        if self.reader_max_bytes_default == 0 {
            return Err(ConfigError::InvalidLimit {
                message: "reader_max_bytes_default must be > 0".to_string(),
            });
        }
        Ok(())
    }
}

/// Configuration errors.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ConfigError {
    /// Invalid timing configuration.
    #[error("invalid timing config: {message}")]
    InvalidTiming {
        /// Error description.
        message: String,
    },
    /// Invalid resource limit.
    #[error("invalid limit: {message}")]
    InvalidLimit {
        /// Error description.
        message: String,
    },
}
