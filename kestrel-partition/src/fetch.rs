//! Fetch offset validation.
//!
//! The async part of validation (the linearizable start refresh) lives on
//! the partition view. This module holds the decisions made around it.

use kestrel_core::KafkaOffset;
use tracing::debug;

use crate::error::{ErrorCode, ProxyResult};

/// Rejects fetches that need a leader when this replica is not one.
///
/// Read replicas serve fetches from any node.
///
/// # Errors
///
/// Returns `NotLeaderForPartition` if leadership is required and not held.
pub const fn check_leadership(read_replica: bool, is_leader: bool) -> ProxyResult<()> {
    if !read_replica && !is_leader {
        return Err(ErrorCode::NotLeaderForPartition);
    }
    Ok(())
}

/// Fetchable range after a synced start refresh.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FetchBounds {
    /// Synced start offset.
    pub start: KafkaOffset,
    /// High watermark.
    pub high_watermark: KafkaOffset,
}

impl FetchBounds {
    /// Checks `offset` against `[start, high_watermark]`.
    ///
    /// The high watermark itself is fetchable: it is where a caught-up
    /// consumer waits for new data. `allow_earliest` skips the check for
    /// callers that will reset to the earliest offset themselves.
    ///
    /// # Errors
    ///
    /// Returns `OffsetOutOfRange` if the offset is outside the bounds.
    pub fn check(&self, offset: KafkaOffset, allow_earliest: bool) -> ProxyResult<()> {
        if allow_earliest {
            return Ok(());
        }
        if offset < self.start || offset > self.high_watermark {
            debug!(
                offset = %offset,
                start = %self.start,
                high_watermark = %self.high_watermark,
                "fetch offset out of range"
            );
            return Err(ErrorCode::OffsetOutOfRange);
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn bounds() -> FetchBounds {
        FetchBounds {
            start: KafkaOffset::new(10),
            high_watermark: KafkaOffset::new(20),
        }
    }

    #[test]
    fn test_bounds_are_inclusive() {
        let bounds = bounds();
        assert_eq!(bounds.check(KafkaOffset::new(10), false), Ok(()));
        assert_eq!(bounds.check(KafkaOffset::new(20), false), Ok(()));
        assert_eq!(
            bounds.check(KafkaOffset::new(21), false),
            Err(ErrorCode::OffsetOutOfRange)
        );
        assert_eq!(
            bounds.check(KafkaOffset::new(9), false),
            Err(ErrorCode::OffsetOutOfRange)
        );
    }

    #[test]
    fn test_allow_earliest_skips_range() {
        let bounds = bounds();
        assert_eq!(bounds.check(KafkaOffset::new(0), true), Ok(()));
        assert_eq!(bounds.check(KafkaOffset::new(500), true), Ok(()));
    }

    #[test]
    fn test_leadership() {
        assert_eq!(check_leadership(false, true), Ok(()));
        assert_eq!(check_leadership(true, false), Ok(()));
        assert_eq!(
            check_leadership(false, false),
            Err(ErrorCode::NotLeaderForPartition)
        );
    }
}
