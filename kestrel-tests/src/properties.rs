//! Property definitions and checkers for partition view tests.
//!
//! Properties are invariants of the client offset space that must hold
//! after any sequence of appends, truncations, and mode changes.

use kestrel_core::KafkaOffset;
use kestrel_partition::{PartitionProxy, TranslatedBatch};
use kestrel_tier::TxRange;

// ============================================================================
// Property Violation Types
// ============================================================================

/// A violation of a client offset space property.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PropertyViolation {
    /// Boundaries are not ordered `start <= high watermark <= log end`.
    BoundaryOrder {
        /// Reported start offset.
        start: KafkaOffset,
        /// Reported high watermark.
        high_watermark: KafkaOffset,
        /// Reported log end offset.
        log_end: KafkaOffset,
    },
    /// The dirty offset is not exactly one below the log end.
    DirtyEndMismatch {
        /// Reported dirty offset.
        dirty: KafkaOffset,
        /// Reported log end offset.
        log_end: KafkaOffset,
    },
    /// A batch did not start where the previous one ended.
    ReadGap {
        /// Offset the next batch should have started at.
        expected: KafkaOffset,
        /// Offset it actually started at.
        actual: KafkaOffset,
    },
    /// Aborted transactions are out of order or duplicated.
    AbortedOrder {
        /// Producer of the offending entry.
        producer_id: i64,
        /// Its first offset.
        first: KafkaOffset,
    },
}

impl std::fmt::Display for PropertyViolation {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::BoundaryOrder {
                start,
                high_watermark,
                log_end,
            } => write!(
                f,
                "Boundaries out of order: start {start}, high watermark {high_watermark}, \
                 log end {log_end}"
            ),
            Self::DirtyEndMismatch { dirty, log_end } => {
                write!(f, "Dirty offset {dirty} does not precede log end {log_end}")
            }
            Self::ReadGap { expected, actual } => {
                write!(f, "Read gap: expected batch at {expected}, got {actual}")
            }
            Self::AbortedOrder { producer_id, first } => write!(
                f,
                "Aborted transaction of producer {producer_id} at {first} is out of order"
            ),
        }
    }
}

// ============================================================================
// Checkers
// ============================================================================

/// Checks boundary ordering on a live partition view.
///
/// # Errors
///
/// Returns the first violated property.
pub fn check_boundaries(partition: &dyn PartitionProxy) -> Result<(), PropertyViolation> {
    let start = partition.start_offset();
    let high_watermark = partition.high_watermark();
    let dirty = partition.log_dirty_offset();
    let log_end = partition.log_end_offset();

    if start > high_watermark || high_watermark > log_end {
        return Err(PropertyViolation::BoundaryOrder {
            start,
            high_watermark,
            log_end,
        });
    }
    if dirty.next() != log_end {
        return Err(PropertyViolation::DirtyEndMismatch { dirty, log_end });
    }
    Ok(())
}

/// Checks that `batches` cover client offsets contiguously from `start`.
///
/// Returns the offset after the last batch.
///
/// # Errors
///
/// Returns the first gap or overlap.
pub fn check_contiguous(
    start: KafkaOffset,
    batches: &[TranslatedBatch],
) -> Result<KafkaOffset, PropertyViolation> {
    let mut expected = start;
    for batch in batches {
        if batch.base_offset != expected {
            return Err(PropertyViolation::ReadGap {
                expected,
                actual: batch.base_offset,
            });
        }
        expected = batch.last_offset().next();
    }
    Ok(expected)
}

/// Checks that aborted transactions are strictly ordered by first offset
/// per producer and never repeated.
///
/// # Errors
///
/// Returns the first offending entry.
pub fn check_aborted_order(aborted: &[TxRange]) -> Result<(), PropertyViolation> {
    for pair in aborted.windows(2) {
        let (previous, current) = (&pair[0], &pair[1]);
        if current.first < previous.first || current == previous {
            return Err(PropertyViolation::AbortedOrder {
                producer_id: current.producer_id,
                first: current.first,
            });
        }
    }
    Ok(())
}
