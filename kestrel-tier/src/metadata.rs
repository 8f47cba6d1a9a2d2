//! Remote manifest tracking what the tiered store holds for one partition.
//!
//! Everything here is indexed by [`KafkaOffset`]: segments are uploaded after
//! translation, so the remote tier never sees raw offsets.

use kestrel_core::{KafkaOffset, LeaderEpoch, Record, Timestamp};

use crate::error::{TierError, TierResult};

// -----------------------------------------------------------------------------
// CloudOffsetRange
// -----------------------------------------------------------------------------

/// Half-open range `[start, next)` of client offsets held remotely.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CloudOffsetRange {
    /// First offset retrievable from the remote tier.
    pub start: KafkaOffset,
    /// One past the last offset retrievable from the remote tier.
    pub next: KafkaOffset,
}

impl CloudOffsetRange {
    /// Creates a new range.
    ///
    /// # Panics
    ///
    /// Panics if `next < start`.
    #[must_use]
    pub fn new(start: KafkaOffset, next: KafkaOffset) -> Self {
        assert!(start <= next, "cloud range start must not exceed next");
        Self { start, next }
    }

    /// Returns true if the range holds no offsets.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.start == self.next
    }

    /// Returns true if `offset` is retrievable from this range.
    #[must_use]
    pub fn contains(&self, offset: KafkaOffset) -> bool {
        self.start <= offset && offset < self.next
    }
}

// -----------------------------------------------------------------------------
// TxRange
// -----------------------------------------------------------------------------

/// Inclusive client-offset range `[first, last]` of an aborted transaction.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TxRange {
    /// Producer that ran the transaction.
    pub producer_id: i64,
    /// First offset written by the transaction.
    pub first: KafkaOffset,
    /// Last offset written by the transaction.
    pub last: KafkaOffset,
}

impl TxRange {
    /// Creates a new aborted transaction range.
    #[must_use]
    pub const fn new(producer_id: i64, first: KafkaOffset, last: KafkaOffset) -> Self {
        Self {
            producer_id,
            first,
            last,
        }
    }

    /// Returns true if this transaction touches any offset in `[base, last]`.
    #[must_use]
    pub fn overlaps(&self, base: KafkaOffset, last: KafkaOffset) -> bool {
        self.first <= last && self.last >= base
    }
}

// -----------------------------------------------------------------------------
// RemoteSegment
// -----------------------------------------------------------------------------

/// Metadata for one uploaded segment.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RemoteSegment {
    /// First client offset in the segment.
    pub base_offset: KafkaOffset,
    /// Last client offset in the segment.
    pub last_offset: KafkaOffset,
    /// Leadership epoch the segment's records were written under.
    pub epoch: LeaderEpoch,
    /// Segment size in bytes.
    pub size_bytes: u64,
}

impl RemoteSegment {
    /// Creates metadata for a segment covering `[base_offset, last_offset]`.
    ///
    /// # Panics
    ///
    /// Panics if `last_offset < base_offset`.
    #[must_use]
    pub fn new(base_offset: KafkaOffset, last_offset: KafkaOffset, epoch: LeaderEpoch) -> Self {
        assert!(base_offset <= last_offset, "segment must not be empty");
        Self {
            base_offset,
            last_offset,
            epoch,
            size_bytes: 0,
        }
    }
}

// -----------------------------------------------------------------------------
// RemoteBatch
// -----------------------------------------------------------------------------

/// A data batch as read back from an uploaded segment.
///
/// Only data is uploaded, so records occupy consecutive client offsets
/// starting at `base_offset`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RemoteBatch {
    /// Client offset of the first record.
    pub base_offset: KafkaOffset,
    /// Epoch the batch was written under.
    pub epoch: LeaderEpoch,
    /// Maximum timestamp in the batch.
    pub max_timestamp: Timestamp,
    /// Producer that wrote the batch, for transactional data.
    pub producer_id: Option<i64>,
    /// Records in this batch.
    pub records: Vec<Record>,
}

impl RemoteBatch {
    /// Creates a batch starting at `base_offset`.
    #[must_use]
    pub fn new(base_offset: KafkaOffset, epoch: LeaderEpoch, records: Vec<Record>) -> Self {
        let max_timestamp = records
            .iter()
            .map(|record| record.timestamp)
            .max()
            .unwrap_or_default();
        Self {
            base_offset,
            epoch,
            max_timestamp,
            producer_id: None,
            records,
        }
    }

    /// Returns the client offset of the last record.
    #[must_use]
    #[allow(clippy::cast_possible_wrap)] // Record counts are bounded far below i64::MAX.
    pub fn last_offset(&self) -> KafkaOffset {
        self.base_offset
            .saturating_add((self.records.len() as i64 - 1).max(0))
    }
}

// -----------------------------------------------------------------------------
// RemoteManifest
// -----------------------------------------------------------------------------

/// Ordered list of remote segments plus aborted transaction metadata.
///
/// Invariants:
/// - segments are contiguous and ordered by base offset
/// - segment epochs never decrease
/// - `start` lies within the first segment when any segment is present
#[derive(Debug, Clone, Default)]
pub struct RemoteManifest {
    segments: Vec<RemoteSegment>,
    start: Option<KafkaOffset>,
    aborted: Vec<TxRange>,
}

impl RemoteManifest {
    /// Creates an empty manifest.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the segments in offset order.
    #[must_use]
    pub fn segments(&self) -> &[RemoteSegment] {
        &self.segments
    }

    /// Returns true if no segment has been uploaded.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.segments.is_empty()
    }

    /// Appends a newly uploaded segment.
    ///
    /// # Errors
    ///
    /// Returns an error if the segment does not directly follow the last one
    /// or goes back in epoch.
    pub fn add_segment(&mut self, segment: RemoteSegment) -> TierResult<()> {
        if let Some(last) = self.segments.last() {
            if segment.base_offset != last.last_offset.next() {
                return Err(TierError::Metadata {
                    message: format!(
                        "segment base {} does not follow last offset {}",
                        segment.base_offset, last.last_offset
                    ),
                });
            }
            if segment.epoch < last.epoch {
                return Err(TierError::Metadata {
                    message: format!(
                        "segment epoch {} is older than {}",
                        segment.epoch, last.epoch
                    ),
                });
            }
        }
        if self.segments.is_empty() {
            self.start = Some(segment.base_offset);
        }
        self.segments.push(segment);
        Ok(())
    }

    /// Records an aborted transaction.
    pub fn add_aborted(&mut self, tx: TxRange) {
        self.aborted.push(tx);
        self.aborted.sort_by_key(|tx| tx.first);
    }

    /// Moves the remote start forward, dropping segments entirely below it.
    ///
    /// Moving the start backwards is ignored.
    pub fn advance_start(&mut self, start: KafkaOffset) {
        if self.start.is_some_and(|current| start <= current) {
            return;
        }
        self.segments.retain(|segment| segment.last_offset >= start);
        self.aborted.retain(|tx| tx.last >= start);
        self.start = self.segments.first().map(|_| start);

        // Postcondition: start lies within the first segment.
        debug_assert!(self
            .segments
            .first()
            .map_or(true, |first| first.base_offset <= start && start <= first.last_offset));
    }

    /// Returns the retrievable range, or `None` when nothing is uploaded.
    #[must_use]
    pub fn offset_range(&self) -> Option<CloudOffsetRange> {
        let first = self.start?;
        let last = self.segments.last()?;
        Some(CloudOffsetRange::new(first, last.last_offset.next()))
    }

    /// Returns the aborted transactions touching `[base, last]`, ordered by
    /// first offset.
    #[must_use]
    pub fn aborted_transactions(&self, base: KafkaOffset, last: KafkaOffset) -> Vec<TxRange> {
        self.aborted
            .iter()
            .filter(|tx| tx.overlaps(base, last))
            .copied()
            .collect()
    }

    /// Returns the last offset written under an epoch at or below `epoch`.
    #[must_use]
    pub fn term_last_offset(&self, epoch: LeaderEpoch) -> Option<KafkaOffset> {
        let start = self.start?;
        self.segments
            .iter()
            .take_while(|segment| segment.epoch <= epoch)
            .last()
            .map(|segment| segment.last_offset)
            .filter(|last| *last >= start)
    }
}
