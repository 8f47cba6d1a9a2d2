//! Record and batch types as they sit in the replicated log.
//!
//! Records are grouped into batches. A batch occupies one [`RawOffset`] per
//! record. Only [`BatchType::Data`] batches are visible to clients; the other
//! batch types are control entries written by the replication and
//! transaction machinery.

use std::time::{SystemTime, UNIX_EPOCH};

use bytes::Bytes;

use crate::{RawOffset, TermId};

/// Timestamp type for records.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Timestamp(i64);

impl Timestamp {
    /// Creates a timestamp from milliseconds since Unix epoch.
    #[must_use]
    pub const fn from_millis(millis: i64) -> Self {
        Self(millis)
    }

    /// Returns the timestamp as milliseconds since Unix epoch.
    #[must_use]
    pub const fn as_millis(self) -> i64 {
        self.0
    }

    /// Returns the current time as a timestamp.
    #[must_use]
    #[allow(clippy::cast_possible_truncation)] // Timestamps won't overflow i64 for centuries.
    pub fn now() -> Self {
        let duration = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .unwrap_or_default();
        Self(duration.as_millis() as i64)
    }

    /// Creates a timestamp representing "no timestamp".
    #[must_use]
    pub const fn none() -> Self {
        Self(-1)
    }

    /// Returns true if this represents "no timestamp".
    #[must_use]
    pub const fn is_none(self) -> bool {
        self.0 < 0
    }
}

impl Default for Timestamp {
    fn default() -> Self {
        Self::none()
    }
}

/// A single record.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Record {
    /// Timestamp of the record.
    pub timestamp: Timestamp,
    /// The record value/payload.
    pub value: Bytes,
}

impl Record {
    /// Creates a new record with just a value.
    #[must_use]
    pub fn new(value: impl Into<Bytes>) -> Self {
        Self {
            timestamp: Timestamp::now(),
            value: value.into(),
        }
    }

    /// Sets the timestamp.
    #[must_use]
    pub const fn with_timestamp(mut self, timestamp: Timestamp) -> Self {
        self.timestamp = timestamp;
        self
    }

    /// Returns the approximate size of the record in bytes.
    #[must_use]
    pub fn size(&self) -> usize {
        8 + 4 + self.value.len()
    }
}

/// Kind of entry a batch represents in the replicated log.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
#[repr(u8)]
pub enum BatchType {
    /// Client data. The only type visible through the client offset space.
    #[default]
    Data = 0,
    /// Replication group configuration change.
    RaftConfiguration = 1,
    /// Transaction commit/abort marker.
    TxControl = 2,
    /// Internal state machine checkpoint.
    Checkpoint = 3,
}

impl BatchType {
    /// Returns true for batch types that occupy client offsets.
    #[must_use]
    pub const fn is_data(self) -> bool {
        matches!(self, Self::Data)
    }
}

/// A batch of records at a fixed position in the replicated log.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RecordBatch {
    /// What kind of entry this batch is.
    pub batch_type: BatchType,
    /// Raw offset of the first record (assigned by the replication layer).
    pub base_offset: RawOffset,
    /// Term under which the batch was written.
    pub term: TermId,
    /// Maximum timestamp in the batch.
    pub max_timestamp: Timestamp,
    /// Producer that wrote the batch, for transactional data.
    pub producer_id: Option<i64>,
    /// Records in this batch.
    pub records: Vec<Record>,
}

impl RecordBatch {
    /// Creates an empty batch of the given type.
    #[must_use]
    pub const fn new(batch_type: BatchType) -> Self {
        Self {
            batch_type,
            base_offset: RawOffset::new(0),
            term: TermId::new(0),
            max_timestamp: Timestamp::none(),
            producer_id: None,
            records: Vec::new(),
        }
    }

    /// Creates a data batch from records.
    #[must_use]
    pub fn data(records: Vec<Record>) -> Self {
        let mut batch = Self::new(BatchType::Data);
        for record in records {
            batch.push(record);
        }
        batch
    }

    /// Creates a control batch with `count` empty records.
    #[must_use]
    pub fn control(batch_type: BatchType, count: usize) -> Self {
        debug_assert!(!batch_type.is_data());
        let mut batch = Self::new(batch_type);
        for _ in 0..count {
            batch.push(Record::new(Bytes::new()));
        }
        batch
    }

    /// Adds a record to the batch.
    pub fn push(&mut self, record: Record) {
        if self.max_timestamp.is_none() || record.timestamp > self.max_timestamp {
            self.max_timestamp = record.timestamp;
        }
        self.records.push(record);
    }

    /// Returns the number of records in the batch.
    #[must_use]
    pub fn len(&self) -> usize {
        self.records.len()
    }

    /// Returns true if the batch is empty.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// Returns the raw offset of the last record in the batch.
    #[must_use]
    #[allow(clippy::cast_possible_wrap)] // Record counts are bounded far below i64::MAX.
    pub fn last_offset(&self) -> RawOffset {
        if self.records.is_empty() {
            self.base_offset
        } else {
            self.base_offset.saturating_add(self.records.len() as i64 - 1)
        }
    }

    /// Returns true if `offset` falls inside this batch.
    #[must_use]
    pub fn contains(&self, offset: RawOffset) -> bool {
        !self.is_empty() && self.base_offset <= offset && offset <= self.last_offset()
    }

    /// Returns the approximate size of the batch in bytes.
    #[must_use]
    pub fn size(&self) -> usize {
        // Header: type + base_offset + term + timestamp + producer + record_count
        let header_size = 1 + 8 + 8 + 8 + 8 + 4;
        let records_size: usize = self.records.iter().map(Record::size).sum();
        header_size + records_size
    }
}
