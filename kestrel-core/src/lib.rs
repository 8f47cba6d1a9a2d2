//! Kestrel Core - Strongly-typed identifiers, offsets and records.
//!
//! This crate provides the vocabulary shared by every Kestrel crate. It does
//! no I/O.
//!
//! # Design Principles (TigerStyle)
//!
//! - **Strongly-typed IDs**: Prevent mixing up `NodeId` with `PartitionId`
//! - **Separate offset spaces**: `RawOffset` and `KafkaOffset` never mix
//! - **Explicit types**: Use u64/i64, not usize
//! - **No unsafe code**: Safety > Performance

#![forbid(unsafe_code)]
#![deny(missing_docs)]
#![deny(clippy::all)]
#![warn(clippy::pedantic)]
#![warn(clippy::nursery)]

mod offset;
mod record;
mod types;

pub use offset::{KafkaOffset, LeaderEpoch, RawOffset};
pub use record::{BatchType, Record, RecordBatch, Timestamp};
pub use types::{NodeId, Ntp, PartitionId, TermId, TopicId};
