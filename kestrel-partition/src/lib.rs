//! Kestrel Partition - protocol-visible view of a replicated, tiered partition.
//!
//! The replication layer numbers every log entry, including control entries
//! that clients never see. Clients address records by a dense offset space
//! with those entries removed, and older records may only exist in the
//! remote tier. This crate reconciles the two: it translates offsets in both
//! directions, chooses between local and remote boundaries, and maps
//! replication failures onto protocol error codes.
//!
//! # Layout
//!
//! - [`PartitionProxy`]: the operations protocol handlers call
//! - [`ReplicatedPartition`]: the implementation over a [`ClusterPartition`]
//!   and a [`kestrel_tier::RemoteTier`]
//! - [`OffsetTranslatorState`]: immutable raw/client offset mapping snapshot
//! - [`SimulatedClusterPartition`]: in-memory replica for deterministic tests
//!
//! # `TigerStyle` Principles
//!
//! - Snapshots are immutable; staleness is detected, never patched over
//! - Every remote round trip is bounded by a timeout
//! - No unsafe code
//!
//! # Example
//!
//! ```ignore
//! use std::sync::Arc;
//!
//! use kestrel_core::{KafkaOffset, NodeId, Ntp, PartitionId, TopicId};
//! use kestrel_partition::{
//!     PartitionProxy, PartitionViewConfig, ReplicatedPartition, SimulatedClusterPartition,
//! };
//! use kestrel_tier::SimulatedRemoteTier;
//!
//! let cluster = SimulatedClusterPartition::new(
//!     Ntp::new(TopicId::new(1), PartitionId::new(0)),
//!     NodeId::new(1),
//! );
//! cluster.append_data(10);
//!
//! let partition = ReplicatedPartition::new(
//!     Arc::new(cluster),
//!     Arc::new(SimulatedRemoteTier::new(42)),
//!     PartitionViewConfig::default(),
//! )?;
//! assert_eq!(partition.high_watermark(), KafkaOffset::new(10));
//! ```

#![forbid(unsafe_code)]
#![deny(missing_docs)]
#![deny(clippy::all)]
#![warn(clippy::pedantic)]
#![warn(clippy::nursery)]

mod aborted;
mod cluster;
mod config;
mod epoch;
mod error;
mod fetch;
mod mode;
mod proxy;
mod reader;
mod reconciler;
mod replicated;
mod simulated;
mod translator;

pub use aborted::AbortedRangePlan;
pub use cluster::{
    Acks, ClusterPartition, FollowerState, LogReader, LogReaderConfig, RawLso,
    RawReplicateStages, RawTimeQuery, RawTimeQueryResult, RawTxRange, ReplicateOptions,
};
pub use config::{ConfigError, PartitionViewConfig};
pub use error::{ClusterError, ClusterResult, ErrorCode, ProxyResult};
pub use fetch::FetchBounds;
pub use mode::PartitionMode;
pub use proxy::{
    PartitionInfo, PartitionProxy, ReplicaInfo, ReplicateStages, TimeQuery, TimeQueryResult,
};
pub use reader::{ReaderConfig, TranslatedBatch, TranslatingReader};
pub use reconciler::BoundaryInputs;
pub use replicated::ReplicatedPartition;
pub use simulated::{ClusterFaultConfig, SimulatedClusterPartition};
pub use translator::OffsetTranslatorState;
