//! Kestrel Tier - read-side view of a partition's remote tiered store.
//!
//! Older segments of a partition may be evicted locally once they are held by
//! remote object storage. This crate describes what the remote tier holds, in
//! client offsets, and answers the metadata queries a partition view needs to
//! stitch local and remote data together.
//!
//! Uploading and evicting segments happens elsewhere. This crate only reads.
//!
//! # Design Principles (`TigerStyle`)
//!
//! - **Deterministic testing**: `SimulatedRemoteTier` enables fault injection
//! - **Assertions**: Pre/post-conditions on manifest transitions
//! - **No unsafe code**: Safety > Performance
//!
//! # Example
//!
//! ```ignore
//! use kestrel_core::{KafkaOffset, LeaderEpoch};
//! use kestrel_tier::{RemoteSegment, RemoteTier, SimulatedRemoteTier};
//!
//! let tier = SimulatedRemoteTier::new(42);
//! tier.add_segment(RemoteSegment::new(
//!     KafkaOffset::new(0),
//!     KafkaOffset::new(99),
//!     LeaderEpoch::new(1),
//! ))?;
//!
//! assert_eq!(tier.offset_range().unwrap().next, KafkaOffset::new(100));
//! ```

#![forbid(unsafe_code)]
#![deny(missing_docs)]
#![deny(clippy::all)]
#![warn(clippy::pedantic)]
#![warn(clippy::nursery)]

mod error;
mod metadata;
mod storage;

pub use error::{TierError, TierResult};
pub use metadata::{CloudOffsetRange, RemoteBatch, RemoteManifest, RemoteSegment, TxRange};
pub use storage::{RemoteTier, RemoteTierFaultConfig, SimulatedRemoteTier};
