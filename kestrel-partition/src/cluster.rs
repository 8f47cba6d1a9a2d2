//! Replication layer abstraction.
//!
//! A [`ClusterPartition`] is one replica of a consensus group as the partition
//! view sees it. Every offset crossing this trait is a [`RawOffset`]; the view
//! does all translation itself using the snapshot returned by
//! [`ClusterPartition::translator`].

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use futures::future::BoxFuture;
use kestrel_core::{BatchType, KafkaOffset, NodeId, Ntp, RawOffset, RecordBatch, TermId, Timestamp};
use tokio::time::Instant;

use crate::error::ClusterResult;
use crate::translator::OffsetTranslatorState;

// -----------------------------------------------------------------------------
// Raw Types
// -----------------------------------------------------------------------------

/// Last stable offset as reported by the replication layer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RawLso {
    /// Exclusive raw position below which no transaction is open.
    Offset(RawOffset),
    /// Not established yet (for example right after an election).
    Unavailable,
}

/// Acknowledgement level for an append.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Acks {
    /// Complete once the batch is queued.
    None,
    /// Complete once the leader holds the batch.
    Leader,
    /// Complete once a majority holds the batch.
    #[default]
    All,
}

/// Options for an append.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct ReplicateOptions {
    /// Acknowledgement level.
    pub acks: Acks,
    /// Optional bound on the whole append.
    pub timeout: Option<Duration>,
}

impl ReplicateOptions {
    /// Creates options with the given acknowledgement level.
    #[must_use]
    pub const fn new(acks: Acks) -> Self {
        Self {
            acks,
            timeout: None,
        }
    }

    /// Sets the append timeout.
    #[must_use]
    pub const fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }
}

/// Two-phase completion of an append, in raw offsets.
pub struct RawReplicateStages {
    /// Resolves once the batch is accepted into the replication queue.
    pub enqueued: BoxFuture<'static, ClusterResult<()>>,
    /// Resolves to the raw offset of the batch's last record once durable.
    pub finished: BoxFuture<'static, ClusterResult<RawOffset>>,
}

impl std::fmt::Debug for RawReplicateStages {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RawReplicateStages").finish_non_exhaustive()
    }
}

/// Range read request over the local log.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LogReaderConfig {
    /// First raw offset to read.
    pub start: RawOffset,
    /// Last raw offset to read (inclusive).
    pub max: RawOffset,
    /// Only return batches of this type.
    pub type_filter: Option<BatchType>,
}

/// Forward-only reader over the local log.
#[async_trait]
pub trait LogReader: Send {
    /// Returns the next batch overlapping the configured range, or `None`
    /// once the range is exhausted.
    ///
    /// # Errors
    ///
    /// Returns an error if local storage fails.
    async fn next_batch(&mut self) -> ClusterResult<Option<RecordBatch>>;
}

/// Aborted transaction range in raw offsets.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RawTxRange {
    /// Producer that ran the transaction.
    pub producer_id: i64,
    /// First raw offset written by the transaction.
    pub first: RawOffset,
    /// Last raw offset written by the transaction.
    pub last: RawOffset,
}

impl RawTxRange {
    /// Creates a new raw aborted range.
    #[must_use]
    pub const fn new(producer_id: i64, first: RawOffset, last: RawOffset) -> Self {
        Self {
            producer_id,
            first,
            last,
        }
    }
}

/// Time-indexed lookup in raw offsets.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RawTimeQuery {
    /// Find the first record at or after this time.
    pub time: Timestamp,
    /// Ignore records past this raw offset.
    pub max_offset: RawOffset,
}

/// Result of a raw time lookup.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RawTimeQueryResult {
    /// Raw offset of the matching record.
    pub offset: RawOffset,
    /// Timestamp of the matching record.
    pub time: Timestamp,
}

/// Replication progress of one follower, as tracked by the leader.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FollowerState {
    /// Follower node.
    pub node_id: NodeId,
    /// Last raw offset the follower has made durable.
    pub match_index: RawOffset,
    /// Last raw offset the follower has appended.
    pub dirty_index: RawOffset,
    /// Whether the follower responded recently.
    pub is_alive: bool,
}

// -----------------------------------------------------------------------------
// ClusterPartition Trait
// -----------------------------------------------------------------------------

/// One replica of a replicated partition.
///
/// Boundary accessors read in-memory state and never wait. Methods that need
/// consensus or storage I/O are async and may fail with leadership or
/// timeout errors.
#[async_trait]
pub trait ClusterPartition: Send + Sync {
    /// Returns the topic and partition this replica belongs to.
    fn ntp(&self) -> Ntp;

    /// Returns this replica's node.
    fn node_id(&self) -> NodeId;

    /// Returns the current leader, if known.
    fn leader_id(&self) -> Option<NodeId>;

    /// Returns a snapshot of the live offset translator.
    fn translator(&self) -> Arc<OffsetTranslatorState>;

    /// Returns true if the partition mirrors externally stored data.
    fn is_read_replica_mode_enabled(&self) -> bool;

    /// Returns true if local reads may be supplemented remotely.
    fn is_remote_fetch_enabled(&self) -> bool;

    /// Returns the first retained raw offset.
    fn raft_start_offset(&self) -> RawOffset;

    /// Returns the first retained raw offset after a linearizable refresh.
    ///
    /// # Errors
    ///
    /// Returns an error if leadership is lost or the refresh does not
    /// complete within `timeout`.
    async fn sync_effective_start(&self, timeout: Duration) -> ClusterResult<RawOffset>;

    /// Returns the exclusive committed raw position.
    fn high_watermark(&self) -> RawOffset;

    /// Returns the high watermark as last reported by the leader.
    fn leader_high_watermark(&self) -> RawOffset;

    /// Returns the last appended raw offset, or `-1` for an empty log.
    fn dirty_offset(&self) -> RawOffset;

    /// Returns the raw last stable offset.
    fn last_stable_offset(&self) -> RawLso;

    /// Returns true if this replica leads and has committed in its term.
    fn is_leader(&self) -> bool;

    /// Returns true if this replica won the most recent election.
    fn is_elected_leader(&self) -> bool;

    /// Returns the current term.
    fn term(&self) -> TermId;

    /// Returns the term of the retained entry at `offset`.
    fn term_of(&self, offset: RawOffset) -> Option<TermId>;

    /// Returns the last retained raw offset written under a term at or
    /// below `term`.
    fn term_last_offset(&self, term: TermId) -> Option<RawOffset>;

    /// Returns follower progress.
    ///
    /// # Errors
    ///
    /// Returns an error if this replica does not lead.
    fn follower_states(&self) -> ClusterResult<Vec<FollowerState>>;

    /// Waits until this replica is confirmed leader for its current term.
    ///
    /// # Errors
    ///
    /// Returns an error if leadership is lost.
    async fn linearizable_barrier(&self) -> ClusterResult<RawOffset>;

    /// Discards every entry before `offset`.
    ///
    /// # Errors
    ///
    /// Returns an error if the truncation cannot be replicated by `deadline`.
    async fn prefix_truncate(
        &self,
        offset: RawOffset,
        kafka_offset: KafkaOffset,
        deadline: Instant,
    ) -> ClusterResult<()>;

    /// Appends a batch and waits for the requested acknowledgement level.
    ///
    /// Returns the raw offset of the batch's last record.
    ///
    /// # Errors
    ///
    /// Returns an error if the append fails or leadership is lost.
    async fn replicate(
        &self,
        batch: RecordBatch,
        options: ReplicateOptions,
    ) -> ClusterResult<RawOffset>;

    /// Appends a batch, reporting enqueue and durable completion separately.
    fn replicate_in_stages(
        &self,
        batch: RecordBatch,
        options: ReplicateOptions,
    ) -> RawReplicateStages;

    /// Opens a reader over a raw range of the local log.
    ///
    /// # Errors
    ///
    /// Returns an error if local storage cannot serve the range.
    async fn make_reader(&self, config: LogReaderConfig) -> ClusterResult<Box<dyn LogReader>>;

    /// Finds the first data record at or after a timestamp.
    ///
    /// # Errors
    ///
    /// Returns an error if local storage fails.
    async fn timequery(&self, query: RawTimeQuery) -> ClusterResult<Option<RawTimeQueryResult>>;

    /// Returns aborted transactions touching the raw range `[from, to]`,
    /// ordered by first offset.
    ///
    /// # Errors
    ///
    /// Returns an error if transaction state is unavailable.
    async fn aborted_transactions(
        &self,
        from: RawOffset,
        to: RawOffset,
    ) -> ClusterResult<Vec<RawTxRange>>;
}
