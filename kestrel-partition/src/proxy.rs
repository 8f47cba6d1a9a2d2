//! The partition view exposed to the protocol layer.
//!
//! Protocol handlers program against [`PartitionProxy`] and never see raw
//! offsets, collaborator errors, or mode flags. The live implementation is
//! [`ReplicatedPartition`](crate::ReplicatedPartition).

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use futures::future::BoxFuture;
use kestrel_core::{KafkaOffset, LeaderEpoch, NodeId, Ntp, RecordBatch, Timestamp};
use kestrel_tier::TxRange;
use tokio::time::Instant;

use crate::cluster::ReplicateOptions;
use crate::error::ProxyResult;
use crate::reader::{ReaderConfig, TranslatingReader};
use crate::translator::OffsetTranslatorState;

/// Replication progress of one replica, in client offsets.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ReplicaInfo {
    /// Replica node.
    pub id: NodeId,
    /// Exclusive position the replica has made durable.
    pub high_watermark: KafkaOffset,
    /// Next offset the replica would append.
    pub log_end_offset: KafkaOffset,
    /// Whether the replica responded recently.
    pub is_alive: bool,
}

/// Metadata snapshot of a partition.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PartitionInfo {
    /// Current leader, if known.
    pub leader: Option<NodeId>,
    /// Leader epoch.
    pub leader_epoch: LeaderEpoch,
    /// All replicas, this one first.
    pub replicas: Vec<ReplicaInfo>,
}

/// Two-phase completion of an append, in client offsets.
pub struct ReplicateStages {
    /// Resolves once the batch is accepted into the replication queue.
    pub enqueued: BoxFuture<'static, ProxyResult<()>>,
    /// Resolves to the client offset of the batch's last record once durable.
    pub finished: BoxFuture<'static, ProxyResult<KafkaOffset>>,
}

impl std::fmt::Debug for ReplicateStages {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ReplicateStages").finish_non_exhaustive()
    }
}

/// Time-indexed lookup in client offsets.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TimeQuery {
    /// Find the first record at or after this time.
    pub time: Timestamp,
    /// Ignore records past this offset.
    pub max_offset: KafkaOffset,
}

/// Result of a time lookup.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TimeQueryResult {
    /// Client offset of the matching record.
    pub offset: KafkaOffset,
    /// Timestamp of the matching record.
    pub time: Timestamp,
}

/// Protocol-visible operations on one partition.
///
/// Every offset is a client offset. Every error is an
/// [`ErrorCode`](crate::ErrorCode).
#[async_trait]
pub trait PartitionProxy: Send + Sync {
    /// Returns the topic and partition.
    fn ntp(&self) -> Ntp;

    /// Returns a fresh translator snapshot.
    fn translator(&self) -> Arc<OffsetTranslatorState>;

    /// Returns the first fetchable offset.
    fn start_offset(&self) -> KafkaOffset;

    /// Returns the first fetchable offset after a linearizable refresh.
    ///
    /// `None` uses the configured default timeout.
    ///
    /// # Errors
    ///
    /// Returns `NotLeaderForPartition` or `RequestTimedOut` if the refresh
    /// fails.
    async fn sync_effective_start(&self, timeout: Option<Duration>) -> ProxyResult<KafkaOffset>;

    /// Returns the exclusive committed position.
    fn high_watermark(&self) -> KafkaOffset;

    /// Returns the leader's high watermark.
    fn leader_high_watermark(&self) -> KafkaOffset;

    /// Returns the last appended offset, `-1` when empty.
    fn log_dirty_offset(&self) -> KafkaOffset;

    /// Returns the next offset to be appended.
    fn log_end_offset(&self) -> KafkaOffset;

    /// Returns the last stable offset.
    ///
    /// # Errors
    ///
    /// Returns `OffsetNotAvailable` if none is established yet.
    fn last_stable_offset(&self) -> ProxyResult<KafkaOffset>;

    /// Returns true if this replica leads and may serve linearizable reads.
    fn is_leader(&self) -> bool;

    /// Returns true if this replica won the most recent election.
    fn is_elected_leader(&self) -> bool;

    /// Returns the current leader epoch.
    fn leader_epoch(&self) -> LeaderEpoch;

    /// Waits until leadership is confirmed for the current term.
    ///
    /// # Errors
    ///
    /// Returns `NotLeaderForPartition` if leadership is lost.
    async fn linearizable_barrier(&self) -> ProxyResult<()>;

    /// Returns the last offset of `epoch`, or `None` if no record qualifies.
    ///
    /// # Errors
    ///
    /// Returns `RequestTimedOut` if the remote tier does not answer in time.
    async fn get_leader_epoch_last_offset(
        &self,
        epoch: LeaderEpoch,
    ) -> ProxyResult<Option<KafkaOffset>>;

    /// Checks that `offset` may be fetched.
    ///
    /// # Errors
    ///
    /// Returns `NotLeaderForPartition`, `RequestTimedOut`, or
    /// `OffsetOutOfRange`.
    async fn validate_fetch_offset(
        &self,
        offset: KafkaOffset,
        allow_earliest: bool,
        deadline: Instant,
    ) -> ProxyResult<()>;

    /// Returns aborted transactions touching `[base, last]`.
    ///
    /// # Errors
    ///
    /// Returns `RequestTimedOut` if a source does not answer in time or the
    /// log was truncated past `translator`.
    async fn aborted_transactions(
        &self,
        base: KafkaOffset,
        last: KafkaOffset,
        translator: Arc<OffsetTranslatorState>,
    ) -> ProxyResult<Vec<TxRange>>;

    /// Discards every record before `offset`.
    ///
    /// # Errors
    ///
    /// Returns `OffsetOutOfRange` past the high watermark, or the mapped
    /// replication error.
    async fn prefix_truncate(&self, offset: KafkaOffset, deadline: Instant) -> ProxyResult<()>;

    /// Appends a batch and returns the offset of its last record.
    ///
    /// # Errors
    ///
    /// Returns `NotLeaderForPartition` on read replicas or the mapped
    /// replication error.
    async fn replicate(
        &self,
        batch: RecordBatch,
        options: ReplicateOptions,
    ) -> ProxyResult<KafkaOffset>;

    /// Appends a batch, reporting enqueue and durable completion separately.
    fn replicate_in_stages(&self, batch: RecordBatch, options: ReplicateOptions) -> ReplicateStages;

    /// Opens a reader over `[config.start, config.max]`.
    ///
    /// Offsets below the local start are served by the remote tier when
    /// remote fetch can reach them; read replicas always read remotely.
    ///
    /// # Errors
    ///
    /// Returns `OffsetOutOfRange` if `config.start` is below the local start
    /// and no remote source holds it, or the mapped storage error.
    async fn make_reader(
        &self,
        config: ReaderConfig,
        deadline: Option<Instant>,
    ) -> ProxyResult<TranslatingReader>;

    /// Finds the first record at or after a timestamp.
    ///
    /// # Errors
    ///
    /// Returns the mapped storage error, or `RequestTimedOut` if the log was
    /// truncated during the lookup.
    async fn timequery(&self, query: TimeQuery) -> ProxyResult<Option<TimeQueryResult>>;

    /// Returns a metadata snapshot.
    ///
    /// # Errors
    ///
    /// Returns `NotLeaderForPartition` if replica progress is unknown here.
    fn get_partition_info(&self) -> ProxyResult<PartitionInfo>;
}
