//! In-memory replication layer for deterministic testing.
//!
//! [`SimulatedClusterPartition`] keeps a single replica's log in memory and
//! lets tests drive everything consensus would normally decide: leadership,
//! commit progress, truncations, and failures.

use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use async_trait::async_trait;
use futures::future::{self, FutureExt};
use kestrel_core::{
    BatchType, KafkaOffset, NodeId, Ntp, RawOffset, Record, RecordBatch, TermId,
};
use tokio::sync::oneshot;
use tokio::time::Instant;
use tracing::debug;

use crate::cluster::{
    Acks, ClusterPartition, FollowerState, LogReader, LogReaderConfig, RawLso,
    RawReplicateStages, RawTimeQuery, RawTimeQueryResult, RawTxRange, ReplicateOptions,
};
use crate::error::{ClusterError, ClusterResult};
use crate::translator::OffsetTranslatorState;

// -----------------------------------------------------------------------------
// Fault Configuration
// -----------------------------------------------------------------------------

/// Configuration for fault injection in the simulated replication layer.
///
/// `force_*` errors are one-shot: the next matching call returns the error
/// and clears it.
#[derive(Debug, Clone, Default)]
pub struct ClusterFaultConfig {
    /// Next `sync_effective_start` fails with this error.
    pub force_sync_error: Option<ClusterError>,
    /// Next `linearizable_barrier` fails with this error.
    pub force_barrier_error: Option<ClusterError>,
    /// Next `prefix_truncate` fails with this error.
    pub force_truncate_error: Option<ClusterError>,
    /// Next append fails to enqueue with this error.
    pub force_replicate_error: Option<ClusterError>,
    /// Next reader or transaction query fails with this error.
    pub force_read_error: Option<ClusterError>,
    /// Time the linearizable refresh takes before answering.
    pub sync_latency: Option<Duration>,
    /// Time each local read or transaction query takes.
    pub read_latency: Option<Duration>,
}

impl ClusterFaultConfig {
    /// Creates a fault config with no faults.
    #[must_use]
    pub fn none() -> Self {
        Self::default()
    }

    /// Sets the linearizable refresh latency.
    #[must_use]
    pub const fn with_sync_latency(mut self, latency: Duration) -> Self {
        self.sync_latency = Some(latency);
        self
    }

    /// Sets the local read latency.
    #[must_use]
    pub const fn with_read_latency(mut self, latency: Duration) -> Self {
        self.read_latency = Some(latency);
        self
    }
}

// -----------------------------------------------------------------------------
// State
// -----------------------------------------------------------------------------

/// An append waiting for the commit index to reach it.
#[derive(Debug)]
struct PendingCommit {
    last: RawOffset,
    tx: oneshot::Sender<ClusterResult<RawOffset>>,
}

#[derive(Debug)]
struct ClusterState {
    term: TermId,
    leader: bool,
    elected_leader: bool,
    leader_id: Option<NodeId>,
    read_replica: bool,
    remote_fetch: bool,
    /// Retained batches, contiguous in raw offsets.
    batches: Vec<RecordBatch>,
    start: RawOffset,
    next: RawOffset,
    high_watermark: RawOffset,
    lso_override: Option<RawLso>,
    /// Control entries discarded by prefix truncation.
    base_delta: i64,
    generation: u64,
    aborted: Vec<RawTxRange>,
    followers: Vec<FollowerState>,
    hold_commits: bool,
    pending: Vec<PendingCommit>,
}

impl ClusterState {
    fn new(node_id: NodeId) -> Self {
        Self {
            term: TermId::new(1),
            leader: true,
            elected_leader: true,
            leader_id: Some(node_id),
            read_replica: false,
            remote_fetch: false,
            batches: Vec::new(),
            start: RawOffset::new(0),
            next: RawOffset::new(0),
            high_watermark: RawOffset::new(0),
            lso_override: None,
            base_delta: 0,
            generation: 0,
            aborted: Vec::new(),
            followers: Vec::new(),
            hold_commits: false,
            pending: Vec::new(),
        }
    }

    /// Appends a batch at the log end and returns its last raw offset.
    fn append(&mut self, mut batch: RecordBatch) -> RawOffset {
        // Precondition: batch must not be empty.
        debug_assert!(!batch.is_empty());

        batch.base_offset = self.next;
        batch.term = self.term;
        let last = batch.last_offset();
        self.next = last.next();
        self.batches.push(batch);

        if !self.hold_commits {
            self.high_watermark = self.next;
        }

        // Postcondition: log end follows the appended batch.
        debug_assert!(self.next > last);
        last
    }

    /// Advances the commit index to the log end.
    fn commit_all(&mut self) {
        self.high_watermark = self.next;
        for pending in self.pending.drain(..) {
            // The waiter may have given up; that is fine.
            let _ = pending.tx.send(Ok(pending.last));
        }
    }

    fn fail_pending(&mut self, err: &ClusterError) {
        for pending in self.pending.drain(..) {
            let _ = pending.tx.send(Err(err.clone()));
        }
    }

    #[allow(clippy::cast_possible_wrap)] // Record counts are bounded far below i64::MAX.
    fn translator(&self) -> OffsetTranslatorState {
        let gaps = self
            .batches
            .iter()
            .filter(|batch| !batch.batch_type.is_data())
            .flat_map(|batch| {
                (0..batch.len() as i64).map(move |index| batch.base_offset.saturating_add(index))
            })
            .collect();
        OffsetTranslatorState::new(self.generation, self.start, self.base_delta, gaps)
    }

    fn term_of(&self, offset: RawOffset) -> Option<TermId> {
        self.batches
            .iter()
            .find(|batch| batch.contains(offset))
            .map(|batch| batch.term)
    }

    fn term_last_offset(&self, term: TermId) -> Option<RawOffset> {
        self.batches
            .iter()
            .take_while(|batch| batch.term <= term)
            .last()
            .map(RecordBatch::last_offset)
    }

    /// Drops everything before `offset`. Does not change retained mappings.
    #[allow(clippy::cast_possible_wrap)]
    fn prefix_truncate(&mut self, offset: RawOffset) {
        let offset = offset.min(self.next);
        if offset <= self.start {
            return;
        }

        let mut removed_control = 0i64;
        let mut retained = Vec::with_capacity(self.batches.len());
        // Bounded loop: one pass over retained batches.
        for mut batch in self.batches.drain(..) {
            if batch.last_offset() < offset {
                if !batch.batch_type.is_data() {
                    removed_control += batch.len() as i64;
                }
                continue;
            }
            if batch.base_offset < offset {
                let dropped = usize::try_from(offset.get() - batch.base_offset.get()).unwrap_or(0);
                if !batch.batch_type.is_data() {
                    removed_control += dropped as i64;
                }
                batch.records.drain(..dropped);
                batch.base_offset = offset;
            }
            retained.push(batch);
        }

        self.batches = retained;
        self.start = offset;
        self.base_delta += removed_control;
        self.aborted.retain(|tx| tx.last >= offset);

        // Postcondition: every retained batch starts at or after start.
        debug_assert!(self.batches.iter().all(|batch| batch.base_offset >= self.start));
    }

    /// Drops everything at or after `offset` and bumps the generation.
    fn truncate_suffix(&mut self, offset: RawOffset) {
        if offset >= self.next {
            return;
        }
        let offset = offset.max(self.start);

        self.batches.retain(|batch| batch.base_offset < offset);
        if let Some(last) = self.batches.last_mut() {
            if last.last_offset() >= offset {
                let keep = usize::try_from(offset.get() - last.base_offset.get()).unwrap_or(0);
                last.records.truncate(keep);
            }
        }
        self.next = offset;
        self.high_watermark = self.high_watermark.min(offset);
        self.aborted.retain(|tx| tx.first < offset);
        self.generation += 1;

        // Postcondition: nothing retained at or past the new end.
        debug_assert!(self.batches.iter().all(|batch| batch.last_offset() < self.next));
    }
}

// -----------------------------------------------------------------------------
// SimulatedClusterPartition
// -----------------------------------------------------------------------------

/// In-memory replica for deterministic testing.
///
/// A new replica leads term 1 over an empty log. Appends commit immediately
/// unless [`hold_commits`](Self::hold_commits) is in effect.
///
/// # Cloning
///
/// Clones share the same log, leadership state, and fault configuration.
#[derive(Debug, Clone)]
pub struct SimulatedClusterPartition {
    ntp: Ntp,
    node_id: NodeId,
    state: Arc<Mutex<ClusterState>>,
    fault_config: Arc<Mutex<ClusterFaultConfig>>,
}

impl SimulatedClusterPartition {
    /// Creates an empty replica that leads term 1.
    #[must_use]
    pub fn new(ntp: Ntp, node_id: NodeId) -> Self {
        Self::with_faults(ntp, node_id, ClusterFaultConfig::default())
    }

    /// Creates an empty replica with fault injection enabled.
    #[must_use]
    pub fn with_faults(ntp: Ntp, node_id: NodeId, config: ClusterFaultConfig) -> Self {
        Self {
            ntp,
            node_id,
            state: Arc::new(Mutex::new(ClusterState::new(node_id))),
            fault_config: Arc::new(Mutex::new(config)),
        }
    }

    fn state(&self) -> MutexGuard<'_, ClusterState> {
        self.state.lock().expect("cluster state lock poisoned")
    }

    /// Returns the fault configuration for modification.
    ///
    /// # Panics
    ///
    /// Panics if the mutex is poisoned.
    pub fn fault_config(&self) -> MutexGuard<'_, ClusterFaultConfig> {
        self.fault_config.lock().expect("fault config lock poisoned")
    }

    /// Takes a one-shot forced error, if armed.
    fn take_fault(
        &self,
        select: fn(&mut ClusterFaultConfig) -> &mut Option<ClusterError>,
    ) -> ClusterResult<()> {
        let forced = select(&mut self.fault_config()).take();
        forced.map_or(Ok(()), |err| {
            debug!(partition = %self.ntp, error = %err, "simulated cluster fault");
            Err(err)
        })
    }

    async fn read_delay(&self) {
        let latency = self.fault_config().read_latency;
        if let Some(latency) = latency {
            tokio::time::sleep(latency).await;
        }
    }

    // ---- Log setup ----

    /// Appends a batch regardless of leadership. Returns its last raw offset.
    ///
    /// # Panics
    ///
    /// Panics if the mutex is poisoned.
    pub fn append(&self, batch: RecordBatch) -> RawOffset {
        self.state().append(batch)
    }

    /// Appends a data batch of `count` records. Returns its last raw offset.
    pub fn append_data(&self, count: usize) -> RawOffset {
        let records = (0..count).map(|index| Record::new(format!("value-{index}"))).collect();
        self.append(RecordBatch::data(records))
    }

    /// Appends a control batch of `count` entries. Returns its last raw offset.
    pub fn append_control(&self, batch_type: BatchType, count: usize) -> RawOffset {
        self.append(RecordBatch::control(batch_type, count))
    }

    /// Records an aborted transaction in the local transaction state.
    ///
    /// # Panics
    ///
    /// Panics if the mutex is poisoned.
    pub fn add_aborted(&self, tx: RawTxRange) {
        let mut state = self.state();
        state.aborted.push(tx);
        state.aborted.sort_by_key(|tx| tx.first);
    }

    /// Drops every entry at or after `offset`, as a new leader would.
    ///
    /// Bumps the translator generation.
    pub fn truncate_suffix(&self, offset: RawOffset) {
        let mut state = self.state();
        state.truncate_suffix(offset);
        debug!(
            partition = %self.ntp,
            offset = %offset,
            generation = state.generation,
            "simulated suffix truncation"
        );
    }

    /// Returns the live translator generation.
    pub fn generation(&self) -> u64 {
        self.state().generation
    }

    // ---- Commit control ----

    /// Stops advancing the commit index until [`release_commits`](Self::release_commits).
    pub fn hold_commits(&self) {
        self.state().hold_commits = true;
    }

    /// Commits everything appended so far and resumes automatic commits.
    pub fn release_commits(&self) {
        let mut state = self.state();
        state.hold_commits = false;
        state.commit_all();
    }

    /// Overrides the last stable offset. `None` restores the default, which
    /// follows the high watermark.
    pub fn set_last_stable_offset(&self, lso: Option<RawLso>) {
        self.state().lso_override = lso;
    }

    // ---- Leadership and mode ----

    /// Makes this replica leader of `term`.
    pub fn become_leader(&self, term: TermId) {
        let mut state = self.state();
        state.term = term;
        state.leader = true;
        state.elected_leader = true;
        state.leader_id = Some(self.node_id);
    }

    /// Makes this replica a follower of `leader` in `term`.
    ///
    /// Appends still waiting for commit fail with `NotLeader`.
    pub fn become_follower(&self, term: TermId, leader: Option<NodeId>) {
        let mut state = self.state();
        state.term = term;
        state.leader = false;
        state.elected_leader = false;
        state.leader_id = leader;
        state.fail_pending(&ClusterError::NotLeader);
    }

    /// Marks an elected leader that has not yet committed in its term.
    pub fn set_leader_ready(&self, ready: bool) {
        self.state().leader = ready;
    }

    /// Enables or disables read-replica mode.
    pub fn set_read_replica(&self, enabled: bool) {
        self.state().read_replica = enabled;
    }

    /// Enables or disables remote fetch.
    pub fn set_remote_fetch(&self, enabled: bool) {
        self.state().remote_fetch = enabled;
    }

    /// Sets follower progress reported to the leader.
    pub fn set_followers(&self, followers: Vec<FollowerState>) {
        self.state().followers = followers;
    }
}

#[async_trait]
impl ClusterPartition for SimulatedClusterPartition {
    fn ntp(&self) -> Ntp {
        self.ntp
    }

    fn node_id(&self) -> NodeId {
        self.node_id
    }

    fn leader_id(&self) -> Option<NodeId> {
        self.state().leader_id
    }

    fn translator(&self) -> Arc<OffsetTranslatorState> {
        Arc::new(self.state().translator())
    }

    fn is_read_replica_mode_enabled(&self) -> bool {
        self.state().read_replica
    }

    fn is_remote_fetch_enabled(&self) -> bool {
        self.state().remote_fetch
    }

    fn raft_start_offset(&self) -> RawOffset {
        self.state().start
    }

    async fn sync_effective_start(&self, timeout: Duration) -> ClusterResult<RawOffset> {
        self.take_fault(|config| &mut config.force_sync_error)?;

        let latency = self.fault_config().sync_latency;
        if let Some(latency) = latency {
            if latency > timeout {
                tokio::time::sleep(timeout).await;
                return Err(ClusterError::Timeout {
                    operation: "sync_effective_start",
                });
            }
            tokio::time::sleep(latency).await;
        }

        let state = self.state();
        if !state.leader {
            return Err(ClusterError::NotLeader);
        }
        Ok(state.start)
    }

    fn high_watermark(&self) -> RawOffset {
        self.state().high_watermark
    }

    fn leader_high_watermark(&self) -> RawOffset {
        self.state().high_watermark
    }

    fn dirty_offset(&self) -> RawOffset {
        self.state().next.prev()
    }

    fn last_stable_offset(&self) -> RawLso {
        let state = self.state();
        state
            .lso_override
            .unwrap_or(RawLso::Offset(state.high_watermark))
    }

    fn is_leader(&self) -> bool {
        self.state().leader
    }

    fn is_elected_leader(&self) -> bool {
        self.state().elected_leader
    }

    fn term(&self) -> TermId {
        self.state().term
    }

    fn term_of(&self, offset: RawOffset) -> Option<TermId> {
        self.state().term_of(offset)
    }

    fn term_last_offset(&self, term: TermId) -> Option<RawOffset> {
        self.state().term_last_offset(term)
    }

    fn follower_states(&self) -> ClusterResult<Vec<FollowerState>> {
        let state = self.state();
        if !state.leader {
            return Err(ClusterError::NotLeader);
        }
        Ok(state.followers.clone())
    }

    async fn linearizable_barrier(&self) -> ClusterResult<RawOffset> {
        self.take_fault(|config| &mut config.force_barrier_error)?;
        tokio::task::yield_now().await;

        let state = self.state();
        if !state.leader {
            return Err(ClusterError::NotLeader);
        }
        Ok(state.high_watermark)
    }

    async fn prefix_truncate(
        &self,
        offset: RawOffset,
        kafka_offset: KafkaOffset,
        deadline: Instant,
    ) -> ClusterResult<()> {
        self.take_fault(|config| &mut config.force_truncate_error)?;
        tokio::task::yield_now().await;

        if Instant::now() >= deadline {
            return Err(ClusterError::Timeout {
                operation: "prefix_truncate",
            });
        }

        let mut state = self.state();
        if !state.leader {
            return Err(ClusterError::NotLeader);
        }
        state.prefix_truncate(offset);
        debug!(
            partition = %self.ntp,
            raw_offset = %offset,
            kafka_offset = %kafka_offset,
            start = %state.start,
            "simulated prefix truncation"
        );
        Ok(())
    }

    async fn replicate(
        &self,
        batch: RecordBatch,
        options: ReplicateOptions,
    ) -> ClusterResult<RawOffset> {
        let stages = self.replicate_in_stages(batch, options);
        stages.enqueued.await?;
        match options.timeout {
            Some(timeout) => tokio::time::timeout(timeout, stages.finished)
                .await
                .map_err(|_| ClusterError::Timeout {
                    operation: "replicate",
                })?,
            None => stages.finished.await,
        }
    }

    fn replicate_in_stages(
        &self,
        batch: RecordBatch,
        options: ReplicateOptions,
    ) -> RawReplicateStages {
        let failed = |err: ClusterError| RawReplicateStages {
            enqueued: future::ready(Err(err.clone())).boxed(),
            finished: future::ready(Err(err)).boxed(),
        };

        if let Err(err) = self.take_fault(|config| &mut config.force_replicate_error) {
            return failed(err);
        }

        let mut state = self.state();
        if !state.leader {
            return failed(ClusterError::NotLeader);
        }

        let last = state.append(batch);
        if !state.hold_commits || options.acks != Acks::All {
            return RawReplicateStages {
                enqueued: future::ready(Ok(())).boxed(),
                finished: future::ready(Ok(last)).boxed(),
            };
        }

        let (tx, rx) = oneshot::channel();
        state.pending.push(PendingCommit { last, tx });
        RawReplicateStages {
            enqueued: future::ready(Ok(())).boxed(),
            finished: async move { rx.await.map_err(|_| ClusterError::ShuttingDown)? }.boxed(),
        }
    }

    async fn make_reader(&self, config: LogReaderConfig) -> ClusterResult<Box<dyn LogReader>> {
        self.take_fault(|config| &mut config.force_read_error)?;
        Ok(Box::new(SimulatedLogReader {
            partition: self.clone(),
            cursor: config.start,
            config,
        }))
    }

    async fn timequery(&self, query: RawTimeQuery) -> ClusterResult<Option<RawTimeQueryResult>> {
        self.read_delay().await;

        let state = self.state();
        for batch in state.batches.iter().filter(|batch| batch.batch_type.is_data()) {
            for (index, record) in batch.records.iter().enumerate() {
                #[allow(clippy::cast_possible_wrap)]
                let offset = batch.base_offset.saturating_add(index as i64);
                if offset > query.max_offset {
                    return Ok(None);
                }
                if record.timestamp >= query.time {
                    return Ok(Some(RawTimeQueryResult {
                        offset,
                        time: record.timestamp,
                    }));
                }
            }
        }
        Ok(None)
    }

    async fn aborted_transactions(
        &self,
        from: RawOffset,
        to: RawOffset,
    ) -> ClusterResult<Vec<RawTxRange>> {
        self.take_fault(|config| &mut config.force_read_error)?;
        self.read_delay().await;

        Ok(self
            .state()
            .aborted
            .iter()
            .filter(|tx| tx.first <= to && tx.last >= from)
            .copied()
            .collect())
    }
}

// -----------------------------------------------------------------------------
// SimulatedLogReader
// -----------------------------------------------------------------------------

/// Reader over a simulated replica's log.
///
/// Reads the live log lazily, so truncations after the reader was opened
/// are visible to it.
struct SimulatedLogReader {
    partition: SimulatedClusterPartition,
    cursor: RawOffset,
    config: LogReaderConfig,
}

#[async_trait]
impl LogReader for SimulatedLogReader {
    async fn next_batch(&mut self) -> ClusterResult<Option<RecordBatch>> {
        self.partition.read_delay().await;
        tokio::task::yield_now().await;

        let state = self.partition.state();
        let next = state.batches.iter().find(|batch| {
            batch.last_offset() >= self.cursor
                && self
                    .config
                    .type_filter
                    .map_or(true, |filter| batch.batch_type == filter)
        });

        match next {
            Some(batch) if batch.base_offset <= self.config.max => {
                self.cursor = batch.last_offset().next();
                Ok(Some(batch.clone()))
            }
            _ => Ok(None),
        }
    }
}

#[cfg(test)]
mod tests {
    use kestrel_core::{PartitionId, TopicId};

    use super::*;

    fn partition() -> SimulatedClusterPartition {
        SimulatedClusterPartition::new(
            Ntp::new(TopicId::new(1), PartitionId::new(0)),
            NodeId::new(1),
        )
    }

    #[test]
    fn test_append_assigns_raw_offsets() {
        let cluster = partition();
        assert_eq!(cluster.dirty_offset(), RawOffset::none());

        assert_eq!(cluster.append_control(BatchType::RaftConfiguration, 1), RawOffset::new(0));
        assert_eq!(cluster.append_data(3), RawOffset::new(3));
        assert_eq!(cluster.dirty_offset(), RawOffset::new(3));
        assert_eq!(cluster.high_watermark(), RawOffset::new(4));
    }

    #[test]
    fn test_translator_tracks_control_batches() {
        let cluster = partition();
        cluster.append_control(BatchType::RaftConfiguration, 1);
        cluster.append_data(3);
        cluster.append_control(BatchType::TxControl, 2);
        cluster.append_data(1);

        let translator = cluster.translator();
        assert_eq!(
            translator.gaps(),
            &[RawOffset::new(0), RawOffset::new(4), RawOffset::new(5)]
        );
        assert_eq!(translator.from_log_offset(RawOffset::new(6)), KafkaOffset::new(3));
    }

    #[test]
    fn test_prefix_truncate_keeps_mapping() {
        let cluster = partition();
        cluster.append_control(BatchType::RaftConfiguration, 1);
        cluster.append_data(5);
        let before = cluster.translator();

        cluster.state().prefix_truncate(RawOffset::new(3));

        let after = cluster.translator();
        assert_eq!(after.generation(), before.generation());
        assert_eq!(cluster.raft_start_offset(), RawOffset::new(3));
        for raw in 3..6 {
            assert_eq!(
                after.from_log_offset(RawOffset::new(raw)),
                before.from_log_offset(RawOffset::new(raw))
            );
        }
    }

    #[test]
    fn test_suffix_truncation_bumps_generation() {
        let cluster = partition();
        cluster.append_data(5);
        let generation = cluster.generation();

        cluster.truncate_suffix(RawOffset::new(2));
        assert_eq!(cluster.generation(), generation + 1);
        assert_eq!(cluster.dirty_offset(), RawOffset::new(1));
        assert_eq!(cluster.high_watermark(), RawOffset::new(2));

        // Truncating past the end changes nothing.
        cluster.truncate_suffix(RawOffset::new(10));
        assert_eq!(cluster.generation(), generation + 1);
    }

    #[test]
    fn test_term_index() {
        let cluster = partition();
        cluster.append_data(3);
        cluster.become_leader(TermId::new(3));
        cluster.append_data(2);

        assert_eq!(cluster.term_of(RawOffset::new(4)), Some(TermId::new(3)));
        assert_eq!(cluster.term_last_offset(TermId::new(1)), Some(RawOffset::new(2)));
        assert_eq!(cluster.term_last_offset(TermId::new(2)), Some(RawOffset::new(2)));
        assert_eq!(cluster.term_last_offset(TermId::new(7)), Some(RawOffset::new(4)));
        assert_eq!(cluster.term_last_offset(TermId::new(0)), None);
    }

    #[tokio::test]
    async fn test_held_commit_completes_on_release() {
        let cluster = partition();
        cluster.hold_commits();

        let stages = cluster.replicate_in_stages(
            RecordBatch::data(vec![Record::new("a")]),
            ReplicateOptions::default(),
        );
        stages.enqueued.await.unwrap();
        assert_eq!(cluster.high_watermark(), RawOffset::new(0));

        cluster.release_commits();
        assert_eq!(stages.finished.await.unwrap(), RawOffset::new(0));
        assert_eq!(cluster.high_watermark(), RawOffset::new(1));
    }

    #[tokio::test]
    async fn test_step_down_fails_pending_commits() {
        let cluster = partition();
        cluster.hold_commits();

        let stages = cluster.replicate_in_stages(
            RecordBatch::data(vec![Record::new("a")]),
            ReplicateOptions::default(),
        );
        cluster.become_follower(TermId::new(2), Some(NodeId::new(2)));
        assert_eq!(stages.finished.await, Err(ClusterError::NotLeader));
    }

    #[tokio::test]
    async fn test_reader_filters_by_range() {
        let cluster = partition();
        cluster.append_data(2);
        cluster.append_control(BatchType::TxControl, 1);
        cluster.append_data(2);

        let mut reader = cluster
            .make_reader(LogReaderConfig {
                start: RawOffset::new(1),
                max: RawOffset::new(2),
                type_filter: None,
            })
            .await
            .unwrap();

        let first = reader.next_batch().await.unwrap().unwrap();
        assert_eq!(first.base_offset, RawOffset::new(0));
        let second = reader.next_batch().await.unwrap().unwrap();
        assert_eq!(second.batch_type, BatchType::TxControl);
        assert!(reader.next_batch().await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_forced_sync_error_is_one_shot() {
        let cluster = partition();
        cluster.fault_config().force_sync_error = Some(ClusterError::ShuttingDown);

        let result = cluster.sync_effective_start(Duration::from_secs(1)).await;
        assert_eq!(result, Err(ClusterError::ShuttingDown));

        let result = cluster.sync_effective_start(Duration::from_secs(1)).await;
        assert_eq!(result, Ok(RawOffset::new(0)));
    }
}
