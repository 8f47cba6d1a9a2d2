//! Client-offset reader over the local log or the remote tier.
//!
//! A [`TranslatingReader`] reads from one source. A local reader wraps a raw
//! [`LogReader`] and the translator snapshot its range was computed with.
//! Control batches are dropped and data batches come out re-based onto
//! client offsets. The read is capped at the dirty offset observed before the
//! snapshot was taken, so batches appended later are never translated with a
//! snapshot that does not describe them. If the log is truncated underneath
//! the reader, the snapshot no longer describes it and the reader fails
//! instead of emitting mistranslated offsets.
//!
//! A remote reader pulls uploaded batches, which are already in client
//! offsets, until it reaches the end of the remote range.

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use futures::stream::{self, Stream};
use kestrel_core::{BatchType, KafkaOffset, RawOffset, Record, RecordBatch, TermId, Timestamp};
use kestrel_tier::{RemoteBatch, RemoteTier};
use tokio::time::Instant;
use tracing::{debug, warn};

use crate::cluster::{ClusterPartition, LogReader};
use crate::error::{ErrorCode, ProxyResult};
use crate::translator::OffsetTranslatorState;

/// Read request in client offsets.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ReaderConfig {
    /// First client offset to read.
    pub start: KafkaOffset,
    /// Last client offset to read (inclusive).
    pub max: KafkaOffset,
    /// Stop once this many bytes have been returned. Zero uses the
    /// configured default.
    pub max_bytes: usize,
    /// Only return batches of this type.
    pub type_filter: Option<BatchType>,
}

impl ReaderConfig {
    /// Creates a config reading `[start, max]` with the default byte budget.
    #[must_use]
    pub const fn new(start: KafkaOffset, max: KafkaOffset) -> Self {
        Self {
            start,
            max,
            max_bytes: 0,
            type_filter: None,
        }
    }

    /// Sets the byte budget.
    #[must_use]
    pub const fn with_max_bytes(mut self, max_bytes: usize) -> Self {
        self.max_bytes = max_bytes;
        self
    }
}

/// A data batch re-based onto client offsets.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TranslatedBatch {
    /// Client offset of the first record.
    pub base_offset: KafkaOffset,
    /// Term the batch was written under.
    pub term: TermId,
    /// Maximum timestamp in the batch.
    pub max_timestamp: Timestamp,
    /// Producer that wrote the batch, for transactional data.
    pub producer_id: Option<i64>,
    /// Records in this batch.
    pub records: Vec<Record>,
}

impl TranslatedBatch {
    fn new(base_offset: KafkaOffset, batch: RecordBatch) -> Self {
        Self {
            base_offset,
            term: batch.term,
            max_timestamp: batch.max_timestamp,
            producer_id: batch.producer_id,
            records: batch.records,
        }
    }

    fn from_remote(batch: RemoteBatch) -> Self {
        Self {
            base_offset: batch.base_offset,
            term: batch.epoch.as_term().unwrap_or_default(),
            max_timestamp: batch.max_timestamp,
            producer_id: batch.producer_id,
            records: batch.records,
        }
    }

    /// Returns the client offset of the last record.
    #[must_use]
    #[allow(clippy::cast_possible_wrap)]
    pub fn last_offset(&self) -> KafkaOffset {
        self.base_offset
            .saturating_add((self.records.len() as i64 - 1).max(0))
    }

    /// Returns the number of records.
    #[must_use]
    pub fn len(&self) -> usize {
        self.records.len()
    }

    /// Returns true if the batch holds no records.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// Returns the approximate size in bytes.
    #[must_use]
    pub fn size(&self) -> usize {
        self.records.iter().map(Record::size).sum()
    }
}

/// Where a [`TranslatingReader`] pulls batches from.
pub(crate) enum ReadSource {
    /// Local log, translated with the reader's snapshot.
    Local {
        inner: Box<dyn LogReader>,
        /// Last raw offset the snapshot is known to describe.
        raw_limit: RawOffset,
    },
    /// Remote tier, already in client offsets.
    Remote {
        tier: Arc<dyn RemoteTier>,
        next: KafkaOffset,
        query_timeout: Duration,
    },
}

/// Lazy, finite, forward-only reader in client offsets.
pub struct TranslatingReader {
    cluster: Arc<dyn ClusterPartition>,
    /// `None` for an empty range.
    source: Option<ReadSource>,
    translator: Arc<OffsetTranslatorState>,
    max: KafkaOffset,
    max_bytes: usize,
    bytes_read: usize,
    deadline: Option<Instant>,
    done: bool,
}

impl std::fmt::Debug for TranslatingReader {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TranslatingReader")
            .field("generation", &self.translator.generation())
            .field("remote", &matches!(self.source, Some(ReadSource::Remote { .. })))
            .field("max", &self.max)
            .field("bytes_read", &self.bytes_read)
            .field("done", &self.done)
            .finish_non_exhaustive()
    }
}

impl TranslatingReader {
    pub(crate) fn new(
        cluster: Arc<dyn ClusterPartition>,
        source: Option<ReadSource>,
        translator: Arc<OffsetTranslatorState>,
        max: KafkaOffset,
        max_bytes: usize,
        deadline: Option<Instant>,
    ) -> Self {
        // Precondition: a zero budget is resolved by the caller.
        debug_assert!(max_bytes > 0);

        let done = source.is_none();
        Self {
            cluster,
            source,
            translator,
            max,
            max_bytes,
            bytes_read: 0,
            deadline,
            done,
        }
    }

    /// Returns the translator snapshot this reader translates with.
    ///
    /// Aborted transaction lookups for the same fetch should use it too.
    #[must_use]
    pub fn translator(&self) -> Arc<OffsetTranslatorState> {
        Arc::clone(&self.translator)
    }

    /// Returns true if this reader is served by the remote tier.
    #[must_use]
    pub const fn is_remote(&self) -> bool {
        matches!(self.source, Some(ReadSource::Remote { .. }))
    }

    /// Returns the next data batch, or `None` once the range or byte budget
    /// is exhausted.
    ///
    /// # Errors
    ///
    /// Returns `RequestTimedOut` if the deadline passed or the log was
    /// truncated since the reader was created, and `OffsetOutOfRange` if
    /// remote retention overtook a remote reader. Storage errors are mapped.
    /// The reader yields nothing after an error.
    pub async fn next_batch(&mut self) -> ProxyResult<Option<TranslatedBatch>> {
        if self.done {
            return Ok(None);
        }
        let result = self.read_next().await;
        if !matches!(result, Ok(Some(_))) {
            self.done = true;
        }
        result
    }

    async fn read_next(&mut self) -> ProxyResult<Option<TranslatedBatch>> {
        let batch = match &mut self.source {
            None => None,
            Some(ReadSource::Local { inner, raw_limit }) => {
                read_local(
                    inner.as_mut(),
                    *raw_limit,
                    self.cluster.as_ref(),
                    &self.translator,
                    self.deadline,
                )
                .await?
            }
            Some(ReadSource::Remote {
                tier,
                next,
                query_timeout,
            }) => read_remote(tier.as_ref(), next, *query_timeout, self.deadline).await?,
        };

        let Some(translated) = batch.filter(|batch| batch.base_offset <= self.max) else {
            return Ok(None);
        };
        self.bytes_read = self.bytes_read.saturating_add(translated.size());
        if self.bytes_read >= self.max_bytes {
            self.done = true;
        }
        Ok(Some(translated))
    }

    /// Converts the reader into a stream of batches.
    ///
    /// The stream ends after the first error.
    pub fn into_stream(self) -> impl Stream<Item = ProxyResult<TranslatedBatch>> + Send {
        stream::unfold(Some(self), |state| async move {
            let mut reader = state?;
            match reader.next_batch().await {
                Ok(Some(batch)) => Some((Ok(batch), Some(reader))),
                Ok(None) => None,
                Err(err) => Some((Err(err), None)),
            }
        })
    }
}

async fn before_deadline<T>(
    deadline: Option<Instant>,
    future: impl Future<Output = T>,
) -> ProxyResult<T> {
    match deadline {
        Some(deadline) => tokio::time::timeout_at(deadline, future)
            .await
            .map_err(|_| ErrorCode::RequestTimedOut),
        None => Ok(future.await),
    }
}

/// Returns the next data batch from the local log, translated.
async fn read_local(
    inner: &mut dyn LogReader,
    raw_limit: RawOffset,
    cluster: &dyn ClusterPartition,
    translator: &OffsetTranslatorState,
    deadline: Option<Instant>,
) -> ProxyResult<Option<TranslatedBatch>> {
    // Bounded loop: the inner reader covers a finite raw range.
    loop {
        let next = before_deadline(deadline, inner.next_batch()).await??;

        let live = cluster.translator().generation();
        if live != translator.generation() {
            warn!(
                partition = %cluster.ntp(),
                snapshot = translator.generation(),
                live,
                "log truncated under reader"
            );
            return Err(ErrorCode::RequestTimedOut);
        }

        let Some(batch) = next else {
            return Ok(None);
        };
        if batch.base_offset > raw_limit {
            debug!(
                partition = %cluster.ntp(),
                base_offset = %batch.base_offset,
                raw_limit = %raw_limit,
                "reader reached entries appended after it was opened"
            );
            return Ok(None);
        }
        if !batch.batch_type.is_data() {
            continue;
        }

        let base_offset = translator.from_log_offset(batch.base_offset);
        return Ok(Some(TranslatedBatch::new(base_offset, batch)));
    }
}

/// Returns the next uploaded batch from the remote tier.
async fn read_remote(
    tier: &dyn RemoteTier,
    next: &mut KafkaOffset,
    query_timeout: Duration,
    deadline: Option<Instant>,
) -> ProxyResult<Option<TranslatedBatch>> {
    let Some(range) = tier.offset_range() else {
        return Ok(None);
    };
    if *next < range.start {
        warn!(offset = %next, remote_start = %range.start, "remote retention overtook reader");
        return Err(ErrorCode::OffsetOutOfRange);
    }
    if *next >= range.next {
        return Ok(None);
    }

    let read = tokio::time::timeout(query_timeout, tier.read_batch(*next));
    let batch = before_deadline(deadline, read)
        .await?
        .map_err(|_| ErrorCode::RequestTimedOut)??;

    let Some(batch) = batch else {
        return Ok(None);
    };
    // Postcondition: the tier returned the batch holding `next` or a later one.
    debug_assert!(batch.last_offset() >= *next);
    *next = batch.last_offset().next();
    Ok(Some(TranslatedBatch::from_remote(batch)))
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use futures::StreamExt;
    use kestrel_core::{LeaderEpoch, NodeId, Ntp, PartitionId, TopicId};
    use kestrel_tier::{RemoteSegment, SimulatedRemoteTier};

    use super::*;
    use crate::cluster::LogReaderConfig;
    use crate::simulated::{ClusterFaultConfig, SimulatedClusterPartition};

    fn cluster() -> SimulatedClusterPartition {
        SimulatedClusterPartition::new(
            Ntp::new(TopicId::new(1), PartitionId::new(0)),
            NodeId::new(1),
        )
    }

    async fn open(
        cluster: &SimulatedClusterPartition,
        start: i64,
        max: i64,
        max_bytes: usize,
    ) -> TranslatingReader {
        let raw_limit = cluster.dirty_offset();
        let translator = cluster.translator();
        let inner = cluster
            .make_reader(LogReaderConfig {
                start: translator.to_log_offset(KafkaOffset::new(start)),
                max: translator.to_log_offset(KafkaOffset::new(max)),
                type_filter: None,
            })
            .await
            .unwrap();
        TranslatingReader::new(
            Arc::new(cluster.clone()),
            Some(ReadSource::Local { inner, raw_limit }),
            translator,
            KafkaOffset::new(max),
            max_bytes,
            None,
        )
    }

    fn open_remote(
        cluster: &SimulatedClusterPartition,
        tier: &SimulatedRemoteTier,
        start: i64,
        max: i64,
    ) -> TranslatingReader {
        TranslatingReader::new(
            Arc::new(cluster.clone()),
            Some(ReadSource::Remote {
                tier: Arc::new(tier.clone()),
                next: KafkaOffset::new(start),
                query_timeout: Duration::from_secs(1),
            }),
            cluster.translator(),
            KafkaOffset::new(max),
            usize::MAX,
            None,
        )
    }

    fn tier_with_segments() -> SimulatedRemoteTier {
        let tier = SimulatedRemoteTier::new(3);
        for (base, last) in [(0, 9), (10, 19), (20, 29)] {
            tier.add_segment(RemoteSegment::new(
                KafkaOffset::new(base),
                KafkaOffset::new(last),
                LeaderEpoch::new(1),
            ))
            .unwrap();
        }
        tier
    }

    /// Raw: cfg 0, data 1-3, tx 4, data 5-6, cfg 7, data 8-10.
    fn mixed_log() -> SimulatedClusterPartition {
        let cluster = cluster();
        cluster.append_control(BatchType::RaftConfiguration, 1);
        cluster.append_data(3);
        cluster.append_control(BatchType::TxControl, 1);
        cluster.append_data(2);
        cluster.append_control(BatchType::RaftConfiguration, 1);
        cluster.append_data(3);
        cluster
    }

    #[tokio::test]
    async fn test_reader_skips_control_and_rebases() {
        let cluster = mixed_log();
        let mut reader = open(&cluster, 0, 7, usize::MAX).await;

        let mut bases = Vec::new();
        let mut expected_next = KafkaOffset::new(0);
        while let Some(batch) = reader.next_batch().await.unwrap() {
            assert_eq!(batch.base_offset, expected_next);
            expected_next = batch.last_offset().next();
            bases.push(batch.base_offset.get());
        }
        assert_eq!(bases, vec![0, 3, 5]);
        assert!(reader.next_batch().await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_reader_stops_past_max() {
        let cluster = mixed_log();
        let mut reader = open(&cluster, 0, 3, usize::MAX).await;

        assert_eq!(reader.next_batch().await.unwrap().unwrap().base_offset.get(), 0);
        assert_eq!(reader.next_batch().await.unwrap().unwrap().base_offset.get(), 3);
        assert!(reader.next_batch().await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_reader_byte_budget_yields_at_least_one() {
        let cluster = mixed_log();
        let mut reader = open(&cluster, 0, 7, 1).await;

        assert!(reader.next_batch().await.unwrap().is_some());
        assert!(reader.next_batch().await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_reader_fails_after_suffix_truncation() {
        let cluster = mixed_log();
        let mut reader = open(&cluster, 0, 7, usize::MAX).await;
        cluster.truncate_suffix(RawOffset::new(5));

        assert_eq!(reader.next_batch().await, Err(ErrorCode::RequestTimedOut));
        // Nothing more after an error.
        assert_eq!(reader.next_batch().await, Ok(None));
    }

    #[tokio::test]
    async fn test_reader_ignores_entries_appended_after_open() {
        let cluster = cluster();
        cluster.append_data(3);
        let mut reader = open(&cluster, 0, 100, usize::MAX).await;

        assert_eq!(reader.next_batch().await.unwrap().unwrap().base_offset.get(), 0);
        // The snapshot knows nothing about this control entry.
        cluster.append_control(BatchType::TxControl, 1);
        cluster.append_data(2);
        assert_eq!(reader.next_batch().await, Ok(None));

        let mut reader = open(&cluster, 3, 100, usize::MAX).await;
        let batch = reader.next_batch().await.unwrap().unwrap();
        assert_eq!(batch.base_offset.get(), 3);
        assert_eq!(batch.last_offset().get(), 4);
    }

    #[tokio::test]
    async fn test_remote_reader_walks_segments() {
        let cluster = cluster();
        let tier = tier_with_segments();
        let mut reader = open_remote(&cluster, &tier, 5, 100);
        assert!(reader.is_remote());

        let mut bases = Vec::new();
        while let Some(batch) = reader.next_batch().await.unwrap() {
            bases.push(batch.base_offset.get());
        }
        // The first batch holds the requested offset; the read ends with the
        // remote range.
        assert_eq!(bases, vec![0, 10, 20]);
    }

    #[tokio::test]
    async fn test_remote_reader_stops_past_max() {
        let cluster = cluster();
        let tier = tier_with_segments();
        let mut reader = open_remote(&cluster, &tier, 12, 15);

        let batch = reader.next_batch().await.unwrap().unwrap();
        assert_eq!(batch.base_offset.get(), 10);
        assert_eq!(batch.records[2].value, "12");
        assert_eq!(reader.next_batch().await, Ok(None));
    }

    #[tokio::test]
    async fn test_remote_reader_overtaken_by_retention() {
        let cluster = cluster();
        let tier = tier_with_segments();
        let mut reader = open_remote(&cluster, &tier, 0, 100);

        assert!(reader.next_batch().await.unwrap().is_some());
        tier.advance_start(KafkaOffset::new(25));
        assert_eq!(reader.next_batch().await, Err(ErrorCode::OffsetOutOfRange));
        assert_eq!(reader.next_batch().await, Ok(None));
    }

    #[tokio::test]
    async fn test_remote_reader_corruption() {
        let cluster = cluster();
        let tier = tier_with_segments();
        tier.fault_config().force_read_corruption = true;
        let mut reader = open_remote(&cluster, &tier, 0, 100);

        assert_eq!(reader.next_batch().await, Err(ErrorCode::UnknownServerError));
    }

    #[tokio::test(start_paused = true)]
    async fn test_reader_deadline() {
        let cluster = SimulatedClusterPartition::with_faults(
            Ntp::new(TopicId::new(1), PartitionId::new(0)),
            NodeId::new(1),
            ClusterFaultConfig::none().with_read_latency(Duration::from_secs(10)),
        );
        cluster.append_data(2);

        let mut reader = open(&cluster, 0, 1, usize::MAX).await;
        reader.deadline = Some(Instant::now() + Duration::from_secs(1));
        assert_eq!(reader.next_batch().await, Err(ErrorCode::RequestTimedOut));
    }

    #[tokio::test]
    async fn test_reader_as_stream() {
        let cluster = mixed_log();
        let reader = open(&cluster, 3, 7, usize::MAX).await;

        let batches: Vec<_> = reader.into_stream().collect().await;
        let bases: Vec<i64> = batches
            .into_iter()
            .map(|batch| batch.unwrap().base_offset.get())
            .collect();
        assert_eq!(bases, vec![3, 5]);
    }

    #[tokio::test]
    async fn test_empty_reader() {
        let cluster = mixed_log();
        let mut reader = TranslatingReader::new(
            Arc::new(cluster.clone()),
            None,
            cluster.translator(),
            KafkaOffset::new(0),
            1024,
            None,
        );
        assert_eq!(reader.next_batch().await, Ok(None));
    }
}
