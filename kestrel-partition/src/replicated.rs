//! Partition view over a replicated, tiered log.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use futures::future::{self, FutureExt};
use kestrel_core::{KafkaOffset, LeaderEpoch, Ntp, RecordBatch};
use kestrel_tier::{RemoteTier, TxRange};
use tokio::time::Instant;
use tracing::{debug, info, warn};

use crate::aborted;
use crate::cluster::{ClusterPartition, LogReaderConfig, RawTimeQuery, ReplicateOptions};
use crate::config::{ConfigError, PartitionViewConfig};
use crate::epoch;
use crate::error::{ErrorCode, ProxyResult};
use crate::fetch::{self, FetchBounds};
use crate::proxy::{
    PartitionInfo, PartitionProxy, ReplicaInfo, ReplicateStages, TimeQuery, TimeQueryResult,
};
use crate::reader::{ReadSource, ReaderConfig, TranslatingReader};
use crate::reconciler::BoundaryInputs;
use crate::translator::OffsetTranslatorState;

/// Partition view backed by a replication group and a remote tier.
///
/// Holds no offset state of its own: every query captures fresh boundaries
/// and a fresh translator snapshot from its collaborators.
pub struct ReplicatedPartition {
    cluster: Arc<dyn ClusterPartition>,
    tier: Arc<dyn RemoteTier>,
    config: PartitionViewConfig,
}

impl std::fmt::Debug for ReplicatedPartition {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ReplicatedPartition")
            .field("ntp", &self.cluster.ntp())
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}

impl ReplicatedPartition {
    /// Creates a partition view.
    ///
    /// # Errors
    ///
    /// Returns an error if the configuration is invalid.
    pub fn new(
        cluster: Arc<dyn ClusterPartition>,
        tier: Arc<dyn RemoteTier>,
        config: PartitionViewConfig,
    ) -> Result<Self, ConfigError> {
        config.validate()?;
        Ok(Self {
            cluster,
            tier,
            config,
        })
    }

    /// Returns the view configuration.
    #[must_use]
    pub const fn config(&self) -> &PartitionViewConfig {
        &self.config
    }

    fn inputs(&self) -> BoundaryInputs {
        BoundaryInputs::capture(self.cluster.as_ref(), self.tier.as_ref())
    }

    /// Fails if the live translator moved past `translator`.
    fn ensure_generation(&self, translator: &OffsetTranslatorState, operation: &str) -> ProxyResult<()> {
        let live = self.cluster.translator().generation();
        if live != translator.generation() {
            warn!(
                partition = %self.cluster.ntp(),
                operation,
                snapshot = translator.generation(),
                live,
                "log truncated during operation"
            );
            return Err(ErrorCode::RequestTimedOut);
        }
        Ok(())
    }
}

#[async_trait]
impl PartitionProxy for ReplicatedPartition {
    fn ntp(&self) -> Ntp {
        self.cluster.ntp()
    }

    fn translator(&self) -> Arc<OffsetTranslatorState> {
        self.cluster.translator()
    }

    fn start_offset(&self) -> KafkaOffset {
        let translator = self.cluster.translator();
        self.inputs().start_offset(&translator)
    }

    async fn sync_effective_start(&self, timeout: Option<Duration>) -> ProxyResult<KafkaOffset> {
        let timeout = timeout.unwrap_or(self.config.sync_start_timeout);

        // Read replica boundaries never depend on the local log.
        if self.cluster.is_read_replica_mode_enabled() {
            return Ok(self.start_offset());
        }

        let raw_start = tokio::time::timeout(timeout, self.cluster.sync_effective_start(timeout))
            .await
            .map_err(|_| ErrorCode::RequestTimedOut)??;

        let translator = self.cluster.translator();
        let inputs = BoundaryInputs {
            raw_start,
            ..self.inputs()
        };
        Ok(inputs.start_offset(&translator))
    }

    fn high_watermark(&self) -> KafkaOffset {
        let translator = self.cluster.translator();
        self.inputs().high_watermark(&translator)
    }

    fn leader_high_watermark(&self) -> KafkaOffset {
        let translator = self.cluster.translator();
        self.inputs().leader_high_watermark(&translator)
    }

    fn log_dirty_offset(&self) -> KafkaOffset {
        let translator = self.cluster.translator();
        self.inputs().log_dirty_offset(&translator)
    }

    fn log_end_offset(&self) -> KafkaOffset {
        let translator = self.cluster.translator();
        self.inputs().log_end_offset(&translator)
    }

    fn last_stable_offset(&self) -> ProxyResult<KafkaOffset> {
        let translator = self.cluster.translator();
        self.inputs().last_stable_offset(&translator)
    }

    fn is_leader(&self) -> bool {
        self.cluster.is_leader()
    }

    fn is_elected_leader(&self) -> bool {
        self.cluster.is_elected_leader()
    }

    fn leader_epoch(&self) -> LeaderEpoch {
        LeaderEpoch::from_term(self.cluster.term())
    }

    async fn linearizable_barrier(&self) -> ProxyResult<()> {
        self.cluster.linearizable_barrier().await?;
        Ok(())
    }

    async fn get_leader_epoch_last_offset(
        &self,
        epoch: LeaderEpoch,
    ) -> ProxyResult<Option<KafkaOffset>> {
        epoch::last_offset_for_epoch(
            self.cluster.as_ref(),
            self.tier.as_ref(),
            epoch,
            self.config.remote_query_timeout,
        )
        .await
    }

    async fn validate_fetch_offset(
        &self,
        offset: KafkaOffset,
        allow_earliest: bool,
        deadline: Instant,
    ) -> ProxyResult<()> {
        fetch::check_leadership(
            self.cluster.is_read_replica_mode_enabled(),
            self.cluster.is_leader(),
        )?;

        let now = Instant::now();
        if now >= deadline {
            return Err(ErrorCode::RequestTimedOut);
        }
        let start = self.sync_effective_start(Some(deadline - now)).await?;

        FetchBounds {
            start,
            high_watermark: self.high_watermark(),
        }
        .check(offset, allow_earliest)
    }

    async fn aborted_transactions(
        &self,
        base: KafkaOffset,
        last: KafkaOffset,
        translator: Arc<OffsetTranslatorState>,
    ) -> ProxyResult<Vec<TxRange>> {
        aborted::aborted_transactions(
            self.cluster.as_ref(),
            self.tier.as_ref(),
            base,
            last,
            &translator,
            self.config.remote_query_timeout,
        )
        .await
    }

    async fn prefix_truncate(&self, offset: KafkaOffset, deadline: Instant) -> ProxyResult<()> {
        let inputs = self.inputs();
        if inputs.mode.read_replica {
            return Err(ErrorCode::NotLeaderForPartition);
        }

        let translator = self.cluster.translator();
        let start = inputs.start_offset(&translator);
        if offset <= start {
            debug!(partition = %self.cluster.ntp(), offset = %offset, start = %start, "prefix truncation below start ignored");
            return Ok(());
        }
        let high_watermark = inputs.high_watermark(&translator);
        if offset > high_watermark {
            return Err(ErrorCode::OffsetOutOfRange);
        }

        let raw_offset = translator.to_log_offset(offset);
        info!(
            partition = %self.cluster.ntp(),
            offset = %offset,
            raw_offset = %raw_offset,
            "prefix truncating partition"
        );
        tokio::time::timeout_at(deadline, self.cluster.prefix_truncate(raw_offset, offset, deadline))
            .await
            .map_err(|_| ErrorCode::RequestTimedOut)??;
        Ok(())
    }

    async fn replicate(
        &self,
        batch: RecordBatch,
        options: ReplicateOptions,
    ) -> ProxyResult<KafkaOffset> {
        if self.cluster.is_read_replica_mode_enabled() {
            return Err(ErrorCode::NotLeaderForPartition);
        }
        if batch.is_empty() {
            warn!(partition = %self.cluster.ntp(), "rejecting empty batch");
            return Err(ErrorCode::UnknownServerError);
        }

        let raw_last = self.cluster.replicate(batch, options).await?;
        Ok(self.cluster.translator().from_log_offset(raw_last))
    }

    fn replicate_in_stages(&self, batch: RecordBatch, options: ReplicateOptions) -> ReplicateStages {
        let rejected = |code: ErrorCode| ReplicateStages {
            enqueued: future::ready(Err(code)).boxed(),
            finished: future::ready(Err(code)).boxed(),
        };
        if self.cluster.is_read_replica_mode_enabled() {
            return rejected(ErrorCode::NotLeaderForPartition);
        }
        if batch.is_empty() {
            warn!(partition = %self.cluster.ntp(), "rejecting empty batch");
            return rejected(ErrorCode::UnknownServerError);
        }

        let stages = self.cluster.replicate_in_stages(batch, options);
        let cluster = Arc::clone(&self.cluster);
        ReplicateStages {
            enqueued: stages.enqueued.map(|result| result.map_err(ErrorCode::from)).boxed(),
            finished: async move {
                let raw_last = stages.finished.await?;
                Ok(cluster.translator().from_log_offset(raw_last))
            }
            .boxed(),
        }
    }

    async fn make_reader(
        &self,
        config: ReaderConfig,
        deadline: Option<Instant>,
    ) -> ProxyResult<TranslatingReader> {
        // The dirty offset is read before the snapshot, so the snapshot
        // describes every entry up to it.
        let raw_limit = self.cluster.dirty_offset();
        let translator = self.cluster.translator();
        let inputs = self.inputs();
        let max_bytes = if config.max_bytes == 0 {
            self.config.reader_max_bytes_default
        } else {
            config.max_bytes
        };
        let reader = |source| {
            TranslatingReader::new(
                Arc::clone(&self.cluster),
                source,
                Arc::clone(&translator),
                config.max,
                max_bytes,
                deadline,
            )
        };

        if config.start > config.max {
            return Ok(reader(None));
        }

        let local_start = translator.from_log_offset(inputs.raw_start);
        if inputs.mode.reads_from_cloud(config.start, local_start) {
            debug!(
                partition = %self.cluster.ntp(),
                start = %config.start,
                max = %config.max,
                local_start = %local_start,
                "opening remote reader"
            );
            return Ok(reader(Some(ReadSource::Remote {
                tier: Arc::clone(&self.tier),
                next: config.start,
                query_timeout: self.config.remote_query_timeout,
            })));
        }
        if inputs.mode.read_replica {
            // No cloud data and no local data to serve.
            return Ok(reader(None));
        }
        if config.start < local_start {
            debug!(
                partition = %self.cluster.ntp(),
                start = %config.start,
                local_start = %local_start,
                "read below local start with no remote source"
            );
            return Err(ErrorCode::OffsetOutOfRange);
        }

        let raw_config = LogReaderConfig {
            start: translator.to_log_offset(config.start),
            max: translator.to_log_offset(config.max).min(raw_limit),
            type_filter: config.type_filter,
        };
        debug!(
            partition = %self.cluster.ntp(),
            start = %config.start,
            max = %config.max,
            raw_start = %raw_config.start,
            raw_max = %raw_config.max,
            "opening reader"
        );
        let inner = self.cluster.make_reader(raw_config).await?;

        Ok(reader(Some(ReadSource::Local { inner, raw_limit })))
    }

    async fn timequery(&self, query: TimeQuery) -> ProxyResult<Option<TimeQueryResult>> {
        let translator = self.cluster.translator();
        let raw_query = RawTimeQuery {
            time: query.time,
            max_offset: translator.to_log_offset(query.max_offset),
        };

        let result = self.cluster.timequery(raw_query).await?;
        self.ensure_generation(&translator, "timequery")?;

        Ok(result
            .map(|found| TimeQueryResult {
                offset: translator.from_log_offset(found.offset),
                time: found.time,
            })
            .filter(|found| found.offset <= query.max_offset))
    }

    fn get_partition_info(&self) -> ProxyResult<PartitionInfo> {
        let translator = self.cluster.translator();
        let inputs = self.inputs();
        let followers = self.cluster.follower_states()?;

        let mut replicas = Vec::with_capacity(followers.len() + 1);
        replicas.push(ReplicaInfo {
            id: self.cluster.node_id(),
            high_watermark: inputs.high_watermark(&translator),
            log_end_offset: inputs.log_end_offset(&translator),
            is_alive: true,
        });
        replicas.extend(followers.into_iter().map(|follower| ReplicaInfo {
            id: follower.node_id,
            high_watermark: translator.from_log_offset(follower.match_index.next()),
            log_end_offset: translator.from_log_offset_inclusive(follower.dirty_index).next(),
            is_alive: follower.is_alive,
        }));

        Ok(PartitionInfo {
            leader: self.cluster.leader_id(),
            leader_epoch: self.leader_epoch(),
            replicas,
        })
    }
}
