//! Aborted transaction lookup across local and remote metadata.
//!
//! A fetch that spans the local start needs aborted transactions from both
//! sides: the remote tier knows about evicted data, the local transaction
//! state about everything still on disk. The requested range is split at the
//! local start, each half goes to its source, and the answers are merged.

use std::time::Duration;

use kestrel_core::KafkaOffset;
use kestrel_tier::{RemoteTier, TxRange};
use tracing::{debug, warn};

use crate::cluster::ClusterPartition;
use crate::error::{ErrorCode, ProxyResult};
use crate::mode::PartitionMode;
use crate::translator::OffsetTranslatorState;

/// How a `[base, last]` lookup is split between the two sources.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AbortedRangePlan {
    /// Client offset of the first locally retained record.
    pub local_start: KafkaOffset,
    /// Inclusive sub-range below the local start, sent to the remote tier.
    pub remote: Option<(KafkaOffset, KafkaOffset)>,
    /// Inclusive sub-range at or above the local start, queried locally.
    pub local: Option<(KafkaOffset, KafkaOffset)>,
}

impl AbortedRangePlan {
    /// Splits `[base, last]` at `local_start`.
    ///
    /// The remote half is planned only when `may_read_from_cloud` holds.
    #[must_use]
    pub fn new(
        base: KafkaOffset,
        last: KafkaOffset,
        local_start: KafkaOffset,
        may_read_from_cloud: bool,
    ) -> Self {
        let remote = (may_read_from_cloud && base < local_start && base <= last)
            .then(|| (base, last.min(local_start.prev())));
        let local_base = base.max(local_start);
        let local = (local_base <= last).then_some((local_base, last));

        Self {
            local_start,
            remote,
            local,
        }
    }

    /// Returns true if neither source needs to be queried.
    #[must_use]
    pub const fn is_empty(&self) -> bool {
        self.remote.is_none() && self.local.is_none()
    }

    /// Merges both answers in ascending first-offset order.
    ///
    /// When both sources were queried, each keeps only the transactions it
    /// owns: the remote tier those starting below the local start, the local
    /// state the rest. A transaction straddling the local start is therefore
    /// reported exactly once.
    #[must_use]
    pub fn merge(&self, remote: Vec<TxRange>, local: Vec<TxRange>) -> Vec<TxRange> {
        let split = self.remote.is_some() && self.local.is_some();
        let local_start = self.local_start;

        let mut merged: Vec<TxRange> = remote
            .into_iter()
            .filter(|tx| !split || tx.first < local_start)
            .chain(
                local
                    .into_iter()
                    .filter(|tx| !split || tx.first >= local_start),
            )
            .collect();
        merged.sort_by_key(|tx| tx.first);
        merged
    }
}

/// Returns aborted transactions touching `[base, last]`, in client offsets
/// ordered by first offset.
///
/// The local start, the split, and every local translation use `translator`.
/// Remote and local queries run concurrently.
///
/// # Errors
///
/// Returns `RequestTimedOut` if the remote query exceeds `remote_timeout` or
/// the live translator moved past `translator` while the local query ran.
/// Collaborator errors are mapped.
pub async fn aborted_transactions(
    cluster: &dyn ClusterPartition,
    tier: &dyn RemoteTier,
    base: KafkaOffset,
    last: KafkaOffset,
    translator: &OffsetTranslatorState,
    remote_timeout: Duration,
) -> ProxyResult<Vec<TxRange>> {
    if base > last {
        return Ok(Vec::new());
    }

    let mode = PartitionMode::capture(cluster, tier);
    let local_start = translator.from_log_offset(cluster.raft_start_offset());
    let plan = AbortedRangePlan::new(base, last, local_start, mode.may_read_from_cloud());
    debug!(
        partition = %cluster.ntp(),
        base = %base,
        last = %last,
        local_start = %local_start,
        remote = ?plan.remote,
        local = ?plan.local,
        "aborted transaction lookup"
    );

    let remote_query = async {
        let Some((from, to)) = plan.remote else {
            return Ok::<_, ErrorCode>(Vec::new());
        };
        tokio::time::timeout(remote_timeout, tier.aborted_transactions(from, to))
            .await
            .map_err(|_| {
                warn!(partition = %cluster.ntp(), "remote aborted transaction query timed out");
                ErrorCode::RequestTimedOut
            })?
            .map_err(ErrorCode::from)
    };

    let local_query = async {
        let Some((from, to)) = plan.local else {
            return Ok(Vec::new());
        };
        let raw = cluster
            .aborted_transactions(translator.to_log_offset(from), translator.to_log_offset(to))
            .await?;
        Ok::<_, ErrorCode>(
            raw.into_iter()
                .map(|tx| {
                    TxRange::new(
                        tx.producer_id,
                        translator.from_log_offset(tx.first),
                        translator.from_log_offset(tx.last),
                    )
                })
                .collect::<Vec<_>>(),
        )
    };

    let (remote, local) = tokio::join!(remote_query, local_query);
    let (remote, local) = (remote?, local?);

    let live_generation = cluster.translator().generation();
    if plan.local.is_some() && live_generation != translator.generation() {
        warn!(
            partition = %cluster.ntp(),
            snapshot = translator.generation(),
            live = live_generation,
            "log truncated during aborted transaction lookup"
        );
        return Err(ErrorCode::RequestTimedOut);
    }

    Ok(plan.merge(remote, local))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn kafka(value: i64) -> KafkaOffset {
        KafkaOffset::new(value)
    }

    fn tx(producer_id: i64, first: i64, last: i64) -> TxRange {
        TxRange::new(producer_id, kafka(first), kafka(last))
    }

    #[test]
    fn test_plan_splits_at_local_start() {
        let plan = AbortedRangePlan::new(kafka(50), kafka(149), kafka(100), true);
        assert_eq!(plan.remote, Some((kafka(50), kafka(99))));
        assert_eq!(plan.local, Some((kafka(100), kafka(149))));
    }

    #[test]
    fn test_plan_without_cloud_is_local_only() {
        let plan = AbortedRangePlan::new(kafka(50), kafka(149), kafka(100), false);
        assert_eq!(plan.remote, None);
        assert_eq!(plan.local, Some((kafka(100), kafka(149))));
    }

    #[test]
    fn test_plan_entirely_remote_skips_local() {
        let plan = AbortedRangePlan::new(kafka(10), kafka(40), kafka(100), true);
        assert_eq!(plan.remote, Some((kafka(10), kafka(40))));
        assert_eq!(plan.local, None);

        // Below local start without cloud data: nothing to ask.
        let plan = AbortedRangePlan::new(kafka(10), kafka(40), kafka(100), false);
        assert!(plan.is_empty());
    }

    #[test]
    fn test_plan_entirely_local() {
        let plan = AbortedRangePlan::new(kafka(100), kafka(120), kafka(100), true);
        assert_eq!(plan.remote, None);
        assert_eq!(plan.local, Some((kafka(100), kafka(120))));
    }

    #[test]
    fn test_merge_orders_and_dedupes_straddler() {
        let plan = AbortedRangePlan::new(kafka(50), kafka(149), kafka(100), true);

        // Producer 2 straddles the local start and is reported by both.
        let remote = vec![tx(1, 55, 60), tx(2, 95, 105)];
        let local = vec![tx(2, 95, 105), tx(3, 120, 130), tx(4, 101, 102)];

        let merged = plan.merge(remote, local);
        let producers: Vec<i64> = merged.iter().map(|tx| tx.producer_id).collect();
        assert_eq!(producers, vec![1, 2, 4, 3]);
    }

    #[test]
    fn test_merge_single_source_keeps_everything() {
        let plan = AbortedRangePlan::new(kafka(50), kafka(149), kafka(100), false);

        // Local transaction state may still know a straddler.
        let merged = plan.merge(Vec::new(), vec![tx(2, 95, 105)]);
        assert_eq!(merged, vec![tx(2, 95, 105)]);
    }
}
