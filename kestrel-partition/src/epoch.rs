//! Leader epoch resolution.
//!
//! Followers and consumers fence themselves after a leadership change by
//! asking for the last offset of the epoch they last saw. Anything they hold
//! past that offset was never committed and must be discarded.

use std::time::Duration;

use kestrel_core::{KafkaOffset, LeaderEpoch};
use kestrel_tier::RemoteTier;
use tracing::{debug, warn};

use crate::cluster::ClusterPartition;
use crate::error::{ErrorCode, ProxyResult};
use crate::mode::PartitionMode;

/// Returns the last client offset written under an epoch at or below
/// `epoch`, or `None` if no retained record qualifies.
///
/// The local term index answers when `epoch` is at least the term of the
/// first retained local record. Older epochs fall back to the remote tier's
/// index when remote fetch can serve them.
///
/// # Errors
///
/// Returns `RequestTimedOut` if the remote query exceeds `remote_timeout`,
/// or the mapped remote tier error.
pub async fn last_offset_for_epoch(
    cluster: &dyn ClusterPartition,
    tier: &dyn RemoteTier,
    epoch: LeaderEpoch,
    remote_timeout: Duration,
) -> ProxyResult<Option<KafkaOffset>> {
    let Some(term) = epoch.as_term() else {
        return Ok(None);
    };

    let translator = cluster.translator();
    let mode = PartitionMode::capture(cluster, tier);
    let first_local_term = cluster.term_of(cluster.raft_start_offset());

    if first_local_term.is_some_and(|first| term >= first) {
        if let Some(raw) = cluster.term_last_offset(term) {
            return Ok(Some(translator.from_log_offset(raw)));
        }
    }

    if !mode.may_read_from_cloud() {
        return Ok(None);
    }

    debug!(
        partition = %cluster.ntp(),
        epoch = %epoch,
        "epoch older than local log, querying remote tier"
    );
    tokio::time::timeout(remote_timeout, tier.term_last_offset(epoch))
        .await
        .map_err(|_| {
            warn!(partition = %cluster.ntp(), epoch = %epoch, "remote epoch query timed out");
            ErrorCode::RequestTimedOut
        })?
        .map_err(ErrorCode::from)
}

#[cfg(test)]
mod tests {
    use kestrel_core::{
        BatchType, NodeId, Ntp, PartitionId, RawOffset, TermId, TopicId,
    };
    use kestrel_tier::{RemoteSegment, RemoteTierFaultConfig, SimulatedRemoteTier};

    use super::*;
    use crate::simulated::SimulatedClusterPartition;

    const TIMEOUT: Duration = Duration::from_secs(1);

    fn cluster() -> SimulatedClusterPartition {
        SimulatedClusterPartition::new(
            Ntp::new(TopicId::new(1), PartitionId::new(0)),
            NodeId::new(1),
        )
    }

    /// Raw log: term 2 = [cfg, 4 data], term 5 = [cfg, 3 data].
    fn two_term_log() -> SimulatedClusterPartition {
        let cluster = cluster();
        cluster.become_leader(TermId::new(2));
        cluster.append_control(BatchType::RaftConfiguration, 1);
        cluster.append_data(4);
        cluster.become_leader(TermId::new(5));
        cluster.append_control(BatchType::RaftConfiguration, 1);
        cluster.append_data(3);
        cluster
    }

    #[tokio::test]
    async fn test_epoch_resolves_locally() {
        let cluster = two_term_log();
        let tier = SimulatedRemoteTier::new(1);

        // Term 2 ends at raw 4, client offset 3.
        let found = last_offset_for_epoch(&cluster, &tier, LeaderEpoch::new(2), TIMEOUT).await;
        assert_eq!(found, Ok(Some(KafkaOffset::new(3))));

        // Epochs between terms resolve to the earlier term.
        let found = last_offset_for_epoch(&cluster, &tier, LeaderEpoch::new(4), TIMEOUT).await;
        assert_eq!(found, Ok(Some(KafkaOffset::new(3))));

        let found = last_offset_for_epoch(&cluster, &tier, LeaderEpoch::new(5), TIMEOUT).await;
        assert_eq!(found, Ok(Some(KafkaOffset::new(6))));
    }

    #[tokio::test]
    async fn test_epoch_before_log_is_none() {
        let cluster = two_term_log();
        let tier = SimulatedRemoteTier::new(1);

        let found = last_offset_for_epoch(&cluster, &tier, LeaderEpoch::new(1), TIMEOUT).await;
        assert_eq!(found, Ok(None));

        let found = last_offset_for_epoch(&cluster, &tier, LeaderEpoch::new(-1), TIMEOUT).await;
        assert_eq!(found, Ok(None));
    }

    #[tokio::test]
    async fn test_old_epoch_falls_back_to_remote() {
        let cluster = two_term_log();
        cluster.set_remote_fetch(true);
        let tier = SimulatedRemoteTier::new(1);
        tier.add_segment(RemoteSegment::new(
            KafkaOffset::new(0),
            KafkaOffset::new(49),
            LeaderEpoch::new(1),
        ))
        .unwrap();

        let found = last_offset_for_epoch(&cluster, &tier, LeaderEpoch::new(1), TIMEOUT).await;
        assert_eq!(found, Ok(Some(KafkaOffset::new(49))));

        // Remote fetch disabled: the remote index is not consulted.
        cluster.set_remote_fetch(false);
        let found = last_offset_for_epoch(&cluster, &tier, LeaderEpoch::new(1), TIMEOUT).await;
        assert_eq!(found, Ok(None));
    }

    #[tokio::test(start_paused = true)]
    async fn test_remote_epoch_query_timeout() {
        let cluster = two_term_log();
        cluster.set_remote_fetch(true);
        let tier = SimulatedRemoteTier::with_faults(
            1,
            RemoteTierFaultConfig::none().with_query_latency(Duration::from_secs(30)),
        );
        tier.add_segment(RemoteSegment::new(
            KafkaOffset::new(0),
            KafkaOffset::new(9),
            LeaderEpoch::new(1),
        ))
        .unwrap();

        let found = last_offset_for_epoch(&cluster, &tier, LeaderEpoch::new(1), TIMEOUT).await;
        assert_eq!(found, Err(ErrorCode::RequestTimedOut));
    }

    #[tokio::test]
    async fn test_empty_local_log_uses_remote() {
        let cluster = cluster();
        cluster.set_remote_fetch(true);
        let tier = SimulatedRemoteTier::new(1);
        tier.add_segment(RemoteSegment::new(
            KafkaOffset::new(0),
            KafkaOffset::new(19),
            LeaderEpoch::new(3),
        ))
        .unwrap();

        assert_eq!(cluster.dirty_offset(), RawOffset::none());
        let found = last_offset_for_epoch(&cluster, &tier, LeaderEpoch::new(3), TIMEOUT).await;
        assert_eq!(found, Ok(Some(KafkaOffset::new(19))));
    }
}
