//! Per-query snapshot of a partition's operating mode.

use kestrel_core::KafkaOffset;
use kestrel_tier::{CloudOffsetRange, RemoteTier};

use crate::cluster::ClusterPartition;

/// Mode flags captured at the start of a query.
///
/// Flags are never cached between queries: every operation captures a fresh
/// `PartitionMode` and decides against that.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct PartitionMode {
    /// The partition mirrors externally stored data and has no write path.
    pub read_replica: bool,
    /// Local reads may be supplemented from the remote tier.
    pub remote_fetch_enabled: bool,
    /// Retrievable remote range, present only when cloud data is available.
    pub cloud: Option<CloudOffsetRange>,
}

impl PartitionMode {
    /// Reads the current flags from both collaborators.
    #[must_use]
    pub fn capture(cluster: &dyn ClusterPartition, tier: &dyn RemoteTier) -> Self {
        let cloud = if tier.cloud_data_available() {
            tier.offset_range()
        } else {
            None
        };
        Self {
            read_replica: cluster.is_read_replica_mode_enabled(),
            remote_fetch_enabled: cluster.is_remote_fetch_enabled(),
            cloud,
        }
    }

    /// Returns true if the remote tier currently holds retrievable data.
    #[must_use]
    pub const fn cloud_data_available(&self) -> bool {
        self.cloud.is_some()
    }

    /// Returns the remote range if local reads may be supplemented from it.
    #[must_use]
    pub const fn remote_fetch_range(&self) -> Option<CloudOffsetRange> {
        if self.remote_fetch_enabled {
            self.cloud
        } else {
            None
        }
    }

    /// Returns true if local reads may be supplemented from the remote tier.
    #[must_use]
    pub const fn may_read_from_cloud(&self) -> bool {
        self.remote_fetch_range().is_some()
    }

    /// Returns true if a read starting at `offset` is served by the remote
    /// tier.
    ///
    /// Read replicas read everything remotely. Other partitions go remote
    /// only for offsets below `local_start` that the remote tier retains.
    #[must_use]
    pub fn reads_from_cloud(&self, offset: KafkaOffset, local_start: KafkaOffset) -> bool {
        if self.read_replica {
            return self.cloud.is_some();
        }
        self.remote_fetch_range()
            .is_some_and(|cloud| cloud.start <= offset && offset < local_start)
    }
}
