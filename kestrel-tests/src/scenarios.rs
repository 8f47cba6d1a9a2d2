//! Reusable test scenarios for Kestrel partition views.
//!
//! A [`PartitionHarness`] wires a [`SimulatedClusterPartition`] and a
//! [`SimulatedRemoteTier`] into a [`ReplicatedPartition`]. Tests drive the
//! collaborators directly and observe through the proxy.

use std::sync::{Arc, Once};

use kestrel_core::{BatchType, KafkaOffset, LeaderEpoch, NodeId, Ntp, PartitionId, TopicId};
use kestrel_partition::{
    ClusterFaultConfig, PartitionViewConfig, ReplicatedPartition, SimulatedClusterPartition,
};
use kestrel_tier::{RemoteSegment, RemoteTierFaultConfig, SimulatedRemoteTier};
use tracing_subscriber::EnvFilter;

static TRACING: Once = Once::new();

/// Installs a test subscriber once per process.
///
/// Output is captured by the test harness; set `RUST_LOG` to see it.
pub fn init_tracing() {
    TRACING.call_once(|| {
        let _ = tracing_subscriber::fmt()
            .with_env_filter(
                EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")),
            )
            .with_test_writer()
            .try_init();
    });
}

/// Seeds for reproducible testing.
pub mod seeds {
    /// Standard test seeds that have historically found bugs.
    pub const REGRESSION_SEEDS: &[u64] = &[
        42,
        12345,
        0xDEAD_BEEF,
        999,
        7777,
        0x1337,
        0xCAFE_BABE,
        1,
        u64::MAX,
        0,
    ];
}

/// Deterministic pseudo-random sequence for log shapes.
#[derive(Debug, Clone)]
pub struct SeededShape {
    state: u64,
}

impl SeededShape {
    /// Creates a sequence for `seed`.
    #[must_use]
    pub const fn new(seed: u64) -> Self {
        Self { state: seed }
    }

    /// Returns the next value in `0..bound`.
    ///
    /// # Panics
    ///
    /// Panics if `bound` is zero.
    pub fn next_below(&mut self, bound: u64) -> u64 {
        assert!(bound > 0, "bound must be positive");
        // splitmix64
        self.state = self.state.wrapping_add(0x9E37_79B9_7F4A_7C15);
        let mut z = self.state;
        z = (z ^ (z >> 30)).wrapping_mul(0xBF58_476D_1CE4_E5B9);
        z = (z ^ (z >> 27)).wrapping_mul(0x94D0_49BB_1331_11EB);
        (z ^ (z >> 31)) % bound
    }
}

/// A partition view over simulated collaborators.
#[derive(Debug)]
pub struct PartitionHarness {
    /// Simulated replication layer.
    pub cluster: SimulatedClusterPartition,
    /// Simulated remote tier.
    pub tier: SimulatedRemoteTier,
    /// View under test.
    pub partition: ReplicatedPartition,
}

impl PartitionHarness {
    /// Creates a harness with no faults.
    #[must_use]
    pub fn new(seed: u64) -> Self {
        Self::with_faults(seed, ClusterFaultConfig::none(), RemoteTierFaultConfig::none())
    }

    /// Creates a harness with fault injection on both collaborators.
    ///
    /// # Panics
    ///
    /// Panics if the test configuration is invalid.
    #[must_use]
    pub fn with_faults(
        seed: u64,
        cluster_faults: ClusterFaultConfig,
        tier_faults: RemoteTierFaultConfig,
    ) -> Self {
        init_tracing();
        let cluster = SimulatedClusterPartition::with_faults(
            Ntp::new(TopicId::new(1), PartitionId::new(0)),
            NodeId::new(1),
            cluster_faults,
        );
        let tier = SimulatedRemoteTier::with_faults(seed, tier_faults);
        let partition = ReplicatedPartition::new(
            Arc::new(cluster.clone()),
            Arc::new(tier.clone()),
            PartitionViewConfig::for_testing(),
        )
        .expect("test config is valid");
        Self {
            cluster,
            tier,
            partition,
        }
    }

    /// Appends `batches` batches, mixing in control batches by seed.
    ///
    /// Every third batch or so is a control batch; data batches hold one to
    /// five records.
    pub fn build_mixed_log(&self, seed: u64, batches: usize) {
        let mut shape = SeededShape::new(seed);
        for _ in 0..batches {
            if shape.next_below(3) == 0 {
                let batch_type = if shape.next_below(2) == 0 {
                    BatchType::RaftConfiguration
                } else {
                    BatchType::TxControl
                };
                self.cluster.append_control(batch_type, 1);
            } else {
                // Bounded by five records per batch.
                let count = usize::try_from(shape.next_below(5) + 1).unwrap_or(1);
                self.cluster.append_data(count);
            }
        }
    }

    /// Publishes a remote segment covering `[base, last]` in client offsets.
    ///
    /// # Panics
    ///
    /// Panics if the segment does not extend the manifest.
    pub fn add_remote_segment(&self, base: i64, last: i64, epoch: i32) {
        self.tier
            .add_segment(RemoteSegment::new(
                KafkaOffset::new(base),
                KafkaOffset::new(last),
                LeaderEpoch::new(epoch),
            ))
            .expect("segment extends manifest");
    }
}
