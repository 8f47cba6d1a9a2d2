//! Offset space reconciliation.
//!
//! Boundary queries (start, high watermark, end, last stable offset) may be
//! answered by the local log, the remote tier, or a fixed sentinel, depending
//! on the partition's mode. The functions here make that decision. They do
//! no I/O: the caller captures a [`BoundaryInputs`] and a translator snapshot
//! and gets client offsets back.
//!
//! Priority, per query:
//!
//! 1. Read replica with cloud data: the remote boundary.
//! 2. Read replica without cloud data: the empty log (start 0, high
//!    watermark 0, nothing dirty).
//! 3. Otherwise the translated local boundary, except that the start prefers
//!    an earlier remote start when remote fetch can serve it.

use kestrel_core::{KafkaOffset, RawOffset};
use kestrel_tier::RemoteTier;
use tracing::debug;

use crate::cluster::{ClusterPartition, RawLso};
use crate::error::{ErrorCode, ProxyResult};
use crate::mode::PartitionMode;
use crate::translator::OffsetTranslatorState;

/// Raw boundaries and mode flags captured for one query.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BoundaryInputs {
    /// Mode flags and remote range.
    pub mode: PartitionMode,
    /// First retained raw offset.
    pub raw_start: RawOffset,
    /// Exclusive committed raw position.
    pub raw_high_watermark: RawOffset,
    /// High watermark as last reported by the leader.
    pub raw_leader_high_watermark: RawOffset,
    /// Last appended raw offset, `-1` when empty.
    pub raw_dirty: RawOffset,
    /// Raw last stable offset.
    pub raw_lso: RawLso,
}

impl BoundaryInputs {
    /// Reads current boundaries from both collaborators.
    #[must_use]
    pub fn capture(cluster: &dyn ClusterPartition, tier: &dyn RemoteTier) -> Self {
        Self {
            mode: PartitionMode::capture(cluster, tier),
            raw_start: cluster.raft_start_offset(),
            raw_high_watermark: cluster.high_watermark(),
            raw_leader_high_watermark: cluster.leader_high_watermark(),
            raw_dirty: cluster.dirty_offset(),
            raw_lso: cluster.last_stable_offset(),
        }
    }

    /// Returns the first offset a client can fetch.
    #[must_use]
    pub fn start_offset(&self, translator: &OffsetTranslatorState) -> KafkaOffset {
        if self.mode.read_replica {
            return self.mode.cloud.map_or(KafkaOffset::new(0), |cloud| cloud.start);
        }

        let local = translator.from_log_offset(self.raw_start);
        match self.mode.remote_fetch_range() {
            Some(cloud) if cloud.start < local => {
                debug!(
                    remote_start = %cloud.start,
                    local_start = %local,
                    "start offset served from remote tier"
                );
                cloud.start
            }
            _ => local,
        }
    }

    /// Returns the exclusive committed client position.
    #[must_use]
    pub fn high_watermark(&self, translator: &OffsetTranslatorState) -> KafkaOffset {
        if self.mode.read_replica {
            return self.mode.cloud.map_or(KafkaOffset::new(0), |cloud| cloud.next);
        }
        translator.from_log_offset(self.raw_high_watermark)
    }

    /// Returns the leader's high watermark.
    ///
    /// Read replicas have no leader-side view and report the plain high
    /// watermark.
    #[must_use]
    pub fn leader_high_watermark(&self, translator: &OffsetTranslatorState) -> KafkaOffset {
        if self.mode.read_replica {
            return self.high_watermark(translator);
        }
        translator.from_log_offset(self.raw_leader_high_watermark)
    }

    /// Returns the last client offset appended, `-1` when nothing is.
    #[must_use]
    pub fn log_dirty_offset(&self, translator: &OffsetTranslatorState) -> KafkaOffset {
        if self.mode.read_replica {
            return self.mode.cloud.map_or(KafkaOffset::none(), |cloud| cloud.next);
        }
        translator.from_log_offset_inclusive(self.raw_dirty)
    }

    /// Returns the next client offset to be appended.
    #[must_use]
    pub fn log_end_offset(&self, translator: &OffsetTranslatorState) -> KafkaOffset {
        self.log_dirty_offset(translator).next()
    }

    /// Returns the last stable offset.
    ///
    /// Read replicas do not distinguish it from the high watermark.
    ///
    /// # Errors
    ///
    /// Returns `OffsetNotAvailable` if the replication layer has not
    /// established one yet.
    pub fn last_stable_offset(&self, translator: &OffsetTranslatorState) -> ProxyResult<KafkaOffset> {
        if self.mode.read_replica {
            return Ok(self.high_watermark(translator));
        }
        match self.raw_lso {
            RawLso::Offset(raw) => Ok(translator.from_log_offset(raw)),
            RawLso::Unavailable => Err(ErrorCode::OffsetNotAvailable),
        }
    }
}

#[cfg(test)]
mod tests {
    use kestrel_tier::CloudOffsetRange;

    use super::*;

    fn raw(value: i64) -> RawOffset {
        RawOffset::new(value)
    }

    fn kafka(value: i64) -> KafkaOffset {
        KafkaOffset::new(value)
    }

    /// Local raw log [10, 30), control entries at 12 and 20.
    fn local_inputs() -> (BoundaryInputs, OffsetTranslatorState) {
        let inputs = BoundaryInputs {
            mode: PartitionMode::default(),
            raw_start: raw(10),
            raw_high_watermark: raw(25),
            raw_leader_high_watermark: raw(28),
            raw_dirty: raw(29),
            raw_lso: RawLso::Offset(raw(22)),
        };
        let translator = OffsetTranslatorState::new(4, raw(10), 3, vec![raw(12), raw(20)]);
        (inputs, translator)
    }

    fn cloud(start: i64, next: i64) -> Option<CloudOffsetRange> {
        Some(CloudOffsetRange::new(kafka(start), kafka(next)))
    }

    #[test]
    fn test_local_boundaries_translate() {
        let (inputs, translator) = local_inputs();
        assert_eq!(inputs.start_offset(&translator), kafka(7));
        assert_eq!(inputs.high_watermark(&translator), kafka(20));
        assert_eq!(inputs.leader_high_watermark(&translator), kafka(23));
        assert_eq!(inputs.log_dirty_offset(&translator), kafka(24));
        assert_eq!(inputs.log_end_offset(&translator), kafka(25));
        assert_eq!(inputs.last_stable_offset(&translator), Ok(kafka(17)));
    }

    #[test]
    fn test_read_replica_with_cloud_uses_remote() {
        let (mut inputs, translator) = local_inputs();
        inputs.mode.read_replica = true;
        inputs.mode.cloud = cloud(100, 250);

        assert_eq!(inputs.start_offset(&translator), kafka(100));
        assert_eq!(inputs.high_watermark(&translator), kafka(250));
        assert_eq!(inputs.leader_high_watermark(&translator), kafka(250));
        assert_eq!(inputs.log_dirty_offset(&translator), kafka(250));
        assert_eq!(inputs.last_stable_offset(&translator), Ok(kafka(250)));
    }

    #[test]
    fn test_read_replica_without_cloud_is_empty() {
        let (mut inputs, translator) = local_inputs();
        inputs.mode.read_replica = true;
        inputs.raw_lso = RawLso::Unavailable;

        assert_eq!(inputs.start_offset(&translator), kafka(0));
        assert_eq!(inputs.high_watermark(&translator), kafka(0));
        assert_eq!(inputs.log_dirty_offset(&translator), KafkaOffset::none());
        assert_eq!(inputs.log_end_offset(&translator), kafka(0));
        assert_eq!(inputs.last_stable_offset(&translator), Ok(kafka(0)));
    }

    #[test]
    fn test_remote_start_preferred_when_earlier() {
        let (mut inputs, translator) = local_inputs();
        inputs.mode.remote_fetch_enabled = true;
        inputs.mode.cloud = cloud(2, 9);
        assert_eq!(inputs.start_offset(&translator), kafka(2));

        // Later remote start loses.
        inputs.mode.cloud = cloud(7, 9);
        assert_eq!(inputs.start_offset(&translator), kafka(7));

        // Without remote fetch the local start stands.
        inputs.mode.cloud = cloud(2, 9);
        inputs.mode.remote_fetch_enabled = false;
        assert_eq!(inputs.start_offset(&translator), kafka(7));

        // Without cloud data the local start stands.
        inputs.mode.remote_fetch_enabled = true;
        inputs.mode.cloud = None;
        assert_eq!(inputs.start_offset(&translator), kafka(7));
    }

    #[test]
    fn test_unavailable_lso() {
        let (mut inputs, translator) = local_inputs();
        inputs.raw_lso = RawLso::Unavailable;
        assert_eq!(
            inputs.last_stable_offset(&translator),
            Err(ErrorCode::OffsetNotAvailable)
        );
    }

    #[test]
    fn test_empty_log() {
        let inputs = BoundaryInputs {
            mode: PartitionMode::default(),
            raw_start: raw(0),
            raw_high_watermark: raw(0),
            raw_leader_high_watermark: raw(0),
            raw_dirty: RawOffset::none(),
            raw_lso: RawLso::Offset(raw(0)),
        };
        let translator = OffsetTranslatorState::default();
        assert_eq!(inputs.start_offset(&translator), kafka(0));
        assert_eq!(inputs.high_watermark(&translator), kafka(0));
        assert_eq!(inputs.log_end_offset(&translator), kafka(0));
    }

    #[test]
    fn test_bounds_ordered_across_modes() {
        let gaps = [3, 4, 9, 15, 16, 17, 30];
        // Bounded loop: a fixed grid of raw boundaries and mode flags.
        for start in [0i64, 3, 5, 10, 16] {
            for hwm in start..=32 {
                for dirty in (hwm - 1)..=32 {
                    for flags in 0u8..8 {
                        let translator = OffsetTranslatorState::new(
                            1,
                            raw(start),
                            0,
                            gaps.iter().copied().filter(|gap| *gap >= start).map(raw).collect(),
                        );
                        let inputs = BoundaryInputs {
                            mode: PartitionMode {
                                read_replica: flags & 1 != 0,
                                remote_fetch_enabled: flags & 2 != 0,
                                cloud: if flags & 4 != 0 { cloud(1, 12) } else { None },
                            },
                            raw_start: raw(start),
                            raw_high_watermark: raw(hwm),
                            raw_leader_high_watermark: raw(hwm),
                            raw_dirty: raw(dirty),
                            raw_lso: RawLso::Offset(raw(hwm)),
                        };

                        let start_offset = inputs.start_offset(&translator);
                        let high_watermark = inputs.high_watermark(&translator);
                        let log_end = inputs.log_end_offset(&translator);
                        assert!(
                            start_offset <= high_watermark && high_watermark <= log_end,
                            "start={start_offset} hwm={high_watermark} end={log_end} \
                             raw=({start}, {hwm}, {dirty}) flags={flags}"
                        );
                    }
                }
            }
        }
    }
}
