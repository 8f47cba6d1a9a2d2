//! Truncation against in-flight queries.
//!
//! Prefix truncation only discards a head of the log and keeps every
//! retained mapping. Suffix truncation rewrites the tail, so any snapshot
//! taken before it is stale and must be refused.

use std::time::Duration;

use kestrel_core::{BatchType, KafkaOffset, RawOffset, Record, RecordBatch, TermId, Timestamp};
use kestrel_partition::{
    ClusterFaultConfig, ErrorCode, PartitionProxy, RawTxRange, ReaderConfig, TimeQuery,
};
use kestrel_tier::{RemoteTierFaultConfig, TxRange};
use tokio::time::Instant;

use crate::scenarios::PartitionHarness;

fn kafka(value: i64) -> KafkaOffset {
    KafkaOffset::new(value)
}

fn deadline() -> Instant {
    Instant::now() + Duration::from_secs(5)
}

/// Raw: cfg 0, data 1-5 (client 0-4), tx 6, data 7-10 (client 5-8).
fn harness_with_log(config: ClusterFaultConfig) -> PartitionHarness {
    let harness = PartitionHarness::with_faults(42, config, RemoteTierFaultConfig::none());
    harness.cluster.append_control(BatchType::RaftConfiguration, 1);
    harness.cluster.append_data(5);
    harness.cluster.append_control(BatchType::TxControl, 1);
    harness.cluster.append_data(4);
    harness
}

#[tokio::test]
async fn test_truncation_suffix_fails_open_reader() {
    let harness = harness_with_log(ClusterFaultConfig::none());
    let mut reader = harness
        .partition
        .make_reader(ReaderConfig::new(kafka(0), kafka(8)), None)
        .await
        .unwrap();

    let first = reader.next_batch().await.unwrap().unwrap();
    assert_eq!(first.base_offset, kafka(0));

    // New leader rewrites the tail.
    harness.cluster.truncate_suffix(RawOffset::new(7));
    harness.cluster.append_data(2);

    assert_eq!(reader.next_batch().await, Err(ErrorCode::RequestTimedOut));
    assert_eq!(reader.next_batch().await, Ok(None));

    // A fresh reader sees the rewritten tail.
    let mut reader = harness
        .partition
        .make_reader(ReaderConfig::new(kafka(5), kafka(6)), None)
        .await
        .unwrap();
    let batch = reader.next_batch().await.unwrap().unwrap();
    assert_eq!(batch.base_offset, kafka(5));
    assert_eq!(batch.len(), 2);
}

#[tokio::test]
async fn test_truncation_appends_after_open_reader_are_not_mistranslated() {
    let harness = PartitionHarness::new(42);
    harness.cluster.append_data(3);
    let mut reader = harness
        .partition
        .make_reader(ReaderConfig::new(kafka(0), kafka(100)), None)
        .await
        .unwrap();

    let first = reader.next_batch().await.unwrap().unwrap();
    assert_eq!((first.base_offset, first.last_offset()), (kafka(0), kafka(2)));

    // The reader's snapshot predates this control entry.
    harness.cluster.append_control(BatchType::TxControl, 1);
    harness.cluster.append_data(2);
    assert_eq!(reader.next_batch().await, Ok(None));

    let mut reader = harness
        .partition
        .make_reader(ReaderConfig::new(first.last_offset().next(), kafka(100)), None)
        .await
        .unwrap();
    let batch = reader.next_batch().await.unwrap().unwrap();
    assert_eq!((batch.base_offset, batch.last_offset()), (kafka(3), kafka(4)));
    assert_eq!(reader.next_batch().await, Ok(None));
}

#[tokio::test]
async fn test_truncation_prefix_keeps_open_reader_valid() {
    let harness = harness_with_log(ClusterFaultConfig::none());
    let mut reader = harness
        .partition
        .make_reader(ReaderConfig::new(kafka(5), kafka(8)), None)
        .await
        .unwrap();

    harness.partition.prefix_truncate(kafka(3), deadline()).await.unwrap();
    assert_eq!(harness.partition.start_offset(), kafka(3));

    let batch = reader.next_batch().await.unwrap().unwrap();
    assert_eq!(batch.base_offset, kafka(5));
    assert_eq!(batch.len(), 4);
}

#[tokio::test]
async fn test_truncation_stale_snapshot_refused_by_aborted_lookup() {
    let harness = harness_with_log(ClusterFaultConfig::none());
    harness
        .cluster
        .add_aborted(RawTxRange::new(9, RawOffset::new(2), RawOffset::new(4)));

    let snapshot = harness.partition.translator();
    let aborted = harness
        .partition
        .aborted_transactions(kafka(0), kafka(8), snapshot.clone())
        .await
        .unwrap();
    assert_eq!(aborted, vec![TxRange::new(9, kafka(1), kafka(3))]);

    harness.cluster.truncate_suffix(RawOffset::new(8));
    assert_eq!(
        harness
            .partition
            .aborted_transactions(kafka(0), kafka(8), snapshot)
            .await,
        Err(ErrorCode::RequestTimedOut)
    );
}

#[tokio::test(start_paused = true)]
async fn test_truncation_during_timequery() {
    let harness = PartitionHarness::with_faults(
        42,
        ClusterFaultConfig::none().with_read_latency(Duration::from_millis(50)),
        RemoteTierFaultConfig::none(),
    );
    let records = (0..4)
        .map(|index| Record::new("v").with_timestamp(Timestamp::from_millis(1_000 + index)))
        .collect();
    harness.cluster.append(RecordBatch::data(records));

    let query = harness.partition.timequery(TimeQuery {
        time: Timestamp::from_millis(1_002),
        max_offset: kafka(3),
    });
    let truncate = async {
        tokio::time::sleep(Duration::from_millis(10)).await;
        harness.cluster.truncate_suffix(RawOffset::new(1));
    };

    let (result, ()) = tokio::join!(query, truncate);
    assert_eq!(result, Err(ErrorCode::RequestTimedOut));
}

#[tokio::test]
async fn test_truncation_prefix_out_of_range_is_rejected() {
    let harness = harness_with_log(ClusterFaultConfig::none());
    let high_watermark = harness.partition.high_watermark();

    assert_eq!(
        harness
            .partition
            .prefix_truncate(high_watermark.next(), deadline())
            .await,
        Err(ErrorCode::OffsetOutOfRange)
    );
    assert_eq!(harness.partition.start_offset(), kafka(0));

    // Truncating to the high watermark empties the log but keeps positions.
    harness
        .partition
        .prefix_truncate(high_watermark, deadline())
        .await
        .unwrap();
    assert_eq!(harness.partition.start_offset(), high_watermark);
    assert_eq!(harness.partition.high_watermark(), high_watermark);
    assert_eq!(harness.partition.log_end_offset(), high_watermark);
}

#[tokio::test]
async fn test_truncation_prefix_on_follower() {
    let harness = harness_with_log(ClusterFaultConfig::none());
    harness.cluster.become_follower(TermId::new(2), None);

    assert_eq!(
        harness.partition.prefix_truncate(kafka(2), deadline()).await,
        Err(ErrorCode::NotLeaderForPartition)
    );
}
