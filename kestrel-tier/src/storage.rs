//! Remote tier abstraction.
//!
//! This module provides the trait a partition view uses to see what the
//! remote tiered store holds, and a simulated in-memory implementation for
//! deterministic testing.

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use kestrel_core::{KafkaOffset, LeaderEpoch, Record};
use tracing::debug;

use crate::error::{TierError, TierResult};
use crate::metadata::{CloudOffsetRange, RemoteBatch, RemoteManifest, RemoteSegment, TxRange};

// -----------------------------------------------------------------------------
// RemoteTier Trait
// -----------------------------------------------------------------------------

/// Read-side view of a partition's remote tier.
///
/// Boundary accessors are synchronous: they read the in-memory manifest and
/// must never wait on the remote store. Metadata queries and data reads are
/// round trips and may be slow.
#[async_trait]
pub trait RemoteTier: Send + Sync {
    /// Returns true if the remote tier currently holds retrievable data.
    fn cloud_data_available(&self) -> bool;

    /// Returns the retrievable range, or `None` when nothing is available.
    fn offset_range(&self) -> Option<CloudOffsetRange>;

    /// Returns the aborted transactions touching `[base, last]`, ordered by
    /// first offset.
    ///
    /// # Errors
    ///
    /// Returns an error if the remote round trip fails.
    async fn aborted_transactions(
        &self,
        base: KafkaOffset,
        last: KafkaOffset,
    ) -> TierResult<Vec<TxRange>>;

    /// Returns the last offset written under an epoch at or below `epoch`.
    ///
    /// # Errors
    ///
    /// Returns an error if the remote round trip fails.
    async fn term_last_offset(&self, epoch: LeaderEpoch) -> TierResult<Option<KafkaOffset>>;

    /// Returns the uploaded batch holding `offset`, or the first batch after
    /// it. Returns `None` when `offset` is outside the retrievable range.
    ///
    /// # Errors
    ///
    /// Returns an error if the remote round trip fails or the segment data
    /// fails its integrity check.
    async fn read_batch(&self, offset: KafkaOffset) -> TierResult<Option<RemoteBatch>>;
}

// -----------------------------------------------------------------------------
// Fault Configuration
// -----------------------------------------------------------------------------

/// Configuration for fault injection in the simulated remote tier.
#[derive(Debug, Clone, Default)]
pub struct RemoteTierFaultConfig {
    /// Probability of a metadata query failing. Range: 0.0 - 1.0.
    pub query_fail_rate: f64,
    /// If true, next metadata query will fail (one-shot).
    pub force_query_fail: bool,
    /// If true, next metadata query will report a timeout (one-shot).
    pub force_query_timeout: bool,
    /// If true, next data read will fail its integrity check (one-shot).
    pub force_read_corruption: bool,
    /// Artificial latency added to every metadata query and data read.
    pub query_latency: Option<Duration>,
}

impl RemoteTierFaultConfig {
    /// Creates a fault config with no faults (for basic testing).
    #[must_use]
    pub fn none() -> Self {
        Self::default()
    }

    /// Sets the query failure rate.
    ///
    /// # Panics
    ///
    /// Panics if rate is not in range 0.0..=1.0.
    #[must_use]
    pub fn with_query_fail_rate(mut self, rate: f64) -> Self {
        assert!((0.0..=1.0).contains(&rate), "rate must be in 0.0..=1.0");
        self.query_fail_rate = rate;
        self
    }

    /// Sets the artificial query latency.
    #[must_use]
    pub const fn with_query_latency(mut self, latency: Duration) -> Self {
        self.query_latency = Some(latency);
        self
    }

    /// Forces the next query to fail (one-shot).
    #[must_use]
    pub const fn with_force_query_fail(mut self) -> Self {
        self.force_query_fail = true;
        self
    }
}

// -----------------------------------------------------------------------------
// SimulatedRemoteTier
// -----------------------------------------------------------------------------

/// In-memory remote tier for deterministic testing.
///
/// Tests populate the manifest directly; nothing is uploaded or evicted.
/// Every segment added is readable as a single batch whose record values are
/// the decimal client offsets.
///
/// # Determinism
///
/// Rate-based faults use a hash of the seed and an operation counter, so a
/// given seed always fails the same queries.
///
/// # Cloning
///
/// Clones share the same manifest and fault configuration.
#[derive(Debug, Clone)]
pub struct SimulatedRemoteTier {
    manifest: Arc<Mutex<RemoteManifest>>,
    /// Segment data in offset order, one batch per segment.
    batches: Arc<Mutex<Vec<RemoteBatch>>>,
    /// Cleared to simulate the remote tier being switched off.
    enabled: Arc<AtomicBool>,
    fault_config: Arc<Mutex<RemoteTierFaultConfig>>,
    seed: u64,
    counter: Arc<AtomicU64>,
}

impl SimulatedRemoteTier {
    /// Creates an empty simulated tier with the given seed.
    #[must_use]
    pub fn new(seed: u64) -> Self {
        Self::with_faults(seed, RemoteTierFaultConfig::default())
    }

    /// Creates an empty simulated tier with fault injection enabled.
    #[must_use]
    pub fn with_faults(seed: u64, config: RemoteTierFaultConfig) -> Self {
        Self {
            manifest: Arc::new(Mutex::new(RemoteManifest::new())),
            batches: Arc::new(Mutex::new(Vec::new())),
            enabled: Arc::new(AtomicBool::new(true)),
            fault_config: Arc::new(Mutex::new(config)),
            seed,
            counter: Arc::new(AtomicU64::new(0)),
        }
    }

    /// Returns the fault configuration for modification.
    ///
    /// # Panics
    ///
    /// Panics if the mutex is poisoned.
    pub fn fault_config(&self) -> std::sync::MutexGuard<'_, RemoteTierFaultConfig> {
        self.fault_config.lock().expect("fault config lock poisoned")
    }

    /// Appends a segment to the manifest.
    ///
    /// # Errors
    ///
    /// Returns an error if the segment breaks manifest ordering.
    ///
    /// # Panics
    ///
    /// Panics if the mutex is poisoned.
    pub fn add_segment(&self, segment: RemoteSegment) -> TierResult<()> {
        let records = (segment.base_offset.get()..=segment.last_offset.get())
            .map(|offset| Record::new(offset.to_string()))
            .collect();
        let batch = RemoteBatch::new(segment.base_offset, segment.epoch, records);

        self.manifest
            .lock()
            .expect("manifest lock poisoned")
            .add_segment(segment)?;
        self.batches.lock().expect("batches lock poisoned").push(batch);
        Ok(())
    }

    /// Records an aborted transaction.
    ///
    /// # Panics
    ///
    /// Panics if the mutex is poisoned.
    pub fn add_aborted(&self, tx: TxRange) {
        self.manifest
            .lock()
            .expect("manifest lock poisoned")
            .add_aborted(tx);
    }

    /// Applies remote retention up to `start`.
    ///
    /// # Panics
    ///
    /// Panics if the mutex is poisoned.
    pub fn advance_start(&self, start: KafkaOffset) {
        self.manifest
            .lock()
            .expect("manifest lock poisoned")
            .advance_start(start);
    }

    /// Enables or disables the tier without touching the manifest.
    pub fn set_enabled(&self, enabled: bool) {
        self.enabled.store(enabled, Ordering::SeqCst);
    }

    /// Deterministic RNG based on seed and counter.
    fn should_inject_fault(&self, rate: f64) -> bool {
        if rate <= 0.0 {
            return false;
        }
        if rate >= 1.0 {
            return true;
        }
        let counter = self.counter.fetch_add(1, Ordering::Relaxed);
        let hash = self.seed.wrapping_add(counter).wrapping_mul(0x5851_f42d_4c95_7f2d);
        #[allow(clippy::cast_precision_loss)]
        let sample = (hash >> 11) as f64 / (1u64 << 53) as f64;
        sample < rate
    }

    /// Applies configured latency and faults ahead of a remote round trip.
    async fn before_query(&self, operation: &'static str) -> TierResult<()> {
        let (latency, forced_timeout, forced_fail, rate) = {
            let mut config = self.fault_config();
            let forced_timeout = std::mem::take(&mut config.force_query_timeout);
            let forced_fail = std::mem::take(&mut config.force_query_fail);
            (
                config.query_latency,
                forced_timeout,
                forced_fail,
                config.query_fail_rate,
            )
        };

        if let Some(latency) = latency {
            tokio::time::sleep(latency).await;
        }
        if forced_timeout {
            debug!(operation, "simulated remote tier timeout");
            return Err(TierError::Timeout { operation });
        }
        if forced_fail || self.should_inject_fault(rate) {
            debug!(operation, "simulated remote tier failure");
            return Err(TierError::Unavailable {
                message: format!("simulated failure during {operation}"),
            });
        }
        Ok(())
    }
}

#[async_trait]
impl RemoteTier for SimulatedRemoteTier {
    fn cloud_data_available(&self) -> bool {
        self.offset_range().is_some()
    }

    fn offset_range(&self) -> Option<CloudOffsetRange> {
        if !self.enabled.load(Ordering::SeqCst) {
            return None;
        }
        self.manifest
            .lock()
            .expect("manifest lock poisoned")
            .offset_range()
    }

    async fn aborted_transactions(
        &self,
        base: KafkaOffset,
        last: KafkaOffset,
    ) -> TierResult<Vec<TxRange>> {
        self.before_query("aborted_transactions").await?;
        Ok(self
            .manifest
            .lock()
            .expect("manifest lock poisoned")
            .aborted_transactions(base, last))
    }

    async fn term_last_offset(&self, epoch: LeaderEpoch) -> TierResult<Option<KafkaOffset>> {
        self.before_query("term_last_offset").await?;
        Ok(self
            .manifest
            .lock()
            .expect("manifest lock poisoned")
            .term_last_offset(epoch))
    }

    async fn read_batch(&self, offset: KafkaOffset) -> TierResult<Option<RemoteBatch>> {
        self.before_query("read_batch").await?;

        if !self.offset_range().is_some_and(|range| range.contains(offset)) {
            return Ok(None);
        }
        let batch = self
            .batches
            .lock()
            .expect("batches lock poisoned")
            .iter()
            .find(|batch| batch.last_offset() >= offset)
            .cloned();

        let corrupt = std::mem::take(&mut self.fault_config().force_read_corruption);
        match batch {
            Some(batch) if corrupt => {
                debug!(base_offset = %batch.base_offset, "simulated remote segment corruption");
                Err(TierError::DataCorruption {
                    base_offset: batch.base_offset.get(),
                })
            }
            batch => Ok(batch),
        }
    }
}
