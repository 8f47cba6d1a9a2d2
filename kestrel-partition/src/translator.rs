//! Raw to client offset translation.
//!
//! The replicated log interleaves data records with control entries. Control
//! entries consume raw offsets but are invisible to clients, so the client
//! offset of a raw position is the raw position minus the number of control
//! entries before it.
//!
//! An [`OffsetTranslatorState`] is an immutable snapshot of that mapping. The
//! replication layer hands out a fresh snapshot per query; callers translate
//! against it and compare generations afterwards to detect truncations that
//! raced with them.

use kestrel_core::{KafkaOffset, RawOffset};

/// Immutable snapshot of the raw/client offset mapping.
///
/// Invariants:
/// - `gaps` is strictly increasing
/// - every gap is at or after `base`
/// - `base_delta` counts the control entries before `base`
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct OffsetTranslatorState {
    /// Bumped whenever retained mappings may have changed.
    generation: u64,
    /// First raw offset the gap list describes.
    base: RawOffset,
    /// Control entries before `base`.
    base_delta: i64,
    /// Raw offsets of control entries at or after `base`.
    gaps: Vec<RawOffset>,
}

impl OffsetTranslatorState {
    /// Creates a snapshot.
    ///
    /// # Panics
    ///
    /// Panics if `gaps` is not strictly increasing, contains an offset below
    /// `base`, or `base_delta` is negative.
    #[must_use]
    pub fn new(generation: u64, base: RawOffset, base_delta: i64, gaps: Vec<RawOffset>) -> Self {
        assert!(base_delta >= 0, "base delta must not be negative");
        assert!(
            gaps.windows(2).all(|pair| pair[0] < pair[1]),
            "gaps must be strictly increasing"
        );
        assert!(
            gaps.first().map_or(true, |first| *first >= base),
            "gaps must not precede base"
        );
        Self {
            generation,
            base,
            base_delta,
            gaps,
        }
    }

    /// Returns the mapping generation.
    #[must_use]
    pub const fn generation(&self) -> u64 {
        self.generation
    }

    /// Returns the first raw offset the gap list describes.
    #[must_use]
    pub const fn base(&self) -> RawOffset {
        self.base
    }

    /// Returns the raw offsets of retained control entries.
    #[must_use]
    pub fn gaps(&self) -> &[RawOffset] {
        &self.gaps
    }

    /// Returns the number of control entries strictly before `raw`.
    #[must_use]
    #[allow(clippy::cast_possible_wrap)] // Gap counts are bounded by the log length.
    pub fn delta(&self, raw: RawOffset) -> i64 {
        let before = self.gaps.partition_point(|gap| *gap < raw);
        self.base_delta + before as i64
    }

    /// Translates a raw offset to a client offset.
    ///
    /// A raw offset occupied by a control entry maps to the client offset of
    /// the next data record. Negative positions pass through unchanged.
    #[must_use]
    pub fn from_log_offset(&self, raw: RawOffset) -> KafkaOffset {
        if raw.is_none() {
            return KafkaOffset::new(raw.get());
        }
        KafkaOffset::new(raw.get() - self.delta(raw))
    }

    /// Translates a client offset to the raw offset of that data record.
    ///
    /// Offsets past the end of the log map to where the record will land if
    /// no further control entries are written. Negative positions pass
    /// through unchanged.
    #[must_use]
    pub fn to_log_offset(&self, kafka: KafkaOffset) -> RawOffset {
        if kafka.is_none() {
            return RawOffset::new(kafka.get());
        }
        let mut raw = RawOffset::new(kafka.get()).saturating_add(self.base_delta);

        // Bounded loop: at most gaps.len() iterations.
        for gap in &self.gaps {
            if *gap <= raw {
                raw = raw.next();
            } else {
                break;
            }
        }
        raw
    }

    /// Translates an inclusive raw position (such as a dirty offset).
    ///
    /// A trailing control entry does not count towards the client position,
    /// so `-1` stays `-1` and a log ending in control entries reports its
    /// last data record.
    #[must_use]
    pub fn from_log_offset_inclusive(&self, raw: RawOffset) -> KafkaOffset {
        if raw.is_none() {
            return KafkaOffset::none();
        }
        self.from_log_offset(raw.next()).prev()
    }

    /// Returns true if `raw` is occupied by a retained control entry.
    #[must_use]
    pub fn is_gap(&self, raw: RawOffset) -> bool {
        self.gaps.binary_search(&raw).is_ok()
    }
}
