//! Offsets in the three coordinate systems of a partition.
//!
//! A partition is addressed in two offset spaces that must never be mixed:
//!
//! - [`RawOffset`]: position in the replicated log. Every entry consumes one,
//!   including control entries that clients never see.
//! - [`KafkaOffset`]: position in the client-visible log. Only data records
//!   consume one.
//!
//! Remote tiered storage is indexed by `KafkaOffset` as well. Valid offsets
//! are non-negative; `-1` is the "nothing yet" position.

use std::fmt;

use crate::TermId;

macro_rules! define_offset {
    ($name:ident, $doc:expr) => {
        #[doc = $doc]
        #[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
        #[repr(transparent)]
        pub struct $name(i64);

        impl $name {
            /// Creates an offset from a raw value.
            #[inline]
            #[must_use]
            pub const fn new(value: i64) -> Self {
                Self(value)
            }

            /// Returns the raw offset value.
            #[inline]
            #[must_use]
            pub const fn get(self) -> i64 {
                self.0
            }

            /// The position before the first offset (`-1`).
            #[inline]
            #[must_use]
            pub const fn none() -> Self {
                Self(-1)
            }

            /// Returns true for the "nothing yet" position or anything below it.
            #[inline]
            #[must_use]
            pub const fn is_none(self) -> bool {
                self.0 < 0
            }

            /// Returns the next offset.
            #[inline]
            #[must_use]
            pub const fn next(self) -> Self {
                Self(self.0.saturating_add(1))
            }

            /// Returns the previous offset.
            #[inline]
            #[must_use]
            pub const fn prev(self) -> Self {
                Self(self.0.saturating_sub(1))
            }

            /// Returns this offset moved forward by `delta` positions.
            #[inline]
            #[must_use]
            pub const fn saturating_add(self, delta: i64) -> Self {
                Self(self.0.saturating_add(delta))
            }

            /// Returns this offset moved back by `delta` positions.
            #[inline]
            #[must_use]
            pub const fn saturating_sub(self, delta: i64) -> Self {
                Self(self.0.saturating_sub(delta))
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "{}", self.0)
            }
        }

        impl From<i64> for $name {
            fn from(value: i64) -> Self {
                Self::new(value)
            }
        }
    };
}

define_offset!(
    RawOffset,
    "Position in the replicated log, control entries included."
);
define_offset!(
    KafkaOffset,
    "Position in the client-visible log, data records only."
);

/// Leadership epoch as seen by clients.
///
/// Epochs are the client-facing spelling of [`TermId`]. They are signed
/// because clients send `-1` for "unknown epoch".
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
pub struct LeaderEpoch(i32);

impl LeaderEpoch {
    /// Creates an epoch from a raw value.
    #[must_use]
    pub const fn new(value: i32) -> Self {
        Self(value)
    }

    /// Returns the raw epoch value.
    #[must_use]
    pub const fn get(self) -> i32 {
        self.0
    }

    /// Converts a term to an epoch, saturating at `i32::MAX`.
    #[must_use]
    pub fn from_term(term: TermId) -> Self {
        Self(i32::try_from(term.get()).unwrap_or(i32::MAX))
    }

    /// Returns the term this epoch names, or `None` for negative epochs.
    #[must_use]
    pub fn as_term(self) -> Option<TermId> {
        u64::try_from(self.0).ok().map(TermId::new)
    }
}

impl fmt::Display for LeaderEpoch {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_offset_none() {
        assert!(RawOffset::none().is_none());
        assert!(!KafkaOffset::new(0).is_none());
        assert_eq!(KafkaOffset::none().next(), KafkaOffset::new(0));
    }

    #[test]
    fn test_offset_arithmetic() {
        let offset = RawOffset::new(10);
        assert_eq!(offset.next().get(), 11);
        assert_eq!(offset.prev().get(), 9);
        assert_eq!(offset.saturating_add(5).get(), 15);
        assert_eq!(offset.saturating_sub(15).get(), -5);
        assert_eq!(RawOffset::new(i64::MAX).next().get(), i64::MAX);
    }

    #[test]
    fn test_epoch_from_term_saturates() {
        assert_eq!(LeaderEpoch::from_term(TermId::new(7)).get(), 7);
        assert_eq!(LeaderEpoch::from_term(TermId::new(u64::MAX)).get(), i32::MAX);
    }

    #[test]
    fn test_epoch_as_term() {
        assert_eq!(LeaderEpoch::new(3).as_term(), Some(TermId::new(3)));
        assert_eq!(LeaderEpoch::new(-1).as_term(), None);
    }
}
