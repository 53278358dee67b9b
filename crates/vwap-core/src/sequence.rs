//! Sequence tracking for one product's matches stream.
//!
//! Every trade event carries a `sequence` that increases monotonically per
//! product. [`SequenceTracker`] remembers the last accepted value so the
//! aggregation stage can skip events that are not newer (duplicates or
//! out-of-order delivery) and report gaps, which mean the feed dropped
//! messages.

/// Outcome of [`SequenceTracker::check`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SequenceCheck {
    /// First sequence seen.
    First,
    /// Exactly one past the previous sequence.
    InOrder,
    /// Newer than expected; `missed` sequences were never seen.
    Gap { missed: u64 },
    /// Not newer than `last`. The event must be skipped.
    Stale { last: u64 },
}

/// Last accepted sequence of a single product.
///
/// Each aggregation task owns one, since a chain carries one product.
#[derive(Debug, Default)]
pub struct SequenceTracker {
    last: Option<u64>,
}

impl SequenceTracker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Classify `sequence`, recording it unless it is stale.
    #[inline]
    pub fn check(&mut self, sequence: u64) -> SequenceCheck {
        match self.last {
            None => {
                self.last = Some(sequence);
                SequenceCheck::First
            }
            Some(last) if sequence <= last => SequenceCheck::Stale { last },
            Some(last) => {
                self.last = Some(sequence);
                match sequence - last - 1 {
                    0 => SequenceCheck::InOrder,
                    missed => SequenceCheck::Gap { missed },
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sequence_tracker_basic() {
        let mut t = SequenceTracker::new();
        assert_eq!(t.check(100), SequenceCheck::First);
        assert_eq!(t.check(101), SequenceCheck::InOrder);
        assert_eq!(t.check(101), SequenceCheck::Stale { last: 101 });
        assert_eq!(t.check(99), SequenceCheck::Stale { last: 101 });
        assert_eq!(t.check(105), SequenceCheck::Gap { missed: 3 });
        assert_eq!(t.check(106), SequenceCheck::InOrder);
    }

    #[test]
    fn stale_does_not_move_last() {
        let mut t = SequenceTracker::default();
        t.check(10);
        assert_eq!(t.check(9), SequenceCheck::Stale { last: 10 });
        assert_eq!(t.check(11), SequenceCheck::InOrder);
        assert_eq!(t.check(11), SequenceCheck::Stale { last: 11 });
    }

    #[test]
    fn first_sequence_may_be_anything() {
        let mut t = SequenceTracker::new();
        assert_eq!(t.check(0), SequenceCheck::First);
        assert_eq!(t.check(0), SequenceCheck::Stale { last: 0 });
        assert_eq!(t.check(u64::MAX), SequenceCheck::Gap { missed: u64::MAX - 1 });
    }
}
