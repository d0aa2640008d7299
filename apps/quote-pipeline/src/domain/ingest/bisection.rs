//! Bisection bookkeeping for partially failed batches.
//!
//! A failed segment's successful prefix is kept, and the remainder (whose head
//! failed) is halved and both halves are queued in order. A remainder of one
//! record is a poison pill and is skipped. Every split spends one round from a
//! fixed budget; once the budget is spent, the remainder is dropped and reported.

use std::collections::VecDeque;

/// Half-open range of record offsets within the originating batch.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Segment {
    /// First offset.
    pub start: usize,
    /// One past the last offset.
    pub end: usize,
}

impl Segment {
    /// Create a segment.
    #[must_use]
    pub const fn new(start: usize, end: usize) -> Self {
        Self { start, end }
    }

    /// Number of records.
    #[must_use]
    pub const fn len(&self) -> usize {
        self.end.saturating_sub(self.start)
    }

    /// Returns true if the segment covers no records.
    #[must_use]
    pub const fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// What to do with the remainder of a segment after a data failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailureAction {
    /// Single failing record: report it and move past it.
    SkipRecord {
        /// Offset of the poison pill.
        offset: usize,
    },
    /// Budget exhausted: report and drop the remainder.
    DropRemainder(Segment),
    /// Remainder split in two; both halves were queued.
    Split {
        /// First half (retried first).
        head: Segment,
        /// Second half.
        tail: Segment,
    },
}

/// Queue of segments still to be applied for one originating batch.
#[derive(Debug, Clone)]
pub struct BisectionState {
    pending: VecDeque<Segment>,
    rounds: u32,
    budget: u32,
}

impl BisectionState {
    /// Start with the whole batch of `len` records pending.
    #[must_use]
    pub fn new(len: usize, budget: u32) -> Self {
        let mut pending = VecDeque::new();
        if len > 0 {
            pending.push_back(Segment::new(0, len));
        }
        Self {
            pending,
            rounds: 0,
            budget,
        }
    }

    /// Next segment to apply, in original order.
    pub fn next_segment(&mut self) -> Option<Segment> {
        self.pending.pop_front()
    }

    /// Segments not yet attempted.
    #[must_use]
    pub fn remaining(&self) -> Vec<Segment> {
        self.pending.iter().copied().collect()
    }

    /// Bisection rounds spent so far.
    #[must_use]
    pub const fn rounds(&self) -> u32 {
        self.rounds
    }

    /// Record that `segment` failed validation at `failed_at` (relative to the segment).
    pub fn on_data_failure(&mut self, segment: Segment, failed_at: usize) -> FailureAction {
        let remainder = Segment::new((segment.start + failed_at).min(segment.end), segment.end);

        if remainder.len() <= 1 {
            return FailureAction::SkipRecord {
                offset: remainder.start,
            };
        }

        if self.rounds >= self.budget {
            return FailureAction::DropRemainder(remainder);
        }

        self.rounds += 1;
        let mid = remainder.start + remainder.len().div_ceil(2);
        let head = Segment::new(remainder.start, mid);
        let tail = Segment::new(mid, remainder.end);
        self.pending.push_front(tail);
        self.pending.push_front(head);
        FailureAction::Split { head, tail }
    }
}

/// Rounds needed to isolate one record in a batch of `len`: `ceil(log2(len))`.
#[must_use]
pub const fn rounds_to_isolate(len: usize) -> u32 {
    if len <= 1 {
        0
    } else {
        usize::BITS - (len - 1).leading_zeros()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use test_case::test_case;

    /// Drive a batch where only `bad` fails, returning (applied, skipped, rounds).
    fn simulate(len: usize, bad: usize, budget: u32) -> (usize, Vec<usize>, u32) {
        let mut state = BisectionState::new(len, budget);
        let mut applied = 0;
        let mut skipped = Vec::new();
        while let Some(seg) = state.next_segment() {
            if (seg.start..seg.end).contains(&bad) {
                applied += bad - seg.start;
                match state.on_data_failure(seg, bad - seg.start) {
                    FailureAction::SkipRecord { offset } => skipped.push(offset),
                    FailureAction::DropRemainder(rest) => skipped.extend(rest.start..rest.end),
                    FailureAction::Split { .. } => {}
                }
            } else {
                applied += seg.len();
            }
        }
        (applied, skipped, state.rounds())
    }

    #[test_case(1, 0 ; "single")]
    #[test_case(2, 1 ; "two")]
    #[test_case(3, 2 ; "three")]
    #[test_case(100, 7 ; "hundred")]
    #[test_case(128, 7 ; "power of two")]
    #[test_case(129, 8 ; "just above power of two")]
    fn log2_bound(len: usize, expected: u32) {
        assert_eq!(rounds_to_isolate(len), expected);
    }

    #[test]
    fn hundred_records_failing_at_fifty() {
        let (applied, skipped, rounds) = simulate(100, 50, 8);
        assert_eq!(applied, 99);
        assert_eq!(skipped, vec![50]);
        assert!(rounds <= rounds_to_isolate(100));
    }

    #[test]
    fn every_position_converges_within_bound() {
        for len in 2..=64 {
            for bad in 0..len {
                let (applied, skipped, rounds) = simulate(len, bad, 8);
                assert_eq!(applied, len - 1, "len={len} bad={bad}");
                assert_eq!(skipped, vec![bad]);
                assert!(rounds <= rounds_to_isolate(len));
            }
        }
    }

    #[test]
    fn last_record_failing_needs_no_split() {
        let (applied, skipped, rounds) = simulate(10, 9, 8);
        assert_eq!(applied, 9);
        assert_eq!(skipped, vec![9]);
        assert_eq!(rounds, 0);
    }

    #[test]
    fn exhausted_budget_drops_remainder() {
        let mut state = BisectionState::new(100, 0);
        let seg = state.next_segment().unwrap();
        let action = state.on_data_failure(seg, 50);
        assert_eq!(action, FailureAction::DropRemainder(Segment::new(50, 100)));
        assert!(state.next_segment().is_none());
    }

    #[test]
    fn split_queues_halves_in_order() {
        let mut state = BisectionState::new(10, 4);
        let seg = state.next_segment().unwrap();
        let action = state.on_data_failure(seg, 3);
        assert_eq!(
            action,
            FailureAction::Split {
                head: Segment::new(3, 7),
                tail: Segment::new(7, 10)
            }
        );
        assert_eq!(state.remaining(), vec![Segment::new(3, 7), Segment::new(7, 10)]);
        assert_eq!(state.rounds(), 1);
    }

    #[test]
    fn empty_batch_has_nothing_pending() {
        let mut state = BisectionState::new(0, 8);
        assert!(state.next_segment().is_none());
    }
}
