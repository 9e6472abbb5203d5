//! Half-open time ranges in epoch milliseconds.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::model::{DurationMs, UnixtimeMs};

/// A half-open time range `[start, end)`.
///
/// Construction guarantees `start <= end`; zero-length intervals are allowed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Interval {
    start: UnixtimeMs,
    end: UnixtimeMs,
}

impl Interval {
    /// Creates an interval.
    ///
    /// # Panics
    ///
    /// Panics if `start > end`. Use [`Interval::try_new`] for untrusted input.
    pub fn new(start: UnixtimeMs, end: UnixtimeMs) -> Self {
        assert!(start <= end, "interval start {start} is after end {end}");
        Self { start, end }
    }

    pub fn try_new(start: UnixtimeMs, end: UnixtimeMs) -> Option<Self> {
        (start <= end).then_some(Self { start, end })
    }

    pub fn start(&self) -> UnixtimeMs {
        self.start
    }

    pub fn end(&self) -> UnixtimeMs {
        self.end
    }

    pub fn duration_ms(&self) -> DurationMs {
        self.end - self.start
    }

    pub fn is_empty(&self) -> bool {
        self.start == self.end
    }

    /// True iff `other` lies entirely inside `self`.
    pub fn contains(&self, other: &Interval) -> bool {
        other.start >= self.start && other.end <= self.end
    }

    /// True iff the two ranges share at least one instant.
    pub fn overlaps(&self, other: &Interval) -> bool {
        self.start < other.end && other.start < self.end
    }

    /// Widens the range by `before` at the start and `after` at the end.
    ///
    /// Negative values shrink the range; the result is clamped so that it
    /// never inverts.
    pub fn expand(&self, before: DurationMs, after: DurationMs) -> Interval {
        let start = self.start.saturating_sub(before);
        let end = self.end.saturating_add(after).max(start);
        Interval { start, end }
    }

    pub fn intersection(&self, other: &Interval) -> Option<Interval> {
        let start = self.start.max(other.start);
        let end = self.end.min(other.end);
        (start < end).then_some(Interval { start, end })
    }

    /// Coalesces overlapping or touching intervals.
    ///
    /// The result is sorted by start and pairwise disjoint with gaps between
    /// neighbours. Equal-start inputs collapse into one entry regardless of
    /// their input order.
    pub fn merge<I>(intervals: I) -> Vec<Interval>
    where
        I: IntoIterator<Item = Interval>,
    {
        let mut sorted: Vec<Interval> = intervals.into_iter().collect();
        sorted.sort_by_key(|interval| (interval.start, interval.end));

        let mut merged: Vec<Interval> = Vec::with_capacity(sorted.len());
        for next in sorted {
            match merged.last_mut() {
                Some(current) if next.start <= current.end => {
                    current.end = current.end.max(next.end);
                }
                _ => merged.push(next),
            }
        }
        merged
    }
}

impl fmt::Display for Interval {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}, {})", self.start, self.end)
    }
}
