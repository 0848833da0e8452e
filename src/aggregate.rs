//! Per-interval bandwidth totals.

use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::collections::BTreeMap;

/// The start time of a reporting interval, usable as an ordered map key.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
#[serde(transparent)]
pub struct IntervalKey(pub f64);

impl IntervalKey {
    pub fn seconds(self) -> f64 {
        self.0
    }
}

impl From<f64> for IntervalKey {
    fn from(seconds: f64) -> Self {
        IntervalKey(seconds)
    }
}

impl PartialEq for IntervalKey {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == Ordering::Equal
    }
}

impl Eq for IntervalKey {}

impl PartialOrd for IntervalKey {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for IntervalKey {
    fn cmp(&self, other: &Self) -> Ordering {
        self.0.total_cmp(&other.0)
    }
}

/// One interval's combined bandwidth.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct IntervalBandwidth {
    pub start: f64,
    pub bandwidth: f64,
}

/// Bandwidth totals keyed by interval start. Unseen intervals read as zero.
#[derive(Debug, Clone, Default)]
pub struct IntervalTable {
    intervals: BTreeMap<IntervalKey, f64>,
}

impl IntervalTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds to the interval's running total.
    pub fn accumulate(&mut self, start: f64, bandwidth: f64) {
        *self.intervals.entry(IntervalKey(start)).or_insert(0.0) += bandwidth;
    }

    /// Replaces the interval's total.
    pub fn overwrite(&mut self, start: f64, bandwidth: f64) {
        self.intervals.insert(IntervalKey(start), bandwidth);
    }

    pub fn get(&self, start: f64) -> f64 {
        self.intervals
            .get(&IntervalKey(start))
            .copied()
            .unwrap_or(0.0)
    }

    pub fn len(&self) -> usize {
        self.intervals.len()
    }

    pub fn is_empty(&self) -> bool {
        self.intervals.is_empty()
    }

    pub fn clear(&mut self) {
        self.intervals.clear();
    }

    /// A snapshot of the totals in ascending interval order.
    pub fn bandwidths(&self) -> Bandwidths {
        let snapshot: Vec<IntervalBandwidth> = self
            .intervals
            .iter()
            .map(|(key, bandwidth)| IntervalBandwidth {
                start: key.seconds(),
                bandwidth: *bandwidth,
            })
            .collect();
        Bandwidths {
            inner: snapshot.into_iter(),
        }
    }
}

/// Ascending `(start, total)` pairs captured when
/// [`IntervalTable::bandwidths`] was called.
///
/// Later updates to the table do not show up here; ask the table again for a
/// fresh sequence.
#[derive(Debug, Clone)]
pub struct Bandwidths {
    inner: std::vec::IntoIter<IntervalBandwidth>,
}

impl Bandwidths {
    /// Just the totals, dropping the interval starts.
    pub fn values(self) -> impl Iterator<Item = f64> {
        self.map(|interval| interval.bandwidth)
    }
}

impl Iterator for Bandwidths {
    type Item = IntervalBandwidth;

    fn next(&mut self) -> Option<Self::Item> {
        self.inner.next()
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        self.inner.size_hint()
    }
}

impl ExactSizeIterator for Bandwidths {}
