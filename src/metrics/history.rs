//! Bounded in-memory metric history
//!
//! Every category keeps its snapshots in a ring buffer with a fixed capacity.
//! When the buffer is full, the oldest snapshot is evicted.
//!
//! ## Limitations
//!
//! - **No persistence**: all data is lost on restart
//! - **Limited capacity**: only the most recent `capacity` snapshots are available

use std::collections::VecDeque;

use serde::{Deserialize, Serialize};

use super::{ConnectionSnapshot, DeliverySnapshot, PerformanceSnapshot, Snapshot};

/// Relative change between the two halves of a series that counts as a trend
const TREND_THRESHOLD: f64 = 0.05;

/// Baselines closer to zero than this never report a trend
const TREND_BASELINE_EPSILON: f64 = 1e-9;

/// Fixed-capacity FIFO buffer
#[derive(Debug, Clone)]
pub struct RingBuffer<T> {
    items: VecDeque<T>,
    capacity: usize,
}

impl<T> RingBuffer<T> {
    /// A capacity of zero is bumped to one so `latest` always sees the last append
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            items: VecDeque::with_capacity(capacity),
            capacity,
        }
    }

    pub fn push(&mut self, item: T) {
        if self.items.len() == self.capacity {
            self.items.pop_front();
        }
        self.items.push_back(item);
    }

    pub fn last(&self) -> Option<&T> {
        self.items.back()
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Oldest first
    pub fn iter(&self) -> impl DoubleEndedIterator<Item = &T> {
        self.items.iter()
    }

    /// Drop everything but the newest `keep` items, returns how many were dropped
    pub fn trim(&mut self, keep: usize) -> usize {
        let excess = self.items.len().saturating_sub(keep);
        self.items.drain(..excess);
        excess
    }
}

impl<T: Clone> RingBuffer<T> {
    /// The newest `n` items, oldest first
    pub fn recent(&self, n: usize) -> Vec<T> {
        let skip = self.items.len().saturating_sub(n);
        self.items.iter().skip(skip).cloned().collect()
    }
}

/// Snapshot history for all three categories
#[derive(Debug, Clone)]
pub struct MetricHistory {
    delivery: RingBuffer<DeliverySnapshot>,
    connection: RingBuffer<ConnectionSnapshot>,
    performance: RingBuffer<PerformanceSnapshot>,
}

impl MetricHistory {
    pub fn new(capacity: usize) -> Self {
        Self {
            delivery: RingBuffer::new(capacity),
            connection: RingBuffer::new(capacity),
            performance: RingBuffer::new(capacity),
        }
    }

    pub fn append(&mut self, snapshot: impl Into<AnySnapshot>) {
        match snapshot.into() {
            AnySnapshot::Delivery(s) => self.delivery.push(s),
            AnySnapshot::Connection(s) => self.connection.push(s),
            AnySnapshot::Performance(s) => self.performance.push(s),
        }
    }

    /// Ring buffer for the category of `S`
    pub fn buffer<S: HistoryEntry>(&self) -> &RingBuffer<S> {
        S::buffer(self)
    }

    /// Most recent snapshot of a category, or the zero snapshot when there is none
    pub fn latest<S: HistoryEntry>(&self) -> S {
        self.buffer::<S>().last().cloned().unwrap_or_default()
    }

    pub fn recent<S: HistoryEntry>(&self, n: usize) -> Vec<S> {
        self.buffer::<S>().recent(n)
    }

    pub fn len<S: HistoryEntry>(&self) -> usize {
        self.buffer::<S>().len()
    }

    pub fn capacity(&self) -> usize {
        self.delivery.capacity()
    }

    /// Trim every category down to its newest `keep` snapshots
    pub fn trim(&mut self, keep: usize) -> usize {
        self.delivery.trim(keep) + self.connection.trim(keep) + self.performance.trim(keep)
    }
}

/// Owned snapshot of any category, for [`MetricHistory::append`]
#[derive(Debug, Clone)]
pub enum AnySnapshot {
    Delivery(DeliverySnapshot),
    Connection(ConnectionSnapshot),
    Performance(PerformanceSnapshot),
}

impl From<DeliverySnapshot> for AnySnapshot {
    fn from(snapshot: DeliverySnapshot) -> Self {
        AnySnapshot::Delivery(snapshot)
    }
}

impl From<ConnectionSnapshot> for AnySnapshot {
    fn from(snapshot: ConnectionSnapshot) -> Self {
        AnySnapshot::Connection(snapshot)
    }
}

impl From<PerformanceSnapshot> for AnySnapshot {
    fn from(snapshot: PerformanceSnapshot) -> Self {
        AnySnapshot::Performance(snapshot)
    }
}

/// Maps a snapshot type to its buffer inside [`MetricHistory`]
pub trait HistoryEntry: Snapshot {
    fn buffer(history: &MetricHistory) -> &RingBuffer<Self>;
}

impl HistoryEntry for DeliverySnapshot {
    fn buffer(history: &MetricHistory) -> &RingBuffer<Self> {
        &history.delivery
    }
}

impl HistoryEntry for ConnectionSnapshot {
    fn buffer(history: &MetricHistory) -> &RingBuffer<Self> {
        &history.connection
    }
}

impl HistoryEntry for PerformanceSnapshot {
    fn buffer(history: &MetricHistory) -> &RingBuffer<Self> {
        &history.performance
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Trend {
    Increasing,
    Decreasing,
    Stable,
}

/// Compare the mean of the first half of `values` against the mean of the second half
///
/// A change of more than 5% in either direction is a trend. Series shorter than two
/// values and series whose first half averages to zero are `Stable`.
pub fn trend(values: &[f64]) -> Trend {
    if values.len() < 2 {
        return Trend::Stable;
    }

    let (first, second) = values.split_at(values.len() / 2);
    let first_mean = mean(first);
    let second_mean = mean(second);

    if !first_mean.is_finite() || !second_mean.is_finite() {
        return Trend::Stable;
    }

    if first_mean.abs() < TREND_BASELINE_EPSILON {
        return Trend::Stable;
    }

    let change = (second_mean - first_mean) / first_mean.abs();
    if change > TREND_THRESHOLD {
        Trend::Increasing
    } else if change < -TREND_THRESHOLD {
        Trend::Decreasing
    } else {
        Trend::Stable
    }
}

fn mean(values: &[f64]) -> f64 {
    if values.is_empty() {
        return 0.0;
    }
    values.iter().sum::<f64>() / values.len() as f64
}

/// Summary of one metric over a series
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct MetricTrend {
    pub current: f64,
    pub average: f64,
    pub peak: f64,
    pub trend: Trend,
}

impl MetricTrend {
    pub fn from_values(values: &[f64]) -> Self {
        Self {
            current: values.last().copied().unwrap_or_default(),
            average: mean(values),
            peak: values.iter().copied().fold(0.0, f64::max),
            trend: trend(values),
        }
    }
}
