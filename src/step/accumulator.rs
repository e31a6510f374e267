//! Per-meter step accumulators.
//!
//! Each accumulator holds the aggregate for the currently open step and
//! exposes `rollover()`, an indivisible read-and-reset that hands back the
//! frozen state of the step that just closed:
//!
//! - counters and gauges live in a single `AtomicU64` (f64 bits), so rollover
//!   is one `swap` / `load`
//! - distributions keep several fields that must reset together; writers
//!   update atomics under a shared read guard and rollover swaps the whole
//!   cell under the write guard, so the lock is held for the swap only

use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

const ZERO_BITS: u64 = 0; // 0.0_f64.to_bits()

fn add_f64(cell: &AtomicU64, delta: f64) {
    let _ = cell.fetch_update(Ordering::AcqRel, Ordering::Acquire, |bits| {
        Some((f64::from_bits(bits) + delta).to_bits())
    });
}

fn max_f64(cell: &AtomicU64, candidate: f64) {
    let _ = cell.fetch_update(Ordering::AcqRel, Ordering::Acquire, |bits| {
        (candidate > f64::from_bits(bits)).then(|| candidate.to_bits())
    });
}

/// Running sum of increments within one step
#[derive(Debug, Default)]
pub struct StepCounter {
    current: AtomicU64,
}

impl StepCounter {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add to the current step. Negative and non-finite amounts are ignored;
    /// a counter only moves forward.
    #[inline]
    pub fn increment(&self, amount: f64) {
        if amount.is_finite() && amount > 0.0 {
            add_f64(&self.current, amount);
        }
    }

    /// Value accumulated so far in the open step
    pub fn peek(&self) -> f64 {
        f64::from_bits(self.current.load(Ordering::Acquire))
    }

    pub fn rollover(&self) -> f64 {
        f64::from_bits(self.current.swap(ZERO_BITS, Ordering::AcqRel))
    }
}

/// Last-write-wins sample. A gauge keeps reporting its last value across
/// steps until it is set again; a gauge that was never set reports nothing.
#[derive(Debug)]
pub struct StepGauge {
    value: AtomicU64,
}

impl Default for StepGauge {
    fn default() -> Self {
        StepGauge {
            value: AtomicU64::new(f64::NAN.to_bits()),
        }
    }
}

impl StepGauge {
    pub fn new() -> Self {
        Self::default()
    }

    #[inline]
    pub fn set(&self, value: f64) {
        self.value.store(value.to_bits(), Ordering::Release);
    }

    pub fn rollover(&self) -> Option<f64> {
        let value = f64::from_bits(self.value.load(Ordering::Acquire));
        (!value.is_nan()).then_some(value)
    }
}

/// Frozen distribution statistics for one step
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DistributionSnapshot {
    pub count: u64,
    pub total: f64,
    pub max: f64,
    /// Cumulative counts: each entry counts samples `<= le`
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub buckets: Vec<BucketCount>,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct BucketCount {
    pub le: f64,
    pub count: u64,
}

impl DistributionSnapshot {
    pub fn empty(bounds: &[f64]) -> Self {
        DistributionSnapshot {
            count: 0,
            total: 0.0,
            max: 0.0,
            buckets: bounds.iter().map(|&le| BucketCount { le, count: 0 }).collect(),
        }
    }

    pub fn mean(&self) -> f64 {
        if self.count == 0 {
            0.0
        } else {
            self.total / self.count as f64
        }
    }
}

#[derive(Debug)]
struct DistributionCell {
    count: AtomicU64,
    total: AtomicU64,
    max: AtomicU64,
    buckets: Box<[AtomicU64]>,
}

impl DistributionCell {
    fn new(bucket_count: usize) -> Self {
        DistributionCell {
            count: AtomicU64::new(0),
            total: AtomicU64::new(ZERO_BITS),
            max: AtomicU64::new(ZERO_BITS),
            buckets: (0..bucket_count).map(|_| AtomicU64::new(0)).collect(),
        }
    }

    fn record(&self, value: f64, bounds: &[f64]) {
        self.count.fetch_add(1, Ordering::AcqRel);
        add_f64(&self.total, value);
        max_f64(&self.max, value);
        // samples above the last bound only show up in `count`
        let idx = bounds.partition_point(|&le| le < value);
        if let Some(bucket) = self.buckets.get(idx) {
            bucket.fetch_add(1, Ordering::AcqRel);
        }
    }

    fn freeze(self, bounds: &[f64]) -> DistributionSnapshot {
        let mut running = 0u64;
        let buckets = bounds
            .iter()
            .zip(self.buckets.iter())
            .map(|(&le, n)| {
                running += n.load(Ordering::Acquire);
                BucketCount { le, count: running }
            })
            .collect();

        DistributionSnapshot {
            count: self.count.into_inner(),
            total: f64::from_bits(self.total.into_inner()),
            max: f64::from_bits(self.max.into_inner()),
            buckets,
        }
    }
}

/// Count, total, max and bucketed histogram for timers and summaries
#[derive(Debug)]
pub struct StepDistribution {
    bounds: Arc<[f64]>,
    current: RwLock<DistributionCell>,
}

impl StepDistribution {
    pub fn new() -> Self {
        Self::with_buckets(Vec::new())
    }

    /// Bounds are sorted and de-duplicated; non-finite bounds are dropped.
    pub fn with_buckets(mut bounds: Vec<f64>) -> Self {
        bounds.retain(|b| b.is_finite());
        bounds.sort_by(f64::total_cmp);
        bounds.dedup();
        let bounds: Arc<[f64]> = bounds.into();
        StepDistribution {
            current: RwLock::new(DistributionCell::new(bounds.len())),
            bounds,
        }
    }

    pub fn bounds(&self) -> &[f64] {
        &self.bounds
    }

    /// Record one sample. Negative and non-finite samples are ignored.
    #[inline]
    pub fn record(&self, value: f64) {
        if !value.is_finite() || value < 0.0 {
            return;
        }
        self.current.read().record(value, &self.bounds);
    }

    pub fn rollover(&self) -> DistributionSnapshot {
        let fresh = DistributionCell::new(self.bounds.len());
        let closed = std::mem::replace(&mut *self.current.write(), fresh);
        closed.freeze(&self.bounds)
    }
}

impl Default for StepDistribution {
    fn default() -> Self {
        Self::new()
    }
}

/// What one meter contributed to a closed step
#[derive(Debug, Clone, PartialEq)]
pub enum FrozenState {
    Counter(f64),
    Gauge(Option<f64>),
    Timer(DistributionSnapshot),
    Summary(DistributionSnapshot),
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::thread;

    #[test]
    fn test_counter_rollover_resets() {
        let counter = StepCounter::new();
        counter.increment(1.0);
        counter.increment(2.5);
        assert_eq!(counter.peek(), 3.5);

        assert_eq!(counter.rollover(), 3.5);
        assert_eq!(counter.rollover(), 0.0);
    }

    #[test]
    fn test_counter_ignores_negative_and_nan() {
        let counter = StepCounter::new();
        counter.increment(-4.0);
        counter.increment(f64::NAN);
        counter.increment(f64::INFINITY);
        counter.increment(2.0);
        assert_eq!(counter.rollover(), 2.0);
    }

    #[test]
    fn test_gauge_last_write_wins_and_persists() {
        let gauge = StepGauge::new();
        assert_eq!(gauge.rollover(), None);

        gauge.set(3.0);
        gauge.set(7.0);
        assert_eq!(gauge.rollover(), Some(7.0));
        assert_eq!(gauge.rollover(), Some(7.0));
    }

    #[test]
    fn test_distribution_stats_and_cumulative_buckets() {
        let dist = StepDistribution::with_buckets(vec![10.0, 1.0, 100.0, 10.0]);
        assert_eq!(dist.bounds(), &[1.0, 10.0, 100.0]);

        for v in [0.5, 1.0, 5.0, 50.0, 500.0] {
            dist.record(v);
        }
        dist.record(-1.0);

        let snap = dist.rollover();
        assert_eq!(snap.count, 5);
        assert_eq!(snap.total, 556.5);
        assert_eq!(snap.max, 500.0);
        assert_eq!(
            snap.buckets,
            vec![
                BucketCount { le: 1.0, count: 2 },
                BucketCount { le: 10.0, count: 3 },
                BucketCount { le: 100.0, count: 4 },
            ]
        );
        assert!((snap.mean() - 111.3).abs() < 1e-9);

        let next = dist.rollover();
        assert_eq!(next, DistributionSnapshot::empty(&[1.0, 10.0, 100.0]));
        assert_eq!(next.mean(), 0.0);
    }

    #[test]
    fn test_concurrent_increments_split_across_rollover() {
        let counter = Arc::new(StepCounter::new());
        let writers: Vec<_> = (0..4)
            .map(|_| {
                let c = counter.clone();
                thread::spawn(move || {
                    for _ in 0..10_000 {
                        c.increment(1.0);
                    }
                })
            })
            .collect();

        let mut seen = 0.0;
        for _ in 0..50 {
            seen += counter.rollover();
            thread::yield_now();
        }
        for w in writers {
            w.join().unwrap();
        }
        seen += counter.rollover();

        assert_eq!(seen, 40_000.0);
    }

    #[test]
    fn test_concurrent_distribution_records_split_across_rollover() {
        let dist = Arc::new(StepDistribution::with_buckets(vec![1.0]));
        let writers: Vec<_> = (0..4)
            .map(|_| {
                let d = dist.clone();
                thread::spawn(move || {
                    for _ in 0..5_000 {
                        d.record(1.0);
                    }
                })
            })
            .collect();

        let mut count = 0;
        let mut total = 0.0;
        let mut bucketed = 0;
        for _ in 0..50 {
            let snap = dist.rollover();
            count += snap.count;
            total += snap.total;
            bucketed += snap.buckets[0].count;
            thread::yield_now();
        }
        for w in writers {
            w.join().unwrap();
        }
        let last = dist.rollover();

        assert_eq!(count + last.count, 20_000);
        assert_eq!(total + last.total, 20_000.0);
        assert_eq!(bucketed + last.buckets[0].count, 20_000);
    }
}
