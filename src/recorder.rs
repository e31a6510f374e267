//! Meta-Metrics Recorder
//!
//! The pipeline reports on itself (batches sent, retries, dropped cycles,
//! missed steps) through this trait rather than through its own registry,
//! so a failing backend can never feed back into the data it is failing to
//! ship.
//!
//! - Production: [`NoopMetrics`], or the DogStatsD client behind the
//!   `datadog` feature
//! - Simulation: [`SimulatedMetrics`] records everything for assertions

use parking_lot::Mutex;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

/// Trait for recording metrics about the publishing pipeline itself
pub trait MetricsRecorder: Send + Sync + 'static {
    /// Increment a counter by 1
    fn incr(&self, name: &str, tags: &[&str]);

    /// Record a histogram/distribution value
    fn histogram(&self, name: &str, value: f64, tags: &[&str]);

    /// Set a gauge value
    fn gauge(&self, name: &str, value: f64, tags: &[&str]);

    /// Record a timing in milliseconds
    fn timing(&self, name: &str, duration_ms: f64, tags: &[&str]);

    // Convenience methods with default implementations

    /// One batch reached a final outcome (success, dropped, fatal, abandoned)
    fn record_batch(&self, outcome: &str, points: usize) {
        let outcome_tag = format!("outcome:{}", outcome);
        self.incr("publish.batch", &[&outcome_tag]);
        self.histogram("publish.batch.points", points as f64, &[&outcome_tag]);
    }

    /// A batch attempt failed transiently and will be retried
    fn record_retry(&self, attempt: u32) {
        let attempt_tag = format!("attempt:{}", attempt);
        self.incr("publish.retry", &[&attempt_tag]);
    }

    /// A publish cycle finished (success, degraded, fatal)
    fn record_cycle(&self, outcome: &str, duration_ms: f64) {
        let outcome_tag = format!("outcome:{}", outcome);
        self.incr("publish.cycle", &[&outcome_tag]);
        self.timing("publish.cycle.duration", duration_ms, &[&outcome_tag]);
    }

    /// Step boundaries passed without their own rollover
    fn record_step_gap(&self, missed_steps: u64) {
        if missed_steps > 0 {
            self.incr("step.gap", &[]);
            self.histogram("step.gap.missed", missed_steps as f64, &[]);
        }
    }

    /// A publish cycle was dropped because too many were in flight
    fn record_skipped_cycle(&self) {
        self.incr("publish.skipped", &[]);
    }

    /// Number of meters in the registry at rollover
    fn set_meter_count(&self, count: usize) {
        self.gauge("registry.meters", count as f64, &[]);
    }
}

/// No-op metrics recorder - zero overhead when meta-metrics are disabled
#[derive(Clone, Default)]
pub struct NoopMetrics;

impl MetricsRecorder for NoopMetrics {
    #[inline]
    fn incr(&self, _name: &str, _tags: &[&str]) {}
    #[inline]
    fn histogram(&self, _name: &str, _value: f64, _tags: &[&str]) {}
    #[inline]
    fn gauge(&self, _name: &str, _value: f64, _tags: &[&str]) {}
    #[inline]
    fn timing(&self, _name: &str, _duration_ms: f64, _tags: &[&str]) {}
}

/// Recorded metric for testing/simulation
#[derive(Debug, Clone)]
pub struct RecordedMetric {
    pub name: String,
    pub value: f64,
    pub tags: Vec<String>,
    pub metric_type: MetricType,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MetricType {
    Counter,
    Histogram,
    Gauge,
    Timing,
}

/// Simulated metrics recorder - records all metrics for verification
#[derive(Default)]
pub struct SimulatedMetrics {
    recorded: Mutex<Vec<RecordedMetric>>,
    retry_count: AtomicU64,
    step_gaps: AtomicU64,
    skipped_cycles: AtomicU64,
}

impl SimulatedMetrics {
    pub fn new() -> Self {
        Self::default()
    }

    /// Get all recorded metrics
    pub fn get_recorded(&self) -> Vec<RecordedMetric> {
        self.recorded.lock().clone()
    }

    /// Get metrics by name
    pub fn get_by_name(&self, name: &str) -> Vec<RecordedMetric> {
        self.recorded
            .lock()
            .iter()
            .filter(|m| m.name == name)
            .cloned()
            .collect()
    }

    /// Number of counter increments for `name` carrying `tag`
    pub fn count_with_tag(&self, name: &str, tag: &str) -> usize {
        self.recorded
            .lock()
            .iter()
            .filter(|m| {
                m.metric_type == MetricType::Counter
                    && m.name == name
                    && m.tags.iter().any(|t| t == tag)
            })
            .count()
    }

    pub fn retry_count(&self) -> u64 {
        self.retry_count.load(Ordering::SeqCst)
    }

    /// Total boundaries missed across all gaps
    pub fn step_gaps(&self) -> u64 {
        self.step_gaps.load(Ordering::SeqCst)
    }

    pub fn skipped_cycles(&self) -> u64 {
        self.skipped_cycles.load(Ordering::SeqCst)
    }

    /// Clear all recorded metrics
    pub fn clear(&self) {
        self.recorded.lock().clear();
        self.retry_count.store(0, Ordering::SeqCst);
        self.step_gaps.store(0, Ordering::SeqCst);
        self.skipped_cycles.store(0, Ordering::SeqCst);
    }

    /// Whether a metric with this name and type was recorded
    pub fn assert_metric(&self, name: &str, metric_type: MetricType) -> bool {
        self.recorded
            .lock()
            .iter()
            .any(|m| m.name == name && m.metric_type == metric_type)
    }

    fn push(&self, name: &str, value: f64, tags: &[&str], metric_type: MetricType) {
        self.recorded.lock().push(RecordedMetric {
            name: name.to_string(),
            value,
            tags: tags.iter().map(|s| s.to_string()).collect(),
            metric_type,
        });
    }
}

impl MetricsRecorder for SimulatedMetrics {
    fn incr(&self, name: &str, tags: &[&str]) {
        self.push(name, 1.0, tags, MetricType::Counter);
    }

    fn histogram(&self, name: &str, value: f64, tags: &[&str]) {
        self.push(name, value, tags, MetricType::Histogram);
    }

    fn gauge(&self, name: &str, value: f64, tags: &[&str]) {
        self.push(name, value, tags, MetricType::Gauge);
    }

    fn timing(&self, name: &str, duration_ms: f64, tags: &[&str]) {
        self.push(name, duration_ms, tags, MetricType::Timing);
    }

    fn record_retry(&self, attempt: u32) {
        self.retry_count.fetch_add(1, Ordering::SeqCst);
        let attempt_tag = format!("attempt:{}", attempt);
        self.incr("publish.retry", &[&attempt_tag]);
    }

    fn record_step_gap(&self, missed_steps: u64) {
        if missed_steps > 0 {
            self.step_gaps.fetch_add(missed_steps, Ordering::SeqCst);
            self.incr("step.gap", &[]);
            self.histogram("step.gap.missed", missed_steps as f64, &[]);
        }
    }

    fn record_skipped_cycle(&self) {
        self.skipped_cycles.fetch_add(1, Ordering::SeqCst);
        self.incr("publish.skipped", &[]);
    }
}

/// Arc wrapper for trait object usage
pub type SharedMetrics = Arc<dyn MetricsRecorder>;

/// Create a no-op metrics recorder
pub fn noop_metrics() -> SharedMetrics {
    Arc::new(NoopMetrics)
}

/// Create a simulated metrics recorder for testing
pub fn simulated_metrics() -> Arc<SimulatedMetrics> {
    Arc::new(SimulatedMetrics::new())
}
