use crate::io::Clock;
use crate::registry::Lifecycle;
use crate::step::{StepCounter, StepDistribution, StepGauge};
use std::sync::Arc;
use std::time::Duration;

/// Returns the accumulator if the handle is live and the registry still
/// accepts writes.
#[inline]
fn live<'a, T>(inner: &'a Option<Arc<T>>, lifecycle: &Lifecycle) -> Option<&'a Arc<T>> {
    inner.as_ref().filter(|_| lifecycle.accepts_writes())
}

#[derive(Clone)]
pub struct Counter {
    inner: Option<Arc<StepCounter>>,
    lifecycle: Arc<Lifecycle>,
}

impl Counter {
    pub(crate) fn new(inner: Option<Arc<StepCounter>>, lifecycle: Arc<Lifecycle>) -> Self {
        Counter { inner, lifecycle }
    }

    #[inline]
    pub fn increment(&self, amount: f64) {
        if let Some(c) = live(&self.inner, &self.lifecycle) {
            c.increment(amount);
        }
    }

    #[inline]
    pub fn incr(&self) {
        self.increment(1.0);
    }

    /// False for detached handles (disabled registry or kind conflict)
    pub fn is_live(&self) -> bool {
        live(&self.inner, &self.lifecycle).is_some()
    }
}

#[derive(Clone)]
pub struct Gauge {
    inner: Option<Arc<StepGauge>>,
    lifecycle: Arc<Lifecycle>,
}

impl Gauge {
    pub(crate) fn new(inner: Option<Arc<StepGauge>>, lifecycle: Arc<Lifecycle>) -> Self {
        Gauge { inner, lifecycle }
    }

    #[inline]
    pub fn set(&self, value: f64) {
        if let Some(g) = live(&self.inner, &self.lifecycle) {
            g.set(value);
        }
    }

    pub fn is_live(&self) -> bool {
        live(&self.inner, &self.lifecycle).is_some()
    }
}

/// Records durations. Totals and maxima are kept in milliseconds.
#[derive(Clone)]
pub struct Timer {
    inner: Option<Arc<StepDistribution>>,
    lifecycle: Arc<Lifecycle>,
    clock: Arc<dyn Clock>,
}

impl Timer {
    pub(crate) fn new(
        inner: Option<Arc<StepDistribution>>,
        lifecycle: Arc<Lifecycle>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Timer {
            inner,
            lifecycle,
            clock,
        }
    }

    #[inline]
    pub fn record(&self, duration: Duration) {
        self.record_ms(duration.as_nanos() as f64 / 1_000_000.0);
    }

    #[inline]
    pub fn record_ms(&self, millis: f64) {
        if let Some(d) = live(&self.inner, &self.lifecycle) {
            d.record(millis);
        }
    }

    /// Start timing; the elapsed time is recorded when the sample is dropped
    pub fn start(&self) -> TimerSample {
        TimerSample {
            timer: self.clone(),
            start: self.clock.monotonic(),
        }
    }

    /// Time a closure
    pub fn time<R>(&self, f: impl FnOnce() -> R) -> R {
        let _sample = self.start();
        f()
    }

    pub fn is_live(&self) -> bool {
        live(&self.inner, &self.lifecycle).is_some()
    }
}

/// RAII timer that records duration when dropped
pub struct TimerSample {
    timer: Timer,
    start: Duration,
}

impl TimerSample {
    pub fn elapsed(&self) -> Duration {
        self.timer.clock.monotonic().saturating_sub(self.start)
    }
}

impl Drop for TimerSample {
    fn drop(&mut self) {
        self.timer.record(self.elapsed());
    }
}

/// Records arbitrary non-negative amounts (payload sizes, batch lengths, ...)
#[derive(Clone)]
pub struct DistributionSummary {
    inner: Option<Arc<StepDistribution>>,
    lifecycle: Arc<Lifecycle>,
}

impl DistributionSummary {
    pub(crate) fn new(inner: Option<Arc<StepDistribution>>, lifecycle: Arc<Lifecycle>) -> Self {
        DistributionSummary { inner, lifecycle }
    }

    #[inline]
    pub fn record(&self, amount: f64) {
        if let Some(d) = live(&self.inner, &self.lifecycle) {
            d.record(amount);
        }
    }

    pub fn is_live(&self) -> bool {
        live(&self.inner, &self.lifecycle).is_some()
    }
}
