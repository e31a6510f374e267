//! Step Registry
//!
//! Owns the meter table and wires the pipeline together:
//!
//! ```text
//! handles ──record──▶ accumulators
//! scheduler ──StepTick──▶ step loop ──rollover──▶ snapshot ──spawn──▶ publisher
//! ```
//!
//! The scheduler and the step loop are two tasks connected by a channel, so
//! wall-clock timing stays separate from step processing. Each publish cycle
//! runs in its own task; a slow backend never delays the next rollover.
//!
//! # Usage
//!
//! ```rust,ignore
//! let registry = StepRegistry::builder(RegistryConfig::new("https://ingest.example.com"))
//!     .transport(Arc::new(LoggingTransport))
//!     .build()?;
//! registry.start()?;
//!
//! let requests = registry.counter(MeterId::new("http.requests").with_tag("status", "200"));
//! requests.incr();
//!
//! registry.close().await;
//! ```

mod lifecycle;

pub use lifecycle::RegistryState;
pub(crate) use lifecycle::Lifecycle;

use crate::config::RegistryConfig;
use crate::error::{ConfigError, StepmeterError};
use crate::io::{step_millis, Clock, SystemClock, Timestamp};
use crate::meter::{Counter, DistributionSummary, Gauge, Meter, MeterId, MeterKind, Timer};
use crate::observability::spans;
use crate::publish::{BatchPublisher, CycleReport, LoggingTransport, Transport};
use crate::recorder::{noop_metrics, SharedMetrics};
use crate::step::{build_snapshot, Snapshot, StepScheduler, StepTick};
use parking_lot::{Mutex, RwLock};
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, Semaphore};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tokio_util::task::TaskTracker;
use tracing::{info, warn};

type MeterTable = HashMap<MeterId, Meter, ahash::RandomState>;

/// Ticks buffered between the scheduler and the step loop
const TICK_BUFFER: usize = 4;

pub struct RegistryBuilder {
    config: RegistryConfig,
    transport: Option<Arc<dyn Transport>>,
    clock: Option<Arc<dyn Clock>>,
    metrics: Option<SharedMetrics>,
    seed: Option<u64>,
}

impl RegistryBuilder {
    /// Defaults to [`LoggingTransport`] when not set
    pub fn transport(mut self, transport: Arc<dyn Transport>) -> Self {
        self.transport = Some(transport);
        self
    }

    /// Defaults to [`SystemClock`]
    pub fn clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = Some(clock);
        self
    }

    /// Meta-metrics sink; defaults to no-op
    pub fn metrics(mut self, metrics: SharedMetrics) -> Self {
        self.metrics = Some(metrics);
        self
    }

    /// Make retry jitter reproducible
    pub fn seed(mut self, seed: u64) -> Self {
        self.seed = Some(seed);
        self
    }

    pub fn build(self) -> Result<StepRegistry, ConfigError> {
        self.config.validate()?;

        let metrics = self.metrics.unwrap_or_else(noop_metrics);
        let transport = self
            .transport
            .unwrap_or_else(|| Arc::new(LoggingTransport));
        let mut publisher =
            BatchPublisher::new(transport, self.config.publish_policy(), metrics.clone());
        if let Some(seed) = self.seed {
            publisher = publisher.with_seed(seed);
        }

        let clock: Arc<dyn Clock> = self.clock.unwrap_or_else(|| Arc::new(SystemClock::new()));
        let current_step = clock.now().step_floor(self.config.step);

        let inner = Inner {
            permits: Arc::new(Semaphore::new(self.config.max_concurrent_publishes)),
            rolled_through: AtomicU64::new(current_step.as_millis()),
            clock,
            meters: RwLock::new(MeterTable::default()),
            lifecycle: Arc::new(Lifecycle::new()),
            publisher: Arc::new(publisher),
            metrics,
            publishes: TaskTracker::new(),
            cancel: CancellationToken::new(),
            started: AtomicBool::new(false),
            background: Mutex::new(Vec::new()),
            config: self.config,
        };

        Ok(StepRegistry {
            inner: Arc::new(inner),
        })
    }
}

struct Inner {
    config: RegistryConfig,
    clock: Arc<dyn Clock>,
    meters: RwLock<MeterTable>,
    lifecycle: Arc<Lifecycle>,
    publisher: Arc<BatchPublisher>,
    metrics: SharedMetrics,
    publishes: TaskTracker,
    permits: Arc<Semaphore>,
    cancel: CancellationToken,
    started: AtomicBool,
    /// Boundary (ms) that closes the last step rolled over by a tick
    rolled_through: AtomicU64,
    background: Mutex<Vec<JoinHandle<()>>>,
}

impl Inner {
    fn step(&self) -> Duration {
        self.config.step
    }

    /// Look up or create the meter for `id`. `None` means the caller gets a
    /// detached handle: disabled or stopped registry, or a kind conflict.
    fn meter(&self, id: MeterId, kind: MeterKind, buckets: Vec<f64>) -> Option<Meter> {
        if !self.config.enabled || !self.lifecycle.accepts_writes() {
            return None;
        }

        let existing = self.meters.read().get(&id).cloned();
        let meter = match existing {
            Some(meter) => meter,
            None => self
                .meters
                .write()
                .entry(id.clone())
                .or_insert_with(|| Meter::new(kind, buckets))
                .clone(),
        };

        if meter.kind() != kind {
            warn!(
                meter = %id,
                registered = %meter.kind(),
                requested = %kind,
                "Meter already registered with a different kind; returning a no-op handle"
            );
            return None;
        }
        Some(meter)
    }

    fn rollover(&self, step_start: Timestamp) -> Snapshot {
        let _span = spans::rollover_span(step_start.as_millis()).entered();
        let frozen: Vec<_> = {
            let meters = self.meters.read();
            self.metrics.set_meter_count(meters.len());
            meters
                .iter()
                .map(|(id, meter)| (id.clone(), meter.rollover()))
                .collect()
        };
        build_snapshot(step_start, self.step(), frozen)
    }

    /// Hand a snapshot to its own publish task, unless too many are in flight
    fn dispatch(&self, snapshot: Snapshot) {
        if snapshot.is_empty() {
            return;
        }
        let permit = match self.permits.clone().try_acquire_owned() {
            Ok(permit) => permit,
            Err(_) => {
                warn!(
                    step_start = %snapshot.step_start,
                    points = snapshot.len(),
                    "Too many publish cycles in flight; dropping this step"
                );
                self.metrics.record_skipped_cycle();
                return;
            }
        };

        let publisher = self.publisher.clone();
        self.publishes.spawn(async move {
            let _permit = permit;
            publisher.publish(&snapshot).await;
        });
    }

    /// Roll over the step in progress and publish it on the caller's task
    async fn flush_partial(&self) -> CycleReport {
        let step_start = self.clock.now().step_floor(self.step());
        let snapshot = self.rollover(step_start);
        self.publisher.publish(&snapshot).await
    }

    /// Roll over boundaries that passed without a tick being processed, under
    /// the start of the last closed step, and publish them inline.
    async fn flush_closed_steps(&self) {
        let current = self.clock.now().step_floor(self.step());
        let rolled = Timestamp(self.rolled_through.fetch_max(current.as_millis(), Ordering::AcqRel));
        if current <= rolled {
            return;
        }

        let missed_steps = (current - rolled).as_millis() as u64 / step_millis(self.step()) - 1;
        if missed_steps > 0 {
            warn!(
                missed_steps,
                step_start = %(current - self.step()),
                "Step boundaries missed before close; coalescing into one rollover"
            );
            self.metrics.record_step_gap(missed_steps);
        }

        let snapshot = self.rollover(current - self.step());
        if !snapshot.is_empty() {
            self.publisher.publish(&snapshot).await;
        }
    }

    fn take_background(&self) -> Vec<JoinHandle<()>> {
        std::mem::take(&mut *self.background.lock())
    }

    fn on_tick(&self, tick: StepTick) {
        self.rolled_through
            .fetch_max(tick.boundary.as_millis(), Ordering::AcqRel);
        let snapshot = self.rollover(tick.step_start);
        self.dispatch(snapshot);
    }
}

/// Drive rollovers from scheduler ticks until cancelled
async fn run_steps(inner: Arc<Inner>, mut ticks: mpsc::Receiver<StepTick>) {
    loop {
        let tick = tokio::select! {
            biased;
            _ = inner.cancel.cancelled() => break,
            tick = ticks.recv() => match tick {
                Some(tick) => tick,
                None => break,
            },
        };
        inner.on_tick(tick);
    }
}

/// Registry of step-aggregated meters. Cheap to clone; clones share state.
#[derive(Clone)]
pub struct StepRegistry {
    inner: Arc<Inner>,
}

impl StepRegistry {
    pub fn builder(config: RegistryConfig) -> RegistryBuilder {
        RegistryBuilder {
            config,
            transport: None,
            clock: None,
            metrics: None,
            seed: None,
        }
    }

    /// Validate `config` and build a registry with the given transport and clock
    pub fn new(
        config: RegistryConfig,
        transport: Arc<dyn Transport>,
        clock: Arc<dyn Clock>,
    ) -> Result<Self, ConfigError> {
        Self::builder(config).transport(transport).clock(clock).build()
    }

    /// Spawn the scheduler and step loop on the current tokio runtime.
    /// Calling it again, or on a disabled registry, does nothing.
    pub fn start(&self) -> Result<(), StepmeterError> {
        let inner = &self.inner;
        if !inner.config.enabled || inner.lifecycle.state() != RegistryState::Running {
            return Ok(());
        }
        let runtime = tokio::runtime::Handle::try_current().map_err(|_| StepmeterError::NoRuntime)?;
        if inner.started.swap(true, Ordering::AcqRel) {
            return Ok(());
        }

        let (tx, rx) = mpsc::channel(TICK_BUFFER);
        let scheduler = StepScheduler::new(inner.clock.clone(), inner.step(), inner.metrics.clone());
        let scheduler_task = runtime.spawn(scheduler.run(tx, inner.cancel.child_token()));
        let step_task = runtime.spawn(run_steps(inner.clone(), rx));
        inner.background.lock().extend([scheduler_task, step_task]);

        info!(step_ms = inner.step().as_millis() as u64, "Step registry started");
        Ok(())
    }

    pub fn config(&self) -> &RegistryConfig {
        &self.inner.config
    }

    pub fn state(&self) -> RegistryState {
        self.inner.lifecycle.state()
    }

    /// Number of registered meters
    pub fn len(&self) -> usize {
        self.inner.meters.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn counter(&self, id: impl Into<MeterId>) -> Counter {
        let meter = self.inner.meter(id.into(), MeterKind::Counter, Vec::new());
        let acc = match meter {
            Some(Meter::Counter(c)) => Some(c),
            _ => None,
        };
        Counter::new(acc, self.inner.lifecycle.clone())
    }

    pub fn gauge(&self, id: impl Into<MeterId>) -> Gauge {
        let meter = self.inner.meter(id.into(), MeterKind::Gauge, Vec::new());
        let acc = match meter {
            Some(Meter::Gauge(g)) => Some(g),
            _ => None,
        };
        Gauge::new(acc, self.inner.lifecycle.clone())
    }

    pub fn timer(&self, id: impl Into<MeterId>) -> Timer {
        self.timer_with_buckets(id, Vec::new())
    }

    /// Timer with histogram buckets at the given durations. Buckets only
    /// apply when this call creates the meter.
    pub fn timer_with_buckets(&self, id: impl Into<MeterId>, buckets: Vec<Duration>) -> Timer {
        let bounds = buckets
            .iter()
            .map(|d| d.as_nanos() as f64 / 1_000_000.0)
            .collect();
        let meter = self.inner.meter(id.into(), MeterKind::Timer, bounds);
        let acc = match meter {
            Some(Meter::Timer(d)) => Some(d),
            _ => None,
        };
        Timer::new(acc, self.inner.lifecycle.clone(), self.inner.clock.clone())
    }

    pub fn summary(&self, id: impl Into<MeterId>) -> DistributionSummary {
        self.summary_with_buckets(id, Vec::new())
    }

    pub fn summary_with_buckets(
        &self,
        id: impl Into<MeterId>,
        buckets: Vec<f64>,
    ) -> DistributionSummary {
        let meter = self
            .inner
            .meter(id.into(), MeterKind::DistributionSummary, buckets);
        let acc = match meter {
            Some(Meter::DistributionSummary(d)) => Some(d),
            _ => None,
        };
        DistributionSummary::new(acc, self.inner.lifecycle.clone())
    }

    /// Unregister a meter. Handles already held keep working but are no
    /// longer published; registering the id again starts from zero.
    pub fn remove(&self, id: &MeterId) -> bool {
        self.inner.meters.write().remove(id).is_some()
    }

    /// Roll every meter over and return the snapshot for the step starting at
    /// `step_start`, without publishing it.
    pub fn rollover(&self, step_start: Timestamp) -> Snapshot {
        self.inner.rollover(step_start)
    }

    /// Close the current, partial step now and publish it inline.
    ///
    /// The snapshot carries `step_start = floor(now)`. The scheduled tick at
    /// the end of that step publishes whatever is recorded afterwards under
    /// the same `step_start`, so the backend receives two points for the
    /// window whose values add up to the step's total.
    pub async fn publish_now(&self) -> Option<CycleReport> {
        let inner = &self.inner;
        if !inner.config.enabled || !inner.lifecycle.accepts_writes() {
            return None;
        }
        Some(inner.flush_partial().await)
    }

    /// Stop scheduling, publish any step whose boundary passed without a
    /// rollover, flush the partial step and wait for in-flight publishes, all
    /// bounded by `shutdown_timeout`. Later writes are
    /// silently discarded. Safe to call more than once.
    pub async fn close(&self) {
        let inner = &self.inner;
        if !inner.lifecycle.begin_drain() {
            return;
        }
        info!("Closing step registry");
        inner.cancel.cancel();

        let flush = async {
            for task in inner.take_background() {
                let _ = task.await;
            }

            if inner.config.enabled {
                inner.flush_closed_steps().await;
                inner.flush_partial().await;
            }

            inner.publishes.close();
            inner.publishes.wait().await;
        };

        if tokio::time::timeout(inner.config.shutdown_timeout, flush)
            .await
            .is_err()
        {
            warn!(
                timeout_ms = inner.config.shutdown_timeout.as_millis() as u64,
                "Final flush did not finish before the shutdown timeout"
            );
        }

        inner.lifecycle.stop();
        info!("Step registry stopped");
    }
}
