//! Step Scheduler
//!
//! One timer task per registry. It sleeps until the next epoch-aligned step
//! boundary, posts a [`StepTick`] onto a channel and re-arms for
//! `boundary + step` (never `now + step`, so jitter does not accumulate).
//! A wake-up that lands past one or more later boundaries is coalesced into
//! a single tick and the gap is reported in `missed_steps`.

use crate::io::{step_millis, Clock, Timestamp};
use crate::recorder::SharedMetrics;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

/// A closed step, as seen by the scheduler
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StepTick {
    /// Start of the most recent closed step
    pub step_start: Timestamp,
    /// Boundary that closed it
    pub boundary: Timestamp,
    /// Boundaries that passed without a tick of their own
    pub missed_steps: u64,
}

pub struct StepScheduler {
    clock: Arc<dyn Clock>,
    step: Duration,
    metrics: SharedMetrics,
}

impl StepScheduler {
    pub fn new(clock: Arc<dyn Clock>, step: Duration, metrics: SharedMetrics) -> Self {
        StepScheduler {
            clock,
            step,
            metrics,
        }
    }

    /// First boundary strictly after `now`
    pub fn next_boundary(&self, now: Timestamp) -> Timestamp {
        now.step_floor(self.step) + self.step
    }

    /// The tick to emit when woken at `now` while aiming for `expected`
    pub fn tick_for(&self, expected: Timestamp, now: Timestamp) -> StepTick {
        let boundary = now.step_floor(self.step).max(expected);
        let missed_steps = (boundary - expected).as_millis() as u64 / step_millis(self.step);
        StepTick {
            step_start: boundary - self.step,
            boundary,
            missed_steps,
        }
    }

    /// Emit ticks until cancelled or the receiver goes away
    pub async fn run(self, ticks: mpsc::Sender<StepTick>, cancel: CancellationToken) {
        let mut next = self.next_boundary(self.clock.now());
        debug!(first_boundary = %next, step_ms = step_millis(self.step), "Step scheduler started");

        loop {
            tokio::select! {
                biased;
                _ = cancel.cancelled() => break,
                _ = self.clock.sleep_until(next) => {}
            }

            let tick = self.tick_for(next, self.clock.now());
            if tick.missed_steps > 0 {
                warn!(
                    missed_steps = tick.missed_steps,
                    step_start = %tick.step_start,
                    "Step boundaries missed; coalescing into one rollover"
                );
                self.metrics.record_step_gap(tick.missed_steps);
            }

            if ticks.send(tick).await.is_err() {
                break;
            }
            next = tick.boundary + self.step;
        }

        debug!("Step scheduler stopped");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::io::MockClock;
    use crate::recorder::{noop_metrics, simulated_metrics};

    fn scheduler(clock: Arc<MockClock>, step_ms: u64) -> StepScheduler {
        StepScheduler::new(clock, Duration::from_millis(step_ms), noop_metrics())
    }

    #[test]
    fn test_next_boundary_is_epoch_aligned() {
        let s = scheduler(Arc::new(MockClock::new()), 10);
        assert_eq!(s.next_boundary(Timestamp(0)), Timestamp(10));
        assert_eq!(s.next_boundary(Timestamp(7)), Timestamp(10));
        assert_eq!(s.next_boundary(Timestamp(10)), Timestamp(20));
    }

    #[test]
    fn test_tick_for_on_time_and_late() {
        let s = scheduler(Arc::new(MockClock::new()), 10);

        let on_time = s.tick_for(Timestamp(10), Timestamp(13));
        assert_eq!(
            on_time,
            StepTick {
                step_start: Timestamp(0),
                boundary: Timestamp(10),
                missed_steps: 0
            }
        );

        let late = s.tick_for(Timestamp(10), Timestamp(42));
        assert_eq!(late.boundary, Timestamp(40));
        assert_eq!(late.step_start, Timestamp(30));
        assert_eq!(late.missed_steps, 3);
    }

    #[tokio::test]
    async fn test_run_emits_aligned_ticks_and_reports_gaps() {
        let clock = Arc::new(MockClock::starting_at(Timestamp(3)));
        let metrics = simulated_metrics();
        let s = StepScheduler::new(clock.clone(), Duration::from_millis(10), metrics.clone());
        let (tx, mut rx) = mpsc::channel(8);
        let cancel = CancellationToken::new();
        let task = tokio::spawn(s.run(tx, cancel.clone()));
        tokio::task::yield_now().await;

        clock.set(Timestamp(11));
        let first = rx.recv().await.unwrap();
        assert_eq!(first.step_start, Timestamp(0));
        assert_eq!(first.missed_steps, 0);

        // Suspended across three boundaries: 20, 30, 40
        clock.set(Timestamp(45));
        let second = rx.recv().await.unwrap();
        assert_eq!(second.boundary, Timestamp(40));
        assert_eq!(second.missed_steps, 2);
        assert_eq!(metrics.step_gaps(), 2);

        clock.set(Timestamp(50));
        let third = rx.recv().await.unwrap();
        assert_eq!(third.step_start, Timestamp(40));
        assert_eq!(third.missed_steps, 0);

        cancel.cancel();
        tokio::time::timeout(Duration::from_secs(1), task)
            .await
            .expect("scheduler should stop on cancel")
            .unwrap();
    }
}
