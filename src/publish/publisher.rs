//! Batch Publisher
//!
//! Ships one snapshot per publish cycle:
//!
//! 1. partition into size-bounded batches
//! 2. send each batch in order with a bounded timeout
//! 3. retry transient failures with backoff until the attempt budget is
//!    spent, then drop that batch and move on
//! 4. on a permanent failure, abandon the rest of the cycle
//!
//! Backoff state (attempt counters and the jitter RNG) lives in the cycle,
//! so concurrent cycles for different steps never stall each other.

use super::batch::{partition, Batch};
use super::retry::RetryPolicy;
use super::transport::{SendOutcome, Transport};
use crate::io::Timestamp;
use crate::observability::spans;
use crate::recorder::SharedMetrics;
use crate::step::Snapshot;
use rand::SeedableRng;
use rand_chacha::ChaCha8Rng;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::Instant;
use tracing::{debug, error, warn, Instrument};

/// Limits applied to every publish cycle
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PublishPolicy {
    pub max_items: usize,
    pub max_bytes: usize,
    /// Bound on a single send attempt
    pub timeout: Duration,
    pub retry: RetryPolicy,
}

impl Default for PublishPolicy {
    fn default() -> Self {
        PublishPolicy {
            max_items: 10_000,
            max_bytes: 1_000_000,
            timeout: Duration::from_secs(10),
            retry: RetryPolicy::default(),
        }
    }
}

/// Final state of one batch within a cycle
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BatchOutcome {
    Delivered,
    /// Retry budget exhausted; the data is lost
    Dropped(String),
    /// Permanent failure; ends the cycle
    Fatal(String),
    /// Never sent because an earlier batch failed fatally
    Abandoned,
}

impl BatchOutcome {
    pub fn as_str(&self) -> &'static str {
        match self {
            BatchOutcome::Delivered => "success",
            BatchOutcome::Dropped(_) => "dropped",
            BatchOutcome::Fatal(_) => "fatal",
            BatchOutcome::Abandoned => "abandoned",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BatchReport {
    pub index: usize,
    pub points: usize,
    pub attempts: u32,
    pub outcome: BatchOutcome,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CycleOutcome {
    /// Every batch delivered
    Success,
    /// Some batches dropped after exhausting retries
    Degraded,
    /// A batch failed permanently; later batches were abandoned
    Fatal,
}

impl CycleOutcome {
    pub fn as_str(&self) -> &'static str {
        match self {
            CycleOutcome::Success => "success",
            CycleOutcome::Degraded => "degraded",
            CycleOutcome::Fatal => "fatal",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CycleReport {
    pub step_start: Timestamp,
    pub outcome: CycleOutcome,
    pub batches: Vec<BatchReport>,
}

impl CycleReport {
    /// Send attempts made across all batches
    pub fn attempts(&self) -> u32 {
        self.batches.iter().map(|b| b.attempts).sum()
    }

    pub fn delivered(&self) -> usize {
        self.batches
            .iter()
            .filter(|b| b.outcome == BatchOutcome::Delivered)
            .count()
    }
}

pub struct BatchPublisher {
    transport: Arc<dyn Transport>,
    policy: PublishPolicy,
    metrics: SharedMetrics,
    seed: Option<u64>,
}

impl BatchPublisher {
    pub fn new(transport: Arc<dyn Transport>, policy: PublishPolicy, metrics: SharedMetrics) -> Self {
        BatchPublisher {
            transport,
            policy,
            metrics,
            seed: None,
        }
    }

    /// Seed the jitter RNG so backoff delays are reproducible
    pub fn with_seed(mut self, seed: u64) -> Self {
        self.seed = Some(seed);
        self
    }

    pub fn policy(&self) -> &PublishPolicy {
        &self.policy
    }

    pub async fn publish(&self, snapshot: &Snapshot) -> CycleReport {
        let started = Instant::now();
        let report = match partition(snapshot, self.policy.max_items, self.policy.max_bytes) {
            Ok(batches) => {
                let span = spans::publish_span(snapshot.step_start.as_millis(), batches.len());
                self.publish_batches(snapshot.step_start, &batches)
                    .instrument(span)
                    .await
            }
            Err(e) => {
                error!(step_start = %snapshot.step_start, error = %e, "Failed to encode snapshot");
                CycleReport {
                    step_start: snapshot.step_start,
                    outcome: CycleOutcome::Fatal,
                    batches: Vec::new(),
                }
            }
        };

        let elapsed_ms = started.elapsed().as_secs_f64() * 1000.0;
        self.metrics.record_cycle(report.outcome.as_str(), elapsed_ms);
        match report.outcome {
            CycleOutcome::Success => debug!(
                step_start = %report.step_start,
                batches = report.batches.len(),
                attempts = report.attempts(),
                "Publish cycle complete"
            ),
            outcome => warn!(
                step_start = %report.step_start,
                outcome = outcome.as_str(),
                delivered = report.delivered(),
                batches = report.batches.len(),
                "Publish cycle failed"
            ),
        }
        report
    }

    async fn publish_batches(&self, step_start: Timestamp, batches: &[Batch]) -> CycleReport {
        let mut rng = match self.seed {
            Some(seed) => ChaCha8Rng::seed_from_u64(seed ^ step_start.as_millis()),
            None => ChaCha8Rng::from_entropy(),
        };
        let mut outcome = CycleOutcome::Success;
        let mut reports = Vec::with_capacity(batches.len());

        for batch in batches {
            if outcome == CycleOutcome::Fatal {
                self.metrics.record_batch(BatchOutcome::Abandoned.as_str(), batch.len());
                reports.push(BatchReport {
                    index: batch.index,
                    points: batch.len(),
                    attempts: 0,
                    outcome: BatchOutcome::Abandoned,
                });
                continue;
            }

            let span = spans::batch_span(batch.index, batch.len());
            let report = self.send_with_retry(batch, &mut rng).instrument(span).await;
            match report.outcome {
                BatchOutcome::Fatal(_) => outcome = CycleOutcome::Fatal,
                BatchOutcome::Dropped(_) => outcome = CycleOutcome::Degraded,
                _ => {}
            }
            reports.push(report);
        }

        CycleReport {
            step_start,
            outcome,
            batches: reports,
        }
    }

    async fn send_with_retry(&self, batch: &Batch, rng: &mut ChaCha8Rng) -> BatchReport {
        let timeout = self.policy.timeout;
        let mut attempts = 0u32;

        let outcome = loop {
            attempts += 1;
            let result = match tokio::time::timeout(timeout, self.transport.send(batch, timeout)).await {
                Ok(result) => result,
                Err(_) => SendOutcome::Retryable(format!("timed out after {timeout:?}")),
            };

            match result {
                SendOutcome::Success => break BatchOutcome::Delivered,
                SendOutcome::Fatal(reason) => {
                    warn!(batch = batch.index, attempts, reason = %reason, "Batch rejected permanently");
                    break BatchOutcome::Fatal(reason);
                }
                SendOutcome::Retryable(reason) if attempts >= self.policy.retry.max_attempts => {
                    warn!(
                        batch = batch.index,
                        attempts,
                        points = batch.len(),
                        reason = %reason,
                        "Retry budget exhausted; dropping batch"
                    );
                    break BatchOutcome::Dropped(reason);
                }
                SendOutcome::Retryable(reason) => {
                    let delay = self.policy.retry.backoff(attempts, rng);
                    debug!(
                        batch = batch.index,
                        attempt = attempts,
                        delay_ms = delay.as_millis() as u64,
                        reason = %reason,
                        "Retrying batch"
                    );
                    self.metrics.record_retry(attempts);
                    tokio::time::sleep(delay).await;
                }
            }
        };

        self.metrics.record_batch(outcome.as_str(), batch.len());
        BatchReport {
            index: batch.index,
            points: batch.len(),
            attempts,
            outcome,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::meter::MeterId;
    use crate::publish::SimulatedTransport;
    use crate::recorder::{noop_metrics, simulated_metrics};
    use crate::step::{build_snapshot, FrozenState};

    fn snapshot(n: usize) -> Snapshot {
        build_snapshot(
            Timestamp(10),
            Duration::from_millis(10),
            (0..n).map(|i| (MeterId::new(format!("m{i}")), FrozenState::Counter(1.0))),
        )
    }

    fn policy(max_items: usize, max_attempts: u32) -> PublishPolicy {
        PublishPolicy {
            max_items,
            max_bytes: 1_000_000,
            timeout: Duration::from_millis(50),
            retry: RetryPolicy {
                max_attempts,
                base_delay: Duration::from_millis(10),
                max_delay: Duration::from_millis(100),
                jitter: 0.0,
            },
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_empty_snapshot_is_a_successful_noop() {
        let transport = Arc::new(SimulatedTransport::new());
        let publisher = BatchPublisher::new(transport.clone(), policy(10, 3), noop_metrics());

        let report = publisher.publish(&snapshot(0)).await;
        assert_eq!(report.outcome, CycleOutcome::Success);
        assert!(report.batches.is_empty());
        assert_eq!(transport.attempts(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_retry_backoff_is_exponential() {
        let transport = Arc::new(SimulatedTransport::with_script([
            SendOutcome::Retryable("503".into()),
            SendOutcome::Retryable("503".into()),
        ]));
        let publisher = BatchPublisher::new(transport.clone(), policy(10, 3), noop_metrics());

        let started = Instant::now();
        let report = publisher.publish(&snapshot(1)).await;

        assert_eq!(report.outcome, CycleOutcome::Success);
        assert_eq!(report.attempts(), 3);
        // 10ms after the first failure, 20ms after the second
        let waited = started.elapsed();
        assert!(waited >= Duration::from_millis(30), "{waited:?}");
        assert!(waited < Duration::from_millis(40), "{waited:?}");
    }

    #[tokio::test(start_paused = true)]
    async fn test_timeout_counts_as_retryable() {
        let transport = Arc::new(SimulatedTransport::new());
        transport.set_latency(Duration::from_secs(1));
        let metrics = simulated_metrics();
        let publisher = BatchPublisher::new(transport.clone(), policy(10, 2), metrics.clone());

        let report = publisher.publish(&snapshot(1)).await;

        assert_eq!(report.outcome, CycleOutcome::Degraded);
        assert_eq!(report.batches[0].attempts, 2);
        assert!(matches!(report.batches[0].outcome, BatchOutcome::Dropped(ref r) if r.contains("timed out")));
        assert!(transport.delivered().is_empty());
        assert_eq!(metrics.count_with_tag("publish.batch", "outcome:dropped"), 1);
        assert_eq!(metrics.count_with_tag("publish.cycle", "outcome:degraded"), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_dropped_batch_does_not_stop_the_cycle() {
        let transport = Arc::new(SimulatedTransport::with_script([
            SendOutcome::Retryable("conn reset".into()),
            SendOutcome::Retryable("conn reset".into()),
            SendOutcome::Success,
        ]));
        let publisher = BatchPublisher::new(transport.clone(), policy(1, 2), noop_metrics());

        let report = publisher.publish(&snapshot(2)).await;

        assert_eq!(report.outcome, CycleOutcome::Degraded);
        assert!(matches!(report.batches[0].outcome, BatchOutcome::Dropped(_)));
        assert_eq!(report.batches[1].outcome, BatchOutcome::Delivered);
        assert_eq!(transport.delivered().len(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_retries_resend_identical_payload() {
        let transport = Arc::new(SimulatedTransport::with_script([SendOutcome::Retryable(
            "503".into(),
        )]));
        let publisher = BatchPublisher::new(transport.clone(), policy(10, 3), noop_metrics());

        publisher.publish(&snapshot(3)).await;

        let sent = transport.sent();
        assert_eq!(sent.len(), 2);
        assert_eq!(sent[0].batch.payload, sent[1].batch.payload);
    }
}
