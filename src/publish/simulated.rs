//! Scripted transport for deterministic tests.
//!
//! Each `send` consumes the next scripted outcome (falling back to a default
//! once the script runs dry), optionally waits a configured latency, and
//! logs the attempt so tests can assert on exactly what was transmitted.

use super::batch::Batch;
use super::transport::{SendOutcome, Transport};
use futures::future::BoxFuture;
use parking_lot::Mutex;
use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;
use tokio::sync::Notify;

/// One completed send attempt
#[derive(Debug, Clone)]
pub struct SentRecord {
    pub batch: Batch,
    pub outcome: SendOutcome,
}

pub struct SimulatedTransport {
    script: Mutex<VecDeque<SendOutcome>>,
    default_outcome: Mutex<SendOutcome>,
    latency: Mutex<Duration>,
    sent: Mutex<Vec<SentRecord>>,
    attempts: AtomicUsize,
    completed: Notify,
}

impl Default for SimulatedTransport {
    fn default() -> Self {
        SimulatedTransport {
            script: Mutex::new(VecDeque::new()),
            default_outcome: Mutex::new(SendOutcome::Success),
            latency: Mutex::new(Duration::ZERO),
            sent: Mutex::new(Vec::new()),
            attempts: AtomicUsize::new(0),
            completed: Notify::new(),
        }
    }
}

impl SimulatedTransport {
    /// Always succeeds
    pub fn new() -> Self {
        Self::default()
    }

    /// Plays `outcomes` in order, then succeeds
    pub fn with_script(outcomes: impl IntoIterator<Item = SendOutcome>) -> Self {
        let transport = Self::default();
        transport.script.lock().extend(outcomes);
        transport
    }

    pub fn push_outcome(&self, outcome: SendOutcome) {
        self.script.lock().push_back(outcome);
    }

    /// Outcome used once the script is exhausted
    pub fn set_default(&self, outcome: SendOutcome) {
        *self.default_outcome.lock() = outcome;
    }

    /// Delay every send by `latency` (tokio time)
    pub fn set_latency(&self, latency: Duration) {
        *self.latency.lock() = latency;
    }

    /// Sends started, including ones cut off by a timeout
    pub fn attempts(&self) -> usize {
        self.attempts.load(Ordering::SeqCst)
    }

    /// Sends that ran to completion
    pub fn sent(&self) -> Vec<SentRecord> {
        self.sent.lock().clone()
    }

    /// Batches acknowledged with success
    pub fn delivered(&self) -> Vec<Batch> {
        self.sent
            .lock()
            .iter()
            .filter(|r| r.outcome.is_success())
            .map(|r| r.batch.clone())
            .collect()
    }

    /// Wait until at least `n` batches have been delivered
    pub async fn wait_for_deliveries(&self, n: usize, timeout: Duration) -> bool {
        let wait = async {
            loop {
                let completed = self.completed.notified();
                if self.delivered().len() >= n {
                    return;
                }
                completed.await;
            }
        };
        tokio::time::timeout(timeout, wait).await.is_ok()
    }

    fn next_outcome(&self) -> SendOutcome {
        self.script
            .lock()
            .pop_front()
            .unwrap_or_else(|| self.default_outcome.lock().clone())
    }
}

impl Transport for SimulatedTransport {
    fn send<'a>(&'a self, batch: &'a Batch, _timeout: Duration) -> BoxFuture<'a, SendOutcome> {
        Box::pin(async move {
            self.attempts.fetch_add(1, Ordering::SeqCst);
            let outcome = self.next_outcome();

            let latency = *self.latency.lock();
            if !latency.is_zero() {
                tokio::time::sleep(latency).await;
            }

            self.sent.lock().push(SentRecord {
                batch: batch.clone(),
                outcome: outcome.clone(),
            });
            self.completed.notify_waiters();
            outcome
        })
    }
}
