//! Manually advanced clock for deterministic tests.
//!
//! Time only moves when a test calls [`MockClock::advance`] or
//! [`MockClock::set`]. Tasks parked in [`Clock::sleep_until`] are woken on
//! every advance and re-check their deadline.

use super::{Clock, Timestamp};
use futures::future::BoxFuture;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;
use tokio::sync::Notify;

#[derive(Debug, Default)]
pub struct MockClock {
    now_ms: AtomicU64,
    advanced: Notify,
}

impl MockClock {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn starting_at(start: Timestamp) -> Self {
        MockClock {
            now_ms: AtomicU64::new(start.0),
            advanced: Notify::new(),
        }
    }

    /// Move time forward and wake any sleepers
    pub fn advance(&self, by: Duration) {
        let by_ms = u64::try_from(by.as_millis()).unwrap_or(u64::MAX);
        self.now_ms.fetch_add(by_ms, Ordering::SeqCst);
        self.advanced.notify_waiters();
    }

    /// Jump to an absolute time. Moving backwards is allowed; it models a
    /// stepped wall clock.
    pub fn set(&self, to: Timestamp) {
        self.now_ms.store(to.0, Ordering::SeqCst);
        self.advanced.notify_waiters();
    }
}

impl Clock for MockClock {
    fn now(&self) -> Timestamp {
        Timestamp(self.now_ms.load(Ordering::SeqCst))
    }

    fn monotonic(&self) -> Duration {
        Duration::from_millis(self.now_ms.load(Ordering::SeqCst))
    }

    fn sleep_until(&self, deadline: Timestamp) -> BoxFuture<'_, ()> {
        Box::pin(async move {
            loop {
                // Register before checking so an advance between the check
                // and the await is not missed.
                let advanced = self.advanced.notified();
                if self.now() >= deadline {
                    return;
                }
                advanced.await;
            }
        })
    }
}
