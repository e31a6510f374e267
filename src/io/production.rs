//! Production clock backed by the OS wall clock and tokio timers.

use super::{Clock, Timestamp};
use futures::future::BoxFuture;
use std::time::{Duration, Instant, SystemTime, UNIX_EPOCH};

/// System clock: wall time from `SystemTime`, monotonic time from `Instant`.
#[derive(Debug, Clone)]
pub struct SystemClock {
    origin: Instant,
}

impl SystemClock {
    pub fn new() -> Self {
        SystemClock {
            origin: Instant::now(),
        }
    }
}

impl Default for SystemClock {
    fn default() -> Self {
        Self::new()
    }
}

impl Clock for SystemClock {
    fn now(&self) -> Timestamp {
        let ms = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| u64::try_from(d.as_millis()).unwrap_or(u64::MAX))
            .unwrap_or(0);
        Timestamp(ms)
    }

    fn monotonic(&self) -> Duration {
        self.origin.elapsed()
    }

    fn sleep_until(&self, deadline: Timestamp) -> BoxFuture<'_, ()> {
        Box::pin(async move {
            // Re-check after waking: the wall clock can be stepped while we sleep.
            loop {
                let remaining = self.now().until(deadline);
                if remaining.is_zero() {
                    return;
                }
                tokio::time::sleep(remaining).await;
            }
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_system_clock_is_after_epoch() {
        let clock = SystemClock::new();
        // 2020-01-01 in millis
        assert!(clock.now().as_millis() > 1_577_836_800_000);
    }

    #[test]
    fn test_monotonic_never_decreases() {
        let clock = SystemClock::new();
        let a = clock.monotonic();
        let b = clock.monotonic();
        assert!(b >= a);
    }

    #[tokio::test]
    async fn test_sleep_until_past_deadline_returns_immediately() {
        let clock = SystemClock::new();
        let past = clock.now() - Duration::from_secs(1);

        tokio::time::timeout(Duration::from_millis(100), clock.sleep_until(past))
            .await
            .expect("sleep_until in the past should resolve immediately");
    }
}
