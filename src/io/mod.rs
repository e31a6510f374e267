//! Time Abstraction Layer for Deterministic Testing
//!
//! Every component that needs to know "what time is it" or "wake me at the
//! next step boundary" goes through the [`Clock`] trait, so the same pipeline
//! runs against the system clock in production and a manually advanced
//! [`MockClock`] in tests.

pub mod production;
pub mod simulation;

use futures::future::BoxFuture;
use serde::{Deserialize, Serialize};
use std::time::Duration;

pub use production::SystemClock;
pub use simulation::MockClock;

/// Wall-clock timestamp in milliseconds since the Unix epoch
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default, Serialize, Deserialize,
)]
#[serde(transparent)]
pub struct Timestamp(pub u64);

impl Timestamp {
    pub const ZERO: Timestamp = Timestamp(0);

    pub fn from_millis(ms: u64) -> Self {
        Timestamp(ms)
    }

    pub fn as_millis(&self) -> u64 {
        self.0
    }

    /// Start of the step containing this instant, for steps aligned to the epoch.
    pub fn step_floor(&self, step: Duration) -> Timestamp {
        let step_ms = step_millis(step);
        Timestamp(self.0 - self.0 % step_ms)
    }

    /// Time remaining until `later`, zero if `later` is already past.
    pub fn until(&self, later: Timestamp) -> Duration {
        Duration::from_millis(later.0.saturating_sub(self.0))
    }
}

impl std::ops::Add<Duration> for Timestamp {
    type Output = Timestamp;

    fn add(self, rhs: Duration) -> Self::Output {
        Timestamp(self.0.saturating_add(millis(rhs)))
    }
}

impl std::ops::Sub<Duration> for Timestamp {
    type Output = Timestamp;

    fn sub(self, rhs: Duration) -> Self::Output {
        Timestamp(self.0.saturating_sub(millis(rhs)))
    }
}

impl std::ops::Sub<Timestamp> for Timestamp {
    type Output = Duration;

    fn sub(self, rhs: Timestamp) -> Self::Output {
        Duration::from_millis(self.0.saturating_sub(rhs.0))
    }
}

impl std::fmt::Display for Timestamp {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}ms", self.0)
    }
}

/// Whole milliseconds in a duration, saturating at `u64::MAX`.
fn millis(d: Duration) -> u64 {
    u64::try_from(d.as_millis()).unwrap_or(u64::MAX)
}

/// Milliseconds in a step duration, never less than one.
pub(crate) fn step_millis(d: Duration) -> u64 {
    u64::try_from(d.as_millis()).unwrap_or(u64::MAX).max(1)
}

/// Clock abstraction for time operations
pub trait Clock: Send + Sync + 'static {
    /// Current wall-clock time
    fn now(&self) -> Timestamp;

    /// Monotonic time since an arbitrary, fixed origin
    fn monotonic(&self) -> Duration;

    /// Resolve once `now()` has reached `deadline`
    fn sleep_until(&self, deadline: Timestamp) -> BoxFuture<'_, ()>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_timestamp_arithmetic() {
        let t1 = Timestamp::from_millis(1000);
        let t2 = Timestamp::from_millis(500);
        let d = Duration::from_millis(200);

        assert_eq!(t1 + d, Timestamp::from_millis(1200));
        assert_eq!(t1 - d, Timestamp::from_millis(800));
        assert_eq!(t1 - t2, Duration::from_millis(500));
        assert_eq!(t2 - t1, Duration::ZERO);
    }

    #[test]
    fn test_offsets_are_not_rounded_up() {
        let t = Timestamp::from_millis(1000);

        assert_eq!(t + Duration::ZERO, t);
        assert_eq!(t - Duration::ZERO, t);
        assert_eq!(t + Duration::from_micros(900), t);
        assert_eq!(t + Duration::from_micros(1_900), Timestamp::from_millis(1001));
        assert_eq!(Timestamp(3) - Duration::from_millis(10), Timestamp::ZERO);
    }

    #[test]
    fn test_step_floor_aligns_to_epoch() {
        let step = Duration::from_millis(10);

        assert_eq!(Timestamp(0).step_floor(step), Timestamp(0));
        assert_eq!(Timestamp(9).step_floor(step), Timestamp(0));
        assert_eq!(Timestamp(10).step_floor(step), Timestamp(10));
        assert_eq!(Timestamp(61_234).step_floor(Duration::from_secs(60)), Timestamp(60_000));
    }

    #[test]
    fn test_until() {
        assert_eq!(Timestamp(5).until(Timestamp(12)), Duration::from_millis(7));
        assert_eq!(Timestamp(12).until(Timestamp(5)), Duration::ZERO);
    }
}
