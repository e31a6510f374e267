//! Meters and the handles applications record through.
//!
//! A [`Meter`] is the registry's tagged union over the four accumulator
//! kinds. Applications never see it directly; they get a typed handle
//! ([`Counter`], [`Gauge`], [`Timer`], [`DistributionSummary`]) whose methods
//! are infallible and become no-ops once the owning registry has stopped.

mod handles;
mod id;

pub use handles::{Counter, DistributionSummary, Gauge, Timer, TimerSample};
pub use id::{MeterId, MeterKind};

use crate::step::{FrozenState, StepCounter, StepDistribution, StepGauge};
use std::sync::Arc;

#[derive(Debug, Clone)]
pub enum Meter {
    Counter(Arc<StepCounter>),
    Gauge(Arc<StepGauge>),
    Timer(Arc<StepDistribution>),
    DistributionSummary(Arc<StepDistribution>),
}

impl Meter {
    pub fn new(kind: MeterKind, buckets: Vec<f64>) -> Self {
        match kind {
            MeterKind::Counter => Meter::Counter(Arc::new(StepCounter::new())),
            MeterKind::Gauge => Meter::Gauge(Arc::new(StepGauge::new())),
            MeterKind::Timer => Meter::Timer(Arc::new(StepDistribution::with_buckets(buckets))),
            MeterKind::DistributionSummary => {
                Meter::DistributionSummary(Arc::new(StepDistribution::with_buckets(buckets)))
            }
        }
    }

    pub fn kind(&self) -> MeterKind {
        match self {
            Meter::Counter(_) => MeterKind::Counter,
            Meter::Gauge(_) => MeterKind::Gauge,
            Meter::Timer(_) => MeterKind::Timer,
            Meter::DistributionSummary(_) => MeterKind::DistributionSummary,
        }
    }

    /// Close the open step and return what it accumulated
    pub fn rollover(&self) -> FrozenState {
        match self {
            Meter::Counter(c) => FrozenState::Counter(c.rollover()),
            Meter::Gauge(g) => FrozenState::Gauge(g.rollover()),
            Meter::Timer(d) => FrozenState::Timer(d.rollover()),
            Meter::DistributionSummary(d) => FrozenState::Summary(d.rollover()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_kind_matches_variant() {
        for kind in [
            MeterKind::Counter,
            MeterKind::Gauge,
            MeterKind::Timer,
            MeterKind::DistributionSummary,
        ] {
            assert_eq!(Meter::new(kind, Vec::new()).kind(), kind);
        }
    }

    #[test]
    fn test_rollover_dispatches_per_variant() {
        let counter = Meter::new(MeterKind::Counter, Vec::new());
        if let Meter::Counter(c) = &counter {
            c.increment(3.0);
        }
        assert_eq!(counter.rollover(), FrozenState::Counter(3.0));

        let gauge = Meter::new(MeterKind::Gauge, Vec::new());
        assert_eq!(gauge.rollover(), FrozenState::Gauge(None));

        let summary = Meter::new(MeterKind::DistributionSummary, vec![5.0]);
        if let Meter::DistributionSummary(d) = &summary {
            d.record(2.0);
        }
        match summary.rollover() {
            FrozenState::Summary(snap) => {
                assert_eq!(snap.count, 1);
                assert_eq!(snap.buckets[0].count, 1);
            }
            other => panic!("unexpected state {other:?}"),
        }
    }
}
