//! Turning a set of frozen accumulator states into an ordered, immutable
//! snapshot of data points for one step.

use super::accumulator::{DistributionSnapshot, FrozenState};
use crate::io::Timestamp;
use crate::meter::{MeterId, MeterKind};
use serde::Serialize;
use std::time::Duration;

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum PointValue {
    /// Increment over the step, not a lifetime total
    Count { value: f64 },
    Gauge { value: f64 },
    Timer(DistributionSnapshot),
    DistributionSummary(DistributionSnapshot),
}

impl PointValue {
    pub fn kind(&self) -> MeterKind {
        match self {
            PointValue::Count { .. } => MeterKind::Counter,
            PointValue::Gauge { .. } => MeterKind::Gauge,
            PointValue::Timer(_) => MeterKind::Timer,
            PointValue::DistributionSummary(_) => MeterKind::DistributionSummary,
        }
    }

    pub fn as_count(&self) -> Option<f64> {
        match self {
            PointValue::Count { value } => Some(*value),
            _ => None,
        }
    }

    pub fn as_gauge(&self) -> Option<f64> {
        match self {
            PointValue::Gauge { value } => Some(*value),
            _ => None,
        }
    }

    pub fn as_distribution(&self) -> Option<&DistributionSnapshot> {
        match self {
            PointValue::Timer(d) | PointValue::DistributionSummary(d) => Some(d),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DataPoint {
    #[serde(flatten)]
    pub id: MeterId,
    #[serde(flatten)]
    pub value: PointValue,
}

/// Values of every reported meter for one closed step
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Snapshot {
    /// Inclusive start of the step window
    pub step_start: Timestamp,
    #[serde(rename = "step_ms", serialize_with = "as_millis")]
    pub step: Duration,
    pub points: Vec<DataPoint>,
}

fn as_millis<S: serde::Serializer>(d: &Duration, s: S) -> Result<S::Ok, S::Error> {
    s.serialize_u64(u64::try_from(d.as_millis()).unwrap_or(u64::MAX))
}

impl Snapshot {
    pub fn len(&self) -> usize {
        self.points.len()
    }

    pub fn is_empty(&self) -> bool {
        self.points.is_empty()
    }

    pub fn get(&self, id: &MeterId) -> Option<&PointValue> {
        self.points
            .binary_search_by(|p| p.id.cmp(id))
            .ok()
            .map(|i| &self.points[i].value)
    }

    /// Exclusive end of the step window
    pub fn step_end(&self) -> Timestamp {
        self.step_start + self.step
    }
}

/// Build the snapshot for the step starting at `step_start`.
///
/// Counters, timers and summaries are always reported, with zero values when
/// idle. Gauges are reported only once they have a finite sample. Points are
/// ordered by meter id, so the same input always yields the same snapshot.
pub fn build_snapshot(
    step_start: Timestamp,
    step: Duration,
    frozen: impl IntoIterator<Item = (MeterId, FrozenState)>,
) -> Snapshot {
    let mut points: Vec<DataPoint> = frozen
        .into_iter()
        .filter_map(|(id, state)| {
            let value = match state {
                FrozenState::Counter(value) => PointValue::Count { value },
                FrozenState::Gauge(Some(value)) if value.is_finite() => PointValue::Gauge { value },
                FrozenState::Gauge(_) => return None,
                FrozenState::Timer(d) => PointValue::Timer(d),
                FrozenState::Summary(d) => PointValue::DistributionSummary(d),
            };
            Some(DataPoint { id, value })
        })
        .collect();

    points.sort_by(|a, b| a.id.cmp(&b.id));

    Snapshot {
        step_start,
        step,
        points,
    }
}
