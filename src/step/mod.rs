//! Step-based aggregation: accumulators, the snapshot builder and the step
//! scheduler.

mod accumulator;
mod scheduler;
mod snapshot;

pub use accumulator::{
    BucketCount, DistributionSnapshot, FrozenState, StepCounter, StepDistribution, StepGauge,
};
pub use scheduler::{StepScheduler, StepTick};
pub use snapshot::{build_snapshot, DataPoint, PointValue, Snapshot};
