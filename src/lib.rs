//! Step-aggregated metrics with periodic publishing.
//!
//! Instruments record into per-step accumulators. On every epoch-aligned
//! step boundary the registry rolls each meter over into an immutable
//! [`Snapshot`], partitions it into size-bounded batches and hands them to a
//! [`Transport`] with bounded retry. Publishing never blocks recording.

pub mod config;
pub mod error;
pub mod io;
pub mod meter;
pub mod publish;
pub mod recorder;
pub mod registry;
pub mod step;

// Observability: feature-gated Datadog integration
#[cfg(feature = "datadog")]
pub mod observability;

#[cfg(not(feature = "datadog"))]
#[path = "observability_noop.rs"]
pub mod observability;

pub use config::RegistryConfig;
pub use error::{ConfigError, StepmeterError};
pub use io::{Clock, MockClock, SystemClock, Timestamp};
pub use meter::{Counter, DistributionSummary, Gauge, MeterId, MeterKind, Timer, TimerSample};
pub use publish::{
    BatchPublisher, CycleOutcome, CycleReport, LoggingTransport, SendOutcome, SimulatedTransport,
    Transport,
};
pub use recorder::{MetricsRecorder, SharedMetrics};
pub use registry::{RegistryBuilder, RegistryState, StepRegistry};
pub use step::{DataPoint, PointValue, Snapshot};
