//! Publishing snapshots to a backend: partitioning, transport, retry.

mod batch;
#[cfg(feature = "http")]
mod http;
mod publisher;
mod retry;
mod simulated;
mod transport;

pub use batch::{partition, Batch};
#[cfg(feature = "http")]
pub use http::HttpTransport;
pub use publisher::{
    BatchOutcome, BatchPublisher, BatchReport, CycleOutcome, CycleReport, PublishPolicy,
};
pub use retry::RetryPolicy;
pub use simulated::{SentRecord, SimulatedTransport};
pub use transport::{classify_status, LoggingTransport, SendOutcome, Transport};
