//! The seam between the publisher and a monitoring backend.

use super::batch::Batch;
use futures::future::BoxFuture;
use std::time::Duration;
use tracing::{debug, info};

/// Result of one transmission attempt
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SendOutcome {
    /// Backend acknowledged the batch
    Success,
    /// Transient failure (connectivity, 5xx, timeout); worth retrying
    Retryable(String),
    /// Permanent failure (auth rejected, malformed payload); retrying is pointless
    Fatal(String),
}

impl SendOutcome {
    pub fn is_success(&self) -> bool {
        matches!(self, SendOutcome::Success)
    }
}

/// Delivers one encoded batch to a backend.
///
/// Envelope changes and authentication belong to the implementation; the
/// publisher treats the call as opaque and only looks at the outcome. The
/// publisher also enforces `timeout` itself, so implementations may use it
/// for their own client configuration or ignore it.
pub trait Transport: Send + Sync + 'static {
    fn send<'a>(&'a self, batch: &'a Batch, timeout: Duration) -> BoxFuture<'a, SendOutcome>;
}

/// Map an HTTP status code to an outcome.
///
/// 2xx succeed; 408, 429 and 5xx are transient; every other status means the
/// request itself is wrong and will keep failing.
pub fn classify_status(status: u16) -> SendOutcome {
    match status {
        200..=299 => SendOutcome::Success,
        408 | 429 => SendOutcome::Retryable(format!("backend throttled or timed out ({status})")),
        500..=599 => SendOutcome::Retryable(format!("backend error ({status})")),
        401 | 403 => SendOutcome::Fatal(format!("authentication rejected ({status})")),
        _ => SendOutcome::Fatal(format!("request rejected ({status})")),
    }
}

/// Writes every batch to the log and reports success
#[derive(Debug, Clone, Copy, Default)]
pub struct LoggingTransport;

impl Transport for LoggingTransport {
    fn send<'a>(&'a self, batch: &'a Batch, _timeout: Duration) -> BoxFuture<'a, SendOutcome> {
        Box::pin(async move {
            info!(
                step_start = %batch.step_start,
                batch = batch.index,
                points = batch.len(),
                bytes = batch.payload.len(),
                "Publishing batch"
            );
            debug!(payload = %String::from_utf8_lossy(&batch.payload), "Batch payload");
            SendOutcome::Success
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::io::Timestamp;
    use bytes::Bytes;

    #[test]
    fn test_classify_status() {
        assert_eq!(classify_status(200), SendOutcome::Success);
        assert_eq!(classify_status(202), SendOutcome::Success);
        assert!(matches!(classify_status(408), SendOutcome::Retryable(_)));
        assert!(matches!(classify_status(429), SendOutcome::Retryable(_)));
        assert!(matches!(classify_status(503), SendOutcome::Retryable(_)));
        assert!(matches!(classify_status(401), SendOutcome::Fatal(_)));
        assert!(matches!(classify_status(403), SendOutcome::Fatal(_)));
        assert!(matches!(classify_status(400), SendOutcome::Fatal(_)));
        assert!(matches!(classify_status(413), SendOutcome::Fatal(_)));
    }

    #[tokio::test]
    async fn test_logging_transport_succeeds() {
        let batch = Batch {
            index: 0,
            step_start: Timestamp(0),
            step: Duration::from_secs(1),
            points: Vec::new(),
            payload: Bytes::from_static(b"{}"),
        };
        let outcome = LoggingTransport.send(&batch, Duration::from_secs(1)).await;
        assert!(outcome.is_success());
    }
}
