//! Span Helpers for Pipeline Tracing

use tracing::{span, Level, Span};

/// Span around one rollover of every meter in the registry
#[inline]
pub fn rollover_span(step_start_ms: u64) -> Span {
    span!(
        Level::DEBUG,
        "stepmeter.rollover",
        step.start_ms = step_start_ms,
        otel.kind = "internal"
    )
}

/// Span around one publish cycle
#[inline]
pub fn publish_span(step_start_ms: u64, batches: usize) -> Span {
    span!(
        Level::INFO,
        "stepmeter.publish",
        step.start_ms = step_start_ms,
        publish.batches = batches,
        otel.kind = "client"
    )
}

/// Span around all attempts for one batch
#[inline]
pub fn batch_span(index: usize, points: usize) -> Span {
    span!(
        Level::DEBUG,
        "stepmeter.batch",
        batch.index = index,
        batch.points = points,
        otel.kind = "client"
    )
}
