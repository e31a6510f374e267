//! No-op observability stubs
//!
//! Used when the `datadog` feature is disabled. Tracing still goes to a
//! plain fmt subscriber; spans are disabled and cost nothing.

/// No-op configuration
#[derive(Debug, Clone, Default)]
pub struct DatadogConfig;

impl DatadogConfig {
    #[inline(always)]
    pub fn from_env() -> Self {
        DatadogConfig
    }
}

/// fmt subscriber filtered by `RUST_LOG` (default `info`)
pub fn init_tracing(_config: &DatadogConfig) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .try_init()
        .map_err(|e| e.to_string().into())
}

/// No-op shutdown
#[inline(always)]
pub fn shutdown() {}

/// No-op span helpers
pub mod spans {
    use tracing::Span;

    #[inline(always)]
    pub fn rollover_span(_step_start_ms: u64) -> Span {
        Span::none()
    }

    #[inline(always)]
    pub fn publish_span(_step_start_ms: u64, _batches: usize) -> Span {
        Span::none()
    }

    #[inline(always)]
    pub fn batch_span(_index: usize, _points: usize) -> Span {
        Span::none()
    }
}
