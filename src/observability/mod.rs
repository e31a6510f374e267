//! Datadog Observability Module
//!
//! Observability for the pipeline itself, separate from the meters it ships:
//! - Meta-metrics via DogStatsD (UDP), as a [`MetricsRecorder`](crate::recorder::MetricsRecorder)
//! - Distributed tracing of rollovers and publish cycles via Datadog APM
//! - Structured logging with trace correlation
//!
//! # Usage
//!
//! ```rust,ignore
//! use stepmeter::observability::{DatadogConfig, Metrics, init_tracing, shutdown};
//!
//! #[tokio::main]
//! async fn main() {
//!     let config = DatadogConfig::from_env();
//!     init_tracing(&config).expect("Failed to initialize tracing");
//!     let metrics = Arc::new(Metrics::new(&config));
//!
//!     let registry = StepRegistry::builder(registry_config).metrics(metrics).build()?;
//!
//!     // On shutdown
//!     registry.close().await;
//!     shutdown();
//! }
//! ```
//!
//! # Environment Variables
//!
//! | Variable | Default | Description |
//! |----------|---------|-------------|
//! | `DD_SERVICE` | `stepmeter` | Service name |
//! | `DD_ENV` | `development` | Environment tag |
//! | `DD_VERSION` | pkg version | Service version |
//! | `DD_DOGSTATSD_URL` | `127.0.0.1:8125` | DogStatsD address |
//! | `DD_TRACE_AGENT_URL` | `http://127.0.0.1:8126` | APM agent URL |
//! | `DD_TRACE_SAMPLE_RATE` | `1.0` | Trace sampling rate |
//! | `DD_LOGS_INJECTION` | `false` | JSON logs with trace ids |
//! | `DD_METRIC_PREFIX` | `stepmeter` | Metric name prefix |
//! | `DD_TAGS` | `` | Global tags (k1:v1,k2:v2) |

pub mod config;
pub mod metrics;
pub mod spans;
pub mod tracing_setup;

pub use config::DatadogConfig;
pub use metrics::Metrics;
pub use tracing_setup::{init as init_tracing, shutdown};
