//! Demo: drive a registry with synthetic load for a few steps, then close.
//!
//! ```text
//! stepmeter [config.toml]
//! ```
//!
//! Without a file, settings come from `STEPMETER_*` environment variables.
//! Batches are logged unless built with `--features http`.

use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;
use std::sync::Arc;
use std::time::Duration;
use stepmeter::observability::{init_tracing, shutdown, DatadogConfig};
use stepmeter::{MeterId, RegistryConfig, StepRegistry, Transport};

const DEMO_STEPS: u32 = 3;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    let dd_config = DatadogConfig::from_env();
    init_tracing(&dd_config)?;

    let config = match std::env::args().nth(1) {
        Some(path) => RegistryConfig::load_toml(path)?,
        None => RegistryConfig::from_env()?,
    };

    let registry = StepRegistry::builder(config.clone())
        .transport(transport(&config)?)
        .build()?;
    registry.start()?;

    let requests_ok = registry.counter(MeterId::new("demo.requests").with_tag("status", "200"));
    let requests_err = registry.counter(MeterId::new("demo.requests").with_tag("status", "500"));
    let in_flight = registry.gauge("demo.in_flight");
    let latency = registry.timer_with_buckets(
        "demo.latency",
        vec![
            Duration::from_millis(5),
            Duration::from_millis(25),
            Duration::from_millis(100),
        ],
    );
    let payload = registry.summary("demo.payload.bytes");

    let load = tokio::spawn(async move {
        let mut rng = ChaCha8Rng::from_entropy();
        let mut tick = tokio::time::interval(Duration::from_millis(10));
        loop {
            tick.tick().await;
            if rng.gen_bool(0.98) {
                requests_ok.incr();
            } else {
                requests_err.incr();
            }
            in_flight.set(rng.gen_range(0..64u32) as f64);
            latency.record(Duration::from_micros(rng.gen_range(500..150_000u64)));
            payload.record(rng.gen_range(64..16_384u32) as f64);
        }
    });

    let run_for = config.step * DEMO_STEPS;
    tracing::info!(run_ms = run_for.as_millis() as u64, "Generating load; Ctrl-C stops early");
    tokio::select! {
        _ = tokio::time::sleep(run_for) => {}
        result = tokio::signal::ctrl_c() => result?,
    }

    load.abort();
    registry.close().await;
    shutdown();
    Ok(())
}

#[cfg(feature = "http")]
fn transport(config: &RegistryConfig) -> Result<Arc<dyn Transport>, stepmeter::ConfigError> {
    Ok(Arc::new(stepmeter::publish::HttpTransport::new(config)?))
}

#[cfg(not(feature = "http"))]
fn transport(_config: &RegistryConfig) -> Result<Arc<dyn Transport>, stepmeter::ConfigError> {
    Ok(Arc::new(stepmeter::LoggingTransport))
}
