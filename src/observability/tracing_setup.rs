//! Tracing and APM Setup
//!
//! Installs an OpenTelemetry layer exporting to the Datadog agent under an
//! `EnvFilter` (default `info`), with plain or JSON log output.

use opentelemetry::KeyValue;
use opentelemetry_datadog::DatadogPropagator;
use opentelemetry_sdk::trace::{Config, Sampler};
use opentelemetry_sdk::Resource;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::EnvFilter;

use super::config::DatadogConfig;

pub fn init(config: &DatadogConfig) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    opentelemetry::global::set_text_map_propagator(DatadogPropagator::default());

    let trace_config = Config::default()
        .with_sampler(Sampler::TraceIdRatioBased(config.trace_sample_rate))
        .with_resource(Resource::new(vec![
            KeyValue::new("service.name", config.service_name.clone()),
            KeyValue::new("service.version", config.version.clone()),
            KeyValue::new("deployment.environment", config.env.clone()),
        ]));

    let tracer = opentelemetry_datadog::new_pipeline()
        .with_service_name(&config.service_name)
        .with_agent_endpoint(&config.trace_addr)
        .with_trace_config(trace_config)
        .install_batch(opentelemetry_sdk::runtime::Tokio)?;
    let otel_layer = tracing_opentelemetry::layer().with_tracer(tracer);

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

    // fmt layer sits before the otel layer so spans are logged before export
    if config.json_logs {
        tracing_subscriber::registry()
            .with(filter)
            .with(tracing_subscriber::fmt::layer().json())
            .with(otel_layer)
            .try_init()?;
    } else {
        tracing_subscriber::registry()
            .with(filter)
            .with(tracing_subscriber::fmt::layer())
            .with(otel_layer)
            .try_init()?;
    }

    tracing::info!(
        statsd = %config.statsd_addr,
        service = %config.service_name,
        env = %config.env,
        sample_rate = %config.trace_sample_rate,
        "Datadog observability initialized"
    );
    Ok(())
}

/// Flush pending spans to the agent. Call before exit.
pub fn shutdown() {
    tracing::info!("Flushing Datadog traces");
    opentelemetry::global::shutdown_tracer_provider();
}
