//! Datadog agent settings, read from the standard `DD_*` variables.

use std::env;
use std::net::SocketAddr;

#[derive(Debug, Clone)]
pub struct DatadogConfig {
    pub statsd_addr: SocketAddr,
    pub trace_addr: String,
    pub service_name: String,
    pub env: String,
    pub version: String,
    pub trace_sample_rate: f64,
    /// Emit JSON log lines so the agent can correlate them with traces
    pub json_logs: bool,
    pub metric_prefix: String,
    /// `key:value` pairs attached to every meta-metric
    pub tags: Vec<(String, String)>,
}

impl Default for DatadogConfig {
    fn default() -> Self {
        DatadogConfig {
            statsd_addr: SocketAddr::from(([127, 0, 0, 1], 8125)),
            trace_addr: "http://127.0.0.1:8126".to_string(),
            service_name: "stepmeter".to_string(),
            env: "development".to_string(),
            version: env!("CARGO_PKG_VERSION").to_string(),
            trace_sample_rate: 1.0,
            json_logs: false,
            metric_prefix: "stepmeter".to_string(),
            tags: Vec::new(),
        }
    }
}

impl DatadogConfig {
    /// Unset or unparseable variables fall back to defaults
    pub fn from_env() -> Self {
        let defaults = Self::default();

        let statsd_addr = env::var("DD_DOGSTATSD_URL")
            .ok()
            .map(|v| v.trim_start_matches("udp://").to_string())
            .and_then(|v| v.parse().ok())
            .unwrap_or(defaults.statsd_addr);

        let trace_sample_rate = env::var("DD_TRACE_SAMPLE_RATE")
            .ok()
            .and_then(|v| v.parse::<f64>().ok())
            .filter(|r| (0.0..=1.0).contains(r))
            .unwrap_or(defaults.trace_sample_rate);

        DatadogConfig {
            statsd_addr,
            trace_addr: env::var("DD_TRACE_AGENT_URL").unwrap_or(defaults.trace_addr),
            service_name: env::var("DD_SERVICE").unwrap_or(defaults.service_name),
            env: env::var("DD_ENV").unwrap_or(defaults.env),
            version: env::var("DD_VERSION").unwrap_or(defaults.version),
            trace_sample_rate,
            json_logs: env::var("DD_LOGS_INJECTION")
                .map(|v| v.eq_ignore_ascii_case("true") || v == "1")
                .unwrap_or(defaults.json_logs),
            metric_prefix: env::var("DD_METRIC_PREFIX").unwrap_or(defaults.metric_prefix),
            tags: env::var("DD_TAGS")
                .map(|v| parse_tags(&v))
                .unwrap_or_default(),
        }
    }

    /// Global tags in DogStatsD form, including `env` and `service`
    pub fn formatted_tags(&self) -> Vec<String> {
        let mut tags = vec![
            format!("env:{}", self.env),
            format!("service:{}", self.service_name),
        ];
        tags.extend(self.tags.iter().map(|(k, v)| format!("{k}:{v}")));
        tags
    }
}

fn parse_tags(raw: &str) -> Vec<(String, String)> {
    raw.split(',')
        .filter_map(|pair| {
            let (k, v) = pair.trim().split_once(':')?;
            if k.is_empty() {
                return None;
            }
            Some((k.to_string(), v.to_string()))
        })
        .collect()
}
