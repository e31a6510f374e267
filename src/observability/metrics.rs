//! DogStatsD Metrics Client
//!
//! Thread-safe, non-blocking UDP client for the pipeline's meta-metrics.
//! Gracefully degrades if the Datadog agent is unavailable.

use dogstatsd::{Client, Options};
use std::sync::Arc;

use super::config::DatadogConfig;
use crate::recorder::MetricsRecorder;

/// Metrics client wrapper with graceful degradation
#[derive(Clone)]
pub struct Metrics {
    client: Arc<Option<Client>>,
    prefix: String,
    global_tags: Vec<String>,
}

impl Metrics {
    pub fn new(config: &DatadogConfig) -> Self {
        let client = match Client::new(Options {
            to_addr: config.statsd_addr.to_string(),
            ..Default::default()
        }) {
            Ok(c) => {
                tracing::info!("DogStatsD client connected to {}", config.statsd_addr);
                Some(c)
            }
            Err(e) => {
                tracing::warn!("Failed to create DogStatsD client: {}. Meta-metrics disabled.", e);
                None
            }
        };

        Metrics {
            client: Arc::new(client),
            prefix: config.metric_prefix.clone(),
            global_tags: config.formatted_tags(),
        }
    }

    fn metric_name(&self, name: &str) -> String {
        format!("{}.{}", self.prefix, name)
    }

    fn merge_tags(&self, tags: &[&str]) -> Vec<String> {
        self.global_tags
            .iter()
            .cloned()
            .chain(tags.iter().map(|s| s.to_string()))
            .collect()
    }
}

impl MetricsRecorder for Metrics {
    #[inline]
    fn incr(&self, name: &str, tags: &[&str]) {
        if let Some(ref client) = *self.client {
            let _ = client.incr(&self.metric_name(name), self.merge_tags(tags));
        }
    }

    #[inline]
    fn histogram(&self, name: &str, value: f64, tags: &[&str]) {
        if let Some(ref client) = *self.client {
            let _ = client.histogram(&self.metric_name(name), value.to_string(), self.merge_tags(tags));
        }
    }

    #[inline]
    fn gauge(&self, name: &str, value: f64, tags: &[&str]) {
        if let Some(ref client) = *self.client {
            let _ = client.gauge(&self.metric_name(name), value.to_string(), self.merge_tags(tags));
        }
    }

    #[inline]
    fn timing(&self, name: &str, duration_ms: f64, tags: &[&str]) {
        if let Some(ref client) = *self.client {
            let _ = client.timing(&self.metric_name(name), duration_ms as i64, self.merge_tags(tags));
        }
    }
}
