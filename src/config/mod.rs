//! Registry configuration
//!
//! A [`RegistryConfig`] can be built three ways:
//!
//! - in code, starting from `Default` and chaining `with_*` methods
//! - from a TOML file via [`RegistryConfig::load_toml`]
//! - from any key/value [`ConfigSource`] (environment, map, TOML table) via
//!   [`RegistryConfig::from_source`], resolving `"{prefix}.{key}"`
//!
//! Every route ends in [`RegistryConfig::validate`], so a bad value fails at
//! construction instead of at the first publish.
//!
//! | Key | Default | Description |
//! |-----|---------|-------------|
//! | `enabled` | `true` | Disabled registries accept and discard everything |
//! | `step` | `60s` | Aggregation window, aligned to the Unix epoch |
//! | `uri` | — | Ingestion endpoint, required when enabled |
//! | `api_key` | — | Backend credential, optional |
//! | `account_id` | — | Backend account, optional |
//! | `batch_size` | `10000` | Max data points per batch |
//! | `max_batch_bytes` | `1000000` | Max serialized batch size |
//! | `publish_timeout` | `10s` | Per-request timeout |
//! | `max_attempts` | `3` | Attempts per batch, including the first |
//! | `backoff_base` | `100ms` | First retry delay |
//! | `backoff_max` | `5s` | Retry delay cap |
//! | `jitter` | `0.2` | Backoff jitter ratio (0.0 - 1.0) |
//! | `shutdown_timeout` | `10s` | Bound on the final flush during `close()` |
//! | `max_concurrent_publishes` | `4` | In-flight publish cycles before new ones are dropped |

mod duration;
mod source;

pub use duration::parse_duration;
pub use source::{ConfigSource, EnvSource};

use crate::error::ConfigError;
use crate::publish::{PublishPolicy, RetryPolicy};
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::str::FromStr;
use std::time::Duration;

/// Key prefix used when none is supplied
pub const DEFAULT_PREFIX: &str = "stepmeter";

/// Smallest batch byte limit that can hold an envelope plus one point
const MIN_BATCH_BYTES: usize = 256;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RegistryConfig {
    pub enabled: bool,
    #[serde(with = "duration")]
    pub step: Duration,
    pub uri: Option<String>,
    pub api_key: Option<String>,
    pub account_id: Option<String>,
    pub batch_size: usize,
    pub max_batch_bytes: usize,
    #[serde(with = "duration")]
    pub publish_timeout: Duration,
    pub max_attempts: u32,
    #[serde(with = "duration")]
    pub backoff_base: Duration,
    #[serde(with = "duration")]
    pub backoff_max: Duration,
    pub jitter: f64,
    #[serde(with = "duration")]
    pub shutdown_timeout: Duration,
    pub max_concurrent_publishes: usize,
}

impl Default for RegistryConfig {
    fn default() -> Self {
        RegistryConfig {
            enabled: true,
            step: Duration::from_secs(60),
            uri: None,
            api_key: None,
            account_id: None,
            batch_size: 10_000,
            max_batch_bytes: 1_000_000,
            publish_timeout: Duration::from_secs(10),
            max_attempts: 3,
            backoff_base: Duration::from_millis(100),
            backoff_max: Duration::from_secs(5),
            jitter: 0.2,
            shutdown_timeout: Duration::from_secs(10),
            max_concurrent_publishes: 4,
        }
    }
}

impl RegistryConfig {
    /// Config pointing at `uri` with every other option at its default
    pub fn new(uri: impl Into<String>) -> Self {
        RegistryConfig {
            uri: Some(uri.into()),
            ..Default::default()
        }
    }

    /// A config that never schedules or publishes
    pub fn disabled() -> Self {
        RegistryConfig {
            enabled: false,
            ..Default::default()
        }
    }

    pub fn with_step(mut self, step: Duration) -> Self {
        self.step = step;
        self
    }

    pub fn with_credentials(mut self, api_key: impl Into<String>, account_id: impl Into<String>) -> Self {
        self.api_key = Some(api_key.into());
        self.account_id = Some(account_id.into());
        self
    }

    pub fn with_batch_size(mut self, batch_size: usize) -> Self {
        self.batch_size = batch_size;
        self
    }

    pub fn with_max_batch_bytes(mut self, bytes: usize) -> Self {
        self.max_batch_bytes = bytes;
        self
    }

    pub fn with_publish_timeout(mut self, timeout: Duration) -> Self {
        self.publish_timeout = timeout;
        self
    }

    pub fn with_max_attempts(mut self, attempts: u32) -> Self {
        self.max_attempts = attempts;
        self
    }

    pub fn with_backoff(mut self, base: Duration, max: Duration, jitter: f64) -> Self {
        self.backoff_base = base;
        self.backoff_max = max;
        self.jitter = jitter;
        self
    }

    pub fn with_shutdown_timeout(mut self, timeout: Duration) -> Self {
        self.shutdown_timeout = timeout;
        self
    }

    pub fn with_max_concurrent_publishes(mut self, n: usize) -> Self {
        self.max_concurrent_publishes = n;
        self
    }

    /// Load and validate a TOML file whose top-level keys are the config keys
    pub fn load_toml(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let text = std::fs::read_to_string(path)?;
        let config: RegistryConfig = toml::from_str(&text)?;
        config.validate()?;
        Ok(config)
    }

    /// Resolve every option as `"{prefix}.{key}"` from `source`, falling back
    /// to defaults for unset keys, then validate.
    pub fn from_source(prefix: &str, source: &impl ConfigSource) -> Result<Self, ConfigError> {
        let lookup = Lookup { prefix, source };
        let defaults = RegistryConfig::default();

        let config = RegistryConfig {
            enabled: lookup.parsed("enabled")?.unwrap_or(defaults.enabled),
            step: lookup.duration("step")?.unwrap_or(defaults.step),
            uri: lookup.string("uri"),
            api_key: lookup.string("api_key"),
            account_id: lookup.string("account_id"),
            batch_size: lookup.parsed("batch_size")?.unwrap_or(defaults.batch_size),
            max_batch_bytes: lookup
                .parsed("max_batch_bytes")?
                .unwrap_or(defaults.max_batch_bytes),
            publish_timeout: lookup
                .duration("publish_timeout")?
                .unwrap_or(defaults.publish_timeout),
            max_attempts: lookup.parsed("max_attempts")?.unwrap_or(defaults.max_attempts),
            backoff_base: lookup.duration("backoff_base")?.unwrap_or(defaults.backoff_base),
            backoff_max: lookup.duration("backoff_max")?.unwrap_or(defaults.backoff_max),
            jitter: lookup.parsed("jitter")?.unwrap_or(defaults.jitter),
            shutdown_timeout: lookup
                .duration("shutdown_timeout")?
                .unwrap_or(defaults.shutdown_timeout),
            max_concurrent_publishes: lookup
                .parsed("max_concurrent_publishes")?
                .unwrap_or(defaults.max_concurrent_publishes),
        };

        config.validate_with_prefix(prefix)?;
        Ok(config)
    }

    /// Environment variables under the default prefix (`STEPMETER_*`)
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_source(DEFAULT_PREFIX, &EnvSource)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        self.validate_with_prefix(DEFAULT_PREFIX)
    }

    fn validate_with_prefix(&self, prefix: &str) -> Result<(), ConfigError> {
        let key = |name: &str| format!("{prefix}.{name}");

        if self.step < Duration::from_millis(1) {
            return Err(ConfigError::invalid(&key("step"), format!("{:?}", self.step), "must be at least 1ms"));
        }

        if self.enabled {
            match self.uri.as_deref() {
                None => return Err(ConfigError::Missing { key: key("uri") }),
                Some(uri) if !is_http_uri(uri) => {
                    return Err(ConfigError::invalid(&key("uri"), uri, "must be an http(s) URL"));
                }
                Some(_) => {}
            }
        }

        for (name, value) in [("api_key", &self.api_key), ("account_id", &self.account_id)] {
            if let Some(v) = value {
                if v.trim().is_empty() {
                    return Err(ConfigError::invalid(&key(name), v, "must not be blank when set"));
                }
            }
        }

        if self.batch_size == 0 {
            return Err(ConfigError::invalid(&key("batch_size"), self.batch_size, "must be at least 1"));
        }
        if self.max_batch_bytes < MIN_BATCH_BYTES {
            return Err(ConfigError::invalid(
                &key("max_batch_bytes"),
                self.max_batch_bytes,
                format!("must be at least {MIN_BATCH_BYTES}"),
            ));
        }
        if self.publish_timeout.is_zero() {
            return Err(ConfigError::invalid(&key("publish_timeout"), "0", "must be positive"));
        }
        if self.max_attempts == 0 {
            return Err(ConfigError::invalid(&key("max_attempts"), 0, "must be at least 1"));
        }
        if self.backoff_max < self.backoff_base {
            return Err(ConfigError::invalid(
                &key("backoff_max"),
                format!("{:?}", self.backoff_max),
                "must not be smaller than backoff_base",
            ));
        }
        if !(0.0..=1.0).contains(&self.jitter) {
            return Err(ConfigError::invalid(&key("jitter"), self.jitter, "must be within 0.0..=1.0"));
        }
        if self.shutdown_timeout.is_zero() {
            return Err(ConfigError::invalid(&key("shutdown_timeout"), "0", "must be positive"));
        }
        if self.max_concurrent_publishes == 0 {
            return Err(ConfigError::invalid(&key("max_concurrent_publishes"), 0, "must be at least 1"));
        }

        Ok(())
    }

    pub fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy {
            max_attempts: self.max_attempts,
            base_delay: self.backoff_base,
            max_delay: self.backoff_max,
            jitter: self.jitter,
        }
    }

    pub fn publish_policy(&self) -> PublishPolicy {
        PublishPolicy {
            max_items: self.batch_size,
            max_bytes: self.max_batch_bytes,
            timeout: self.publish_timeout,
            retry: self.retry_policy(),
        }
    }
}

fn is_http_uri(uri: &str) -> bool {
    ["http://", "https://"]
        .iter()
        .any(|scheme| uri.len() > scheme.len() && uri.starts_with(scheme))
}

struct Lookup<'a, S> {
    prefix: &'a str,
    source: &'a S,
}

impl<S: ConfigSource> Lookup<'_, S> {
    fn key(&self, name: &str) -> String {
        format!("{}.{}", self.prefix, name)
    }

    fn string(&self, name: &str) -> Option<String> {
        self.source.get(&self.key(name))
    }

    fn parsed<T>(&self, name: &str) -> Result<Option<T>, ConfigError>
    where
        T: FromStr,
        T::Err: std::fmt::Display,
    {
        let key = self.key(name);
        match self.source.get(&key) {
            None => Ok(None),
            Some(raw) => raw
                .trim()
                .parse::<T>()
                .map(Some)
                .map_err(|e| ConfigError::invalid(&key, &raw, e.to_string())),
        }
    }

    fn duration(&self, name: &str) -> Result<Option<Duration>, ConfigError> {
        let key = self.key(name);
        match self.source.get(&key) {
            None => Ok(None),
            Some(raw) => parse_duration(&raw)
                .map(Some)
                .map_err(|reason| ConfigError::invalid(&key, &raw, reason)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn source(pairs: &[(&str, &str)]) -> HashMap<String, String> {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect()
    }

    #[test]
    fn test_defaults_need_a_uri_when_enabled() {
        let err = RegistryConfig::default().validate().unwrap_err();
        assert!(matches!(err, ConfigError::Missing { ref key } if key == "stepmeter.uri"));

        assert!(RegistryConfig::disabled().validate().is_ok());
        assert!(RegistryConfig::new("https://ingest.example.com/v1").validate().is_ok());
    }

    #[test]
    fn test_from_source_resolves_prefixed_keys() {
        let src = source(&[
            ("newrelic.uri", "https://insights.example.com/events"),
            ("newrelic.step", "10s"),
            ("newrelic.batch_size", "500"),
            ("newrelic.max_attempts", "5"),
            ("newrelic.api_key", "secret"),
        ]);

        let config = RegistryConfig::from_source("newrelic", &src).unwrap();
        assert_eq!(config.step, Duration::from_secs(10));
        assert_eq!(config.batch_size, 500);
        assert_eq!(config.max_attempts, 5);
        assert_eq!(config.api_key.as_deref(), Some("secret"));
        // untouched keys keep their defaults
        assert_eq!(config.publish_timeout, Duration::from_secs(10));
        assert_eq!(config.shutdown_timeout, Duration::from_secs(10));
    }

    #[test]
    fn test_from_source_rejects_unparseable_values() {
        let src = source(&[
            ("stepmeter.uri", "http://localhost:9000"),
            ("stepmeter.batch_size", "lots"),
        ]);
        let err = RegistryConfig::from_source("stepmeter", &src).unwrap_err();
        assert!(matches!(err, ConfigError::Invalid { ref key, .. } if key == "stepmeter.batch_size"));

        let src = source(&[
            ("stepmeter.uri", "http://localhost:9000"),
            ("stepmeter.step", "soon"),
        ]);
        let err = RegistryConfig::from_source("stepmeter", &src).unwrap_err();
        assert!(matches!(err, ConfigError::Invalid { ref key, .. } if key == "stepmeter.step"));
    }

    #[test]
    fn test_validation_rules() {
        let base = RegistryConfig::new("http://localhost:9000");

        assert!(base.clone().with_batch_size(0).validate().is_err());
        assert!(base.clone().with_max_attempts(0).validate().is_err());
        assert!(base.clone().with_max_batch_bytes(10).validate().is_err());
        assert!(base.clone().with_step(Duration::ZERO).validate().is_err());
        assert!(base.clone().with_publish_timeout(Duration::ZERO).validate().is_err());
        assert!(base.clone().with_shutdown_timeout(Duration::ZERO).validate().is_err());
        assert!(base.clone().with_max_concurrent_publishes(0).validate().is_err());
        assert!(base
            .clone()
            .with_backoff(Duration::from_secs(2), Duration::from_secs(1), 0.1)
            .validate()
            .is_err());
        assert!(base
            .clone()
            .with_backoff(Duration::from_millis(1), Duration::from_secs(1), 1.5)
            .validate()
            .is_err());
        assert!(base.clone().with_credentials(" ", "42").validate().is_err());
        assert!(RegistryConfig::new("ftp://example.com").validate().is_err());
        assert!(RegistryConfig::new("https://").validate().is_err());

        assert!(base.with_credentials("key", "42").validate().is_ok());
    }

    #[test]
    fn test_load_toml() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("stepmeter.toml");
        std::fs::write(
            &path,
            r#"
uri = "https://ingest.example.com/v1/metrics"
step = "30s"
publish_timeout = 2500
batch_size = 200
jitter = 0.0
"#,
        )
        .unwrap();

        let config = RegistryConfig::load_toml(&path).unwrap();
        assert_eq!(config.step, Duration::from_secs(30));
        assert_eq!(config.publish_timeout, Duration::from_millis(2500));
        assert_eq!(config.batch_size, 200);
        assert_eq!(config.jitter, 0.0);
        assert!(config.enabled);
    }

    #[test]
    fn test_load_toml_validates() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("bad.toml");
        std::fs::write(&path, "uri = \"https://x.example\"\nbatch_size = 0\n").unwrap();

        assert!(matches!(
            RegistryConfig::load_toml(&path),
            Err(ConfigError::Invalid { .. })
        ));
        assert!(matches!(
            RegistryConfig::load_toml(dir.path().join("missing.toml")),
            Err(ConfigError::Io(_))
        ));
    }

    #[test]
    fn test_policies_reflect_config() {
        let config = RegistryConfig::new("http://localhost")
            .with_batch_size(7)
            .with_max_attempts(4)
            .with_publish_timeout(Duration::from_millis(300));
        let policy = config.publish_policy();

        assert_eq!(policy.max_items, 7);
        assert_eq!(policy.timeout, Duration::from_millis(300));
        assert_eq!(policy.retry.max_attempts, 4);
        assert_eq!(policy.retry.base_delay, config.backoff_base);
    }
}
