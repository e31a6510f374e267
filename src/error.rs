//! Error types surfaced to whoever constructs a registry.
//!
//! Only construction can fail. Transport problems are reported as
//! [`SendOutcome`](crate::publish::SendOutcome) values and never cross the
//! instrument API.

use thiserror::Error;

/// Configuration could not be resolved or failed validation
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("missing required config key `{key}`")]
    Missing { key: String },

    #[error("invalid value {value:?} for `{key}`: {reason}")]
    Invalid {
        key: String,
        value: String,
        reason: String,
    },

    #[error("failed to read config file: {0}")]
    Io(#[from] std::io::Error),

    #[error("failed to parse config file: {0}")]
    Toml(#[from] toml::de::Error),
}

impl ConfigError {
    pub(crate) fn invalid(key: &str, value: impl ToString, reason: impl Into<String>) -> Self {
        ConfigError::Invalid {
            key: key.to_string(),
            value: value.to_string(),
            reason: reason.into(),
        }
    }
}

/// Top-level error for registry construction and startup
#[derive(Debug, Error)]
pub enum StepmeterError {
    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error("registry must be started from within a tokio runtime")]
    NoRuntime,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_messages_name_the_key() {
        let missing = ConfigError::Missing {
            key: "stepmeter.uri".to_string(),
        };
        assert_eq!(missing.to_string(), "missing required config key `stepmeter.uri`");

        let invalid = ConfigError::invalid("stepmeter.step", "0s", "must be positive");
        assert!(invalid.to_string().contains("stepmeter.step"));
        assert!(invalid.to_string().contains("must be positive"));
    }

    #[test]
    fn test_config_error_converts_into_stepmeter_error() {
        let err: StepmeterError = ConfigError::Missing {
            key: "x".to_string(),
        }
        .into();
        assert!(matches!(err, StepmeterError::Config(_)));
    }
}
