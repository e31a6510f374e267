use std::collections::HashMap;

/// Key/value lookup the registry config is resolved from.
///
/// Keys are dotted, e.g. `stepmeter.batch_size`.
pub trait ConfigSource {
    fn get(&self, key: &str) -> Option<String>;
}

impl ConfigSource for HashMap<String, String> {
    fn get(&self, key: &str) -> Option<String> {
        HashMap::get(self, key).cloned()
    }
}

/// Dotted lookup into nested TOML tables. Scalars are returned in their
/// string form so the same parsers apply as for the environment.
impl ConfigSource for toml::Table {
    fn get(&self, key: &str) -> Option<String> {
        let mut parts = key.split('.');
        let mut value = toml::Table::get(self, parts.next()?)?;
        for part in parts {
            value = value.as_table()?.get(part)?;
        }
        match value {
            toml::Value::String(s) => Some(s.clone()),
            toml::Value::Integer(i) => Some(i.to_string()),
            toml::Value::Float(f) => Some(f.to_string()),
            toml::Value::Boolean(b) => Some(b.to_string()),
            _ => None,
        }
    }
}

/// Process environment: `stepmeter.batch_size` is read from
/// `STEPMETER_BATCH_SIZE`.
#[derive(Debug, Clone, Copy, Default)]
pub struct EnvSource;

impl EnvSource {
    pub fn var_name(key: &str) -> String {
        key.chars()
            .map(|c| match c {
                '.' | '-' => '_',
                c => c.to_ascii_uppercase(),
            })
            .collect()
    }
}

impl ConfigSource for EnvSource {
    fn get(&self, key: &str) -> Option<String> {
        std::env::var(Self::var_name(key)).ok()
    }
}
