//! Parsed device options.
//!
//! The inventory carries options as one comma-separated string, e.g.
//! `"wan-dhcp-client, wan-static-ip:10.0.0.1/24"`. Each token is either a
//! bare flag or a `key:value` pair. Every device type accepts a fixed set
//! of keys; anything else is dropped with a warning.

use indexmap::IndexMap;
use log::warn;

/// Typed view of a device's `options` field.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DeviceOptions {
    values: IndexMap<String, Option<String>>,
}

impl DeviceOptions {
    /// Parse `raw`, keeping only the keys in `accepted`.
    ///
    /// An empty `accepted` list keeps everything.
    pub fn parse(device: &str, raw: &str, accepted: &[&str]) -> Self {
        let mut values = IndexMap::new();
        for token in raw.split(',').map(str::trim).filter(|t| !t.is_empty()) {
            let (key, value) = match token.split_once(':') {
                Some((k, v)) => (k.trim(), Some(v.trim().to_string())),
                None => (token, None),
            };
            if !accepted.is_empty() && !accepted.contains(&key) {
                warn!("[{}] ignoring unknown option '{}'", device, key);
                continue;
            }
            values.insert(key.to_string(), value);
        }
        Self { values }
    }

    /// Whether `key` was given, with or without a value.
    pub fn has(&self, key: &str) -> bool {
        self.values.contains_key(key)
    }

    /// Value of a `key:value` option.
    pub fn value(&self, key: &str) -> Option<&str> {
        self.values.get(key)?.as_deref()
    }

    /// Option keys in the order they were given.
    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.values.keys().map(String::as_str)
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }
}
