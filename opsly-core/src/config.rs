//! # Configuration
//!
//! Opsly keeps a minimal configuration system based on a simple string
//! key/value store, mirroring `app.set()` / `app.get()` style APIs.
//! Applications layer values however they like; the server binary loads
//! environment variables (via dotenvy) on top of defaults at startup.
//!
//! Two keys are required and validated before anything else starts:
//! `store.base_url` and `auth.jwt.secret`. Their absence is a fatal
//! startup error, never a runtime one.

use std::collections::HashMap;

use anyhow::Result;

use crate::errors::OpslyError;

/// Configuration keys required at process start.
pub const REQUIRED_KEYS: &[&str] = &["store.base_url", "auth.jwt.secret"];

#[derive(Debug, Default)]
pub struct AppConfig {
    values: HashMap<String, String>,
}

impl AppConfig {
    /// Create an empty config store.
    pub fn new() -> Self {
        Self {
            values: HashMap::new(),
        }
    }

    /// Set a configuration key to a string value.
    ///
    /// Example: config.set("auth.token_ttl_secs", "259200")
    pub fn set<K, V>(&mut self, key: K, value: V)
    where
        K: Into<String>,
        V: Into<String>,
    {
        self.values.insert(key.into(), value.into());
    }

    /// Get a configuration value by key.
    pub fn get(&self, key: &str) -> Option<&str> {
        self.values.get(key).map(|s| s.as_str())
    }

    /// Check whether a key is present and non-empty.
    pub fn has(&self, key: &str) -> bool {
        self.values
            .get(key)
            .map(|v| !v.trim().is_empty())
            .unwrap_or(false)
    }

    /// Copy an environment variable into the store if it is set.
    /// The existing value (if any) is overridden.
    pub fn set_from_env(&mut self, key: &str, env_var: &str) {
        if let Ok(v) = std::env::var(env_var) {
            if !v.trim().is_empty() {
                self.set(key, v.trim());
            }
        }
    }

    /// Fail fast when a required key is missing. Called once at startup.
    pub fn validate_required(&self) -> Result<()> {
        for key in REQUIRED_KEYS {
            if !self.has(key) {
                return Err(OpslyError::general_error(format!(
                    "Missing required configuration: {key}"
                ))
                .into_anyhow());
            }
        }
        Ok(())
    }

    pub fn snapshot(&self) -> AppConfigSnapshot {
        AppConfigSnapshot::new(self.values.clone())
    }
}

/// An immutable copy of the configuration, cheap to clone and hand to
/// long-lived components at construction time.
#[derive(Debug, Clone, Default)]
pub struct AppConfigSnapshot {
    map: HashMap<String, String>,
}

impl AppConfigSnapshot {
    pub(crate) fn new(map: HashMap<String, String>) -> Self {
        Self { map }
    }

    pub fn get(&self, key: &str) -> Option<&str> {
        self.map.get(key).map(|s| s.as_str())
    }

    pub fn get_string(&self, key: &str) -> Option<String> {
        self.map.get(key).cloned()
    }

    pub fn get_u64(&self, key: &str) -> Option<u64> {
        self.get(key).and_then(|v| v.parse::<u64>().ok())
    }

    pub fn get_u32(&self, key: &str) -> Option<u32> {
        self.get(key).and_then(|v| v.parse::<u32>().ok())
    }

    /// Required key accessor; the value was validated at startup so a
    /// miss here is a programming error surfaced as GeneralError.
    pub fn require(&self, key: &str) -> Result<&str> {
        self.get(key).ok_or_else(|| {
            OpslyError::general_error(format!("Missing required configuration: {key}"))
                .into_anyhow()
        })
    }
}
