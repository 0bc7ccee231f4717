//! Runtime settings access.
//!
//! Code that needs a configuration value at request time takes a [`SettingSource`] instead of
//! calling `std::env::var` directly. Values are looked up on every call, so a setting that is
//! injected, rotated or removed after startup is observed by the next read.

use parking_lot::RwLock;
use std::collections::HashMap;
use std::sync::Arc;

/// Well-known setting names.
pub mod vars {
    /// Bearer credential for the R2R API.
    pub const API_KEY: &str = "R2R_API_KEY";
    /// Base URL of the R2R deployment.
    pub const BASE_URL: &str = "R2R_BASE_URL";
    /// Location of the R2R `OpenAPI` document (URL or file path).
    pub const OPENAPI_URL: &str = "R2R_OPENAPI_URL";
    /// Enables debug-level logging when truthy.
    pub const DEBUG_LOGGING: &str = "DEBUG_LOGGING";
}

/// A read-only view over named configuration values.
pub trait SettingSource: Send + Sync {
    /// Current value of `key`, or `None` when unset.
    fn get(&self, key: &str) -> Option<String>;

    /// Current value of `key`, treating an empty string the same as an unset key.
    fn get_non_empty(&self, key: &str) -> Option<String> {
        self.get(key).filter(|v| !v.is_empty())
    }

    /// Whether `key` holds a truthy flag value (see [`parse_flag`]).
    fn flag(&self, key: &str) -> bool {
        self.get(key).is_some_and(|v| parse_flag(&v))
    }
}

impl<T: SettingSource + ?Sized> SettingSource for Arc<T> {
    fn get(&self, key: &str) -> Option<String> {
        (**self).get(key)
    }
}

/// Settings backed by the process environment, read at call time.
#[derive(Debug, Clone, Copy, Default)]
pub struct ProcessEnv;

impl SettingSource for ProcessEnv {
    fn get(&self, key: &str) -> Option<String> {
        // Non-UTF-8 values are treated as unset.
        std::env::var(key).ok()
    }
}

/// Mutable in-memory settings.
///
/// Clones share the same underlying map, so a handle kept by a test (or an embedding
/// application) can rotate values that another component reads.
#[derive(Debug, Clone, Default)]
pub struct StaticSettings {
    values: Arc<RwLock<HashMap<String, String>>>,
}

impl StaticSettings {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn from_pairs<I, K, V>(pairs: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<String>,
    {
        let values = pairs
            .into_iter()
            .map(|(k, v)| (k.into(), v.into()))
            .collect();
        Self {
            values: Arc::new(RwLock::new(values)),
        }
    }

    pub fn set(&self, key: impl Into<String>, value: impl Into<String>) {
        self.values.write().insert(key.into(), value.into());
    }

    pub fn remove(&self, key: &str) {
        self.values.write().remove(key);
    }
}

impl SettingSource for StaticSettings {
    fn get(&self, key: &str) -> Option<String> {
        self.values.read().get(key).cloned()
    }
}

/// Parse a boolean-ish flag value (`true`, `1`, `yes`, `on`; case-insensitive).
#[must_use]
pub fn parse_flag(value: &str) -> bool {
    matches!(
        value.trim().to_ascii_lowercase().as_str(),
        "true" | "1" | "yes" | "on"
    )
}
