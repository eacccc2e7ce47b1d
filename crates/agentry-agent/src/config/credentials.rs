//! Credential sources.
//!
//! Provider credentials are read through [`CredentialSource`] instead of
//! straight from the process environment, so callers (and tests) decide where
//! keys come from.

use std::collections::HashMap;

/// Key/value lookup for provider credentials.
pub trait CredentialSource: Send + Sync {
    /// Return the credential stored under `key`.  Empty values count as
    /// absent.
    fn get(&self, key: &str) -> Option<String>;
}

/// Reads credentials from environment variables, with an optional map of
/// fallback values (typically the `[api_keys]` config section).
#[derive(Debug, Clone, Default)]
pub struct EnvCredentials {
    fallback: HashMap<String, String>,
}

impl EnvCredentials {
    pub fn new() -> Self {
        Self::default()
    }

    /// Use `fallback` for keys the environment does not define.
    pub fn with_fallback(fallback: HashMap<String, String>) -> Self {
        Self { fallback }
    }
}

impl CredentialSource for EnvCredentials {
    fn get(&self, key: &str) -> Option<String> {
        std::env::var(key)
            .ok()
            .filter(|v| !v.is_empty())
            .or_else(|| self.fallback.get(key).filter(|v| !v.is_empty()).cloned())
    }
}

/// A fixed set of credentials.
#[derive(Debug, Clone, Default)]
pub struct StaticCredentials {
    values: HashMap<String, String>,
}

impl StaticCredentials {
    pub fn new() -> Self {
        Self::default()
    }

    /// Builder-style insert.
    pub fn with(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.values.insert(key.into(), value.into());
        self
    }
}

impl From<HashMap<String, String>> for StaticCredentials {
    fn from(values: HashMap<String, String>) -> Self {
        Self { values }
    }
}

impl CredentialSource for StaticCredentials {
    fn get(&self, key: &str) -> Option<String> {
        self.values.get(key).filter(|v| !v.is_empty()).cloned()
    }
}
