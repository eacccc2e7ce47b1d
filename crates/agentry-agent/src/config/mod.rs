//! File-based configuration.
//!
//! Settings live in a TOML file (default `agentry.toml`, overridable through
//! `$AGENTRY_CONFIG`):
//!
//! ```toml
//! agents_dir = "agents"
//!
//! [providers.openai]
//! base_url = "http://localhost:8080/v1"
//! max_tokens = 2048
//! timeout_secs = 60
//!
//! [api_keys]
//! FIREWORKS_API_KEY = "fw-..."
//! ```
//!
//! Credentials are resolved separately through [`CredentialSource`].

pub mod credentials;

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::error::{AgentError, Result};
use crate::llm::provider::{ClientSettings, ProviderId};

pub use credentials::{CredentialSource, EnvCredentials, StaticCredentials};

/// Per-provider overrides of the built-in client defaults.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProviderOverrides {
    /// Alternative API base URL (proxies, local gateways).
    #[serde(default)]
    pub base_url: Option<String>,
    /// Default maximum tokens per response.
    #[serde(default)]
    pub max_tokens: Option<u32>,
    /// HTTP request timeout in seconds.
    #[serde(default)]
    pub timeout_secs: Option<u64>,
}

impl ProviderOverrides {
    /// Apply the overrides on top of `settings`.
    pub fn apply(&self, settings: &mut ClientSettings) {
        if let Some(url) = &self.base_url {
            settings.base_url = url.trim_end_matches('/').to_owned();
        }
        if let Some(max_tokens) = self.max_tokens {
            settings.max_tokens = max_tokens;
        }
        if let Some(secs) = self.timeout_secs {
            settings.timeout = Duration::from_secs(secs);
        }
    }
}

/// Top-level configuration.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AgentryConfig {
    /// Directory holding agent definition files.
    #[serde(default)]
    pub agents_dir: Option<PathBuf>,

    /// Overrides keyed by provider tag (`openai`, `anthropic`, `fireworks`).
    #[serde(default)]
    pub providers: HashMap<String, ProviderOverrides>,

    /// Credentials used when the environment does not provide them.
    #[serde(default)]
    pub api_keys: HashMap<String, String>,
}

impl AgentryConfig {
    /// Load configuration from a TOML file.
    ///
    /// A missing file yields the defaults.  Unreadable or invalid files, and
    /// provider sections naming an unsupported provider, are errors.
    pub fn load(path: &Path) -> Result<Self> {
        if !path.exists() {
            warn!(path = %path.display(), "configuration file does not exist, using defaults");
            return Ok(Self::default());
        }

        let content = std::fs::read_to_string(path).map_err(|e| AgentError::Config {
            reason: format!("failed to read config file {}: {e}", path.display()),
        })?;

        let config = Self::from_toml(&content)?;
        info!(path = %path.display(), providers = config.providers.len(), "configuration loaded");
        Ok(config)
    }

    /// Parse configuration from TOML text.
    pub fn from_toml(content: &str) -> Result<Self> {
        let config: Self = toml::from_str(content).map_err(|e| AgentError::Config {
            reason: format!("failed to parse TOML config: {e}"),
        })?;

        for tag in config.providers.keys() {
            tag.parse::<ProviderId>().map_err(|_| AgentError::Config {
                reason: format!("unknown provider section `providers.{tag}`"),
            })?;
        }

        Ok(config)
    }

    /// Overrides configured for a provider, if any.
    pub fn overrides_for(&self, provider: ProviderId) -> Option<&ProviderOverrides> {
        self.providers
            .iter()
            .find(|(tag, _)| tag.parse::<ProviderId>().ok() == Some(provider))
            .map(|(_, overrides)| overrides)
    }
}

/// Return the default configuration file path.
///
/// Priority:
/// 1. `$AGENTRY_CONFIG` environment variable
/// 2. `./agentry.toml`
pub fn default_config_path() -> PathBuf {
    match std::env::var("AGENTRY_CONFIG") {
        Ok(path) if !path.is_empty() => PathBuf::from(path),
        _ => PathBuf::from("agentry.toml"),
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn missing_file_yields_defaults() {
        let dir = tempdir().unwrap();
        let config = AgentryConfig::load(&dir.path().join("absent.toml")).unwrap();
        assert_eq!(config, AgentryConfig::default());
    }

    #[test]
    fn loads_providers_and_keys_from_file() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("agentry.toml");
        std::fs::write(
            &path,
            r#"
agents_dir = "my-agents"

[providers.openai]
base_url = "http://localhost:8080/v1/"
timeout_secs = 30

[api_keys]
OPENAI_API_KEY = "sk-file"
"#,
        )
        .unwrap();

        let config = AgentryConfig::load(&path).unwrap();
        assert_eq!(config.agents_dir, Some(PathBuf::from("my-agents")));
        assert_eq!(config.api_keys.get("OPENAI_API_KEY").map(String::as_str), Some("sk-file"));

        let overrides = config.overrides_for(ProviderId::OpenAi).unwrap();
        let mut settings = ClientSettings::new(ProviderId::OpenAi, "k", "gpt-4o");
        overrides.apply(&mut settings);
        assert_eq!(settings.base_url, "http://localhost:8080/v1");
        assert_eq!(settings.timeout, Duration::from_secs(30));
        assert_eq!(settings.max_tokens, 4096);

        assert!(config.overrides_for(ProviderId::Anthropic).is_none());
    }

    #[test]
    fn unknown_provider_section_is_rejected() {
        let result = AgentryConfig::from_toml("[providers.grok]\nmax_tokens = 10\n");
        assert!(matches!(result, Err(AgentError::Config { .. })));
    }

    #[test]
    fn invalid_toml_is_rejected() {
        assert!(AgentryConfig::from_toml("agents_dir = [").is_err());
    }
}
