//! Provider identifiers and client construction.
//!
//! The set of supported providers is closed: [`ProviderId`] enumerates them and
//! parsing any other tag fails with [`AgentError::UnsupportedClient`].  Client
//! construction goes through a [`ClientRegistry`] that maps each provider to a
//! factory, so adding a provider (or substituting a fake one in tests) is a
//! registration rather than a new branch.

use std::collections::HashMap;
use std::fmt;
use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;

use crate::error::{AgentError, Result};
use crate::llm::client::{HttpModelClient, ModelClient};

// ---------------------------------------------------------------------------
// Constants
// ---------------------------------------------------------------------------

const OPENAI_BASE_URL: &str = "https://api.openai.com/v1";
const ANTHROPIC_BASE_URL: &str = "https://api.anthropic.com";
const FIREWORKS_BASE_URL: &str = "https://api.fireworks.ai/inference/v1";

const DEFAULT_MAX_TOKENS: u32 = 4096;
const DEFAULT_TIMEOUT: Duration = Duration::from_secs(120);

// ---------------------------------------------------------------------------
// Provider id
// ---------------------------------------------------------------------------

/// Wire protocol spoken by a provider.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WireDialect {
    /// OpenAI Chat Completions (also Fireworks).
    OpenAi,
    /// Anthropic Messages.
    Anthropic,
}

/// A supported model provider.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ProviderId {
    OpenAi,
    Anthropic,
    Fireworks,
}

impl ProviderId {
    /// Every supported provider.
    pub const ALL: [ProviderId; 3] = [Self::OpenAi, Self::Anthropic, Self::Fireworks];

    /// The tag used in agent definitions.
    pub fn as_str(self) -> &'static str {
        match self {
            Self::OpenAi => "openai",
            Self::Anthropic => "anthropic",
            Self::Fireworks => "fireworks",
        }
    }

    /// Name of the credential this provider needs.
    pub fn credential_key(self) -> &'static str {
        match self {
            Self::OpenAi => "OPENAI_API_KEY",
            Self::Anthropic => "ANTHROPIC_API_KEY",
            Self::Fireworks => "FIREWORKS_API_KEY",
        }
    }

    /// Default API base URL.
    pub fn default_base_url(self) -> &'static str {
        match self {
            Self::OpenAi => OPENAI_BASE_URL,
            Self::Anthropic => ANTHROPIC_BASE_URL,
            Self::Fireworks => FIREWORKS_BASE_URL,
        }
    }

    /// The wire protocol this provider speaks.
    pub fn dialect(self) -> WireDialect {
        match self {
            Self::OpenAi | Self::Fireworks => WireDialect::OpenAi,
            Self::Anthropic => WireDialect::Anthropic,
        }
    }
}

impl fmt::Display for ProviderId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ProviderId {
    type Err = AgentError;

    fn from_str(s: &str) -> Result<Self> {
        let tag = s.trim().to_ascii_lowercase();
        Self::ALL
            .into_iter()
            .find(|p| p.as_str() == tag)
            .ok_or_else(|| AgentError::UnsupportedClient {
                client: s.to_owned(),
            })
    }
}

// ---------------------------------------------------------------------------
// Client settings
// ---------------------------------------------------------------------------

/// Everything needed to construct a model client for one provider.
#[derive(Debug, Clone)]
pub struct ClientSettings {
    pub provider: ProviderId,
    pub api_key: String,
    /// Default model used when a request leaves `model` empty.
    pub model: String,
    pub base_url: String,
    /// Default maximum tokens per response.
    pub max_tokens: u32,
    pub timeout: Duration,
}

impl ClientSettings {
    /// Settings with the provider's default endpoint and limits.
    pub fn new(provider: ProviderId, api_key: impl Into<String>, model: impl Into<String>) -> Self {
        Self {
            provider,
            api_key: api_key.into(),
            model: model.into(),
            base_url: provider.default_base_url().to_owned(),
            max_tokens: DEFAULT_MAX_TOKENS,
            timeout: DEFAULT_TIMEOUT,
        }
    }
}

// ---------------------------------------------------------------------------
// Registry
// ---------------------------------------------------------------------------

/// Constructor for a model client.
pub type ClientFactory = Arc<dyn Fn(ClientSettings) -> Result<Box<dyn ModelClient>> + Send + Sync>;

/// Maps providers to client factories.
#[derive(Clone)]
pub struct ClientRegistry {
    factories: HashMap<ProviderId, ClientFactory>,
}

impl ClientRegistry {
    /// A registry with no providers.
    pub fn empty() -> Self {
        Self {
            factories: HashMap::new(),
        }
    }

    /// A registry with the HTTP client registered for every provider.
    pub fn builtin() -> Self {
        let mut registry = Self::empty();
        for provider in ProviderId::ALL {
            registry.register(provider, |settings| {
                Ok(Box::new(HttpModelClient::new(settings)?) as Box<dyn ModelClient>)
            });
        }
        registry
    }

    /// Register (or replace) the factory for a provider.
    pub fn register<F>(&mut self, provider: ProviderId, factory: F) -> &mut Self
    where
        F: Fn(ClientSettings) -> Result<Box<dyn ModelClient>> + Send + Sync + 'static,
    {
        self.factories.insert(provider, Arc::new(factory));
        self
    }

    /// Whether a factory is registered for the provider.
    pub fn supports(&self, provider: ProviderId) -> bool {
        self.factories.contains_key(&provider)
    }

    /// Construct a client for `settings.provider`.
    pub fn create(&self, settings: ClientSettings) -> Result<Box<dyn ModelClient>> {
        let factory =
            self.factories
                .get(&settings.provider)
                .ok_or_else(|| AgentError::UnsupportedClient {
                    client: settings.provider.to_string(),
                })?;
        tracing::debug!(provider = %settings.provider, model = %settings.model, "constructing model client");
        factory(settings)
    }
}

impl Default for ClientRegistry {
    fn default() -> Self {
        Self::builtin()
    }
}

impl fmt::Debug for ClientRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ClientRegistry")
            .field("providers", &self.factories.keys().collect::<Vec<_>>())
            .finish()
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
