//! Agent façade.
//!
//! [`Agent`] is the entry point callers use: it resolves a definition, picks
//! and constructs the model client, compiles the output schema, and then
//! forwards the narrow call surface to an [`AgentRuntime`].
//!
//! ```no_run
//! # async fn demo() -> agentry_agent::Result<()> {
//! use agentry_agent::{Agent, AgentOptions};
//!
//! let mut agent = Agent::new(AgentOptions::named("summarizer"))?;
//! let result = agent.run(Some("Summarize: the quick brown fox"), None).await;
//! println!("{:?}", result.output);
//! # Ok(())
//! # }
//! ```

use std::path::PathBuf;
use std::sync::Arc;

use crate::config::{AgentryConfig, CredentialSource, EnvCredentials};
use crate::definition::{
    AgentDefinition, DefinitionSource, default_agents_dir, load_definition_file, resolve_in_dir,
};
use crate::error::{AgentError, Result};
use crate::llm::provider::{ClientRegistry, ClientSettings, ProviderId};
use crate::llm::types::Message;
use crate::runtime::{AgentRuntime, RunResult, Variables};
use crate::schema::compile_schema;

// ---------------------------------------------------------------------------
// Options
// ---------------------------------------------------------------------------

/// How to locate the agent definition.  Exactly one field must be set.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AgentOptions {
    /// Name resolved through the configured [`DefinitionSource`].
    pub agent_name: Option<String>,
    /// Path of a YAML definition file.
    pub agent_config_path: Option<PathBuf>,
}

impl AgentOptions {
    pub fn named(name: impl Into<String>) -> Self {
        Self {
            agent_name: Some(name.into()),
            agent_config_path: None,
        }
    }

    pub fn from_path(path: impl Into<PathBuf>) -> Self {
        Self {
            agent_name: None,
            agent_config_path: Some(path.into()),
        }
    }
}

enum DefinitionRef<'a> {
    Name(&'a str),
    Path(&'a PathBuf),
}

impl AgentOptions {
    fn definition_ref(&self) -> Result<DefinitionRef<'_>> {
        match (&self.agent_name, &self.agent_config_path) {
            (Some(name), None) => Ok(DefinitionRef::Name(name)),
            (None, Some(path)) => Ok(DefinitionRef::Path(path)),
            (None, None) => Err(AgentError::Config {
                reason: "either agent_name or agent_config_path must be provided".into(),
            }),
            (Some(_), Some(_)) => Err(AgentError::Config {
                reason: "agent_name and agent_config_path are mutually exclusive".into(),
            }),
        }
    }
}

// ---------------------------------------------------------------------------
// Builder
// ---------------------------------------------------------------------------

/// Assembles an [`Agent`] from injectable collaborators.
///
/// Anything not supplied falls back to the process defaults: definitions are
/// loaded from the configured agents directory, credentials come from the
/// environment (then the config's `[api_keys]` table), and clients from
/// [`ClientRegistry::builtin`].
#[derive(Default)]
pub struct AgentBuilder {
    definitions: Option<Arc<dyn DefinitionSource>>,
    credentials: Option<Arc<dyn CredentialSource>>,
    clients: Option<ClientRegistry>,
    config: AgentryConfig,
}

impl AgentBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn definitions(mut self, source: Arc<dyn DefinitionSource>) -> Self {
        self.definitions = Some(source);
        self
    }

    pub fn credentials(mut self, source: Arc<dyn CredentialSource>) -> Self {
        self.credentials = Some(source);
        self
    }

    pub fn clients(mut self, registry: ClientRegistry) -> Self {
        self.clients = Some(registry);
        self
    }

    pub fn config(mut self, config: AgentryConfig) -> Self {
        self.config = config;
        self
    }

    /// Resolve, validate and construct.  Nothing is built unless every step
    /// succeeds.
    pub fn build(self, options: AgentOptions) -> Result<Agent> {
        let definition = match options.definition_ref()? {
            DefinitionRef::Path(path) => load_definition_file(path)?,
            DefinitionRef::Name(name) => match &self.definitions {
                Some(source) => source.resolve(name)?,
                None => {
                    let dir = self
                        .config
                        .agents_dir
                        .clone()
                        .unwrap_or_else(default_agents_dir);
                    resolve_in_dir(&dir, name)?
                }
            },
        };

        let provider: ProviderId = definition.client.parse()?;

        let credentials = self.credentials.unwrap_or_else(|| {
            Arc::new(EnvCredentials::with_fallback(self.config.api_keys.clone()))
        });
        let key = provider.credential_key();
        let api_key = credentials
            .get(key)
            .ok_or_else(|| AgentError::MissingCredential { key: key.to_owned() })?;

        let validator = match &definition.output_schema {
            None => None,
            Some(schema) => Some(compile_schema(Some(schema)).map_err(|e| {
                AgentError::InvalidOutputSchema {
                    agent: definition.name.clone(),
                    reason: e.to_string(),
                }
            })?),
        };

        let mut settings = ClientSettings::new(provider, api_key, definition.model.clone());
        if let Some(overrides) = self.config.overrides_for(provider) {
            overrides.apply(&mut settings);
        }
        let client = self.clients.unwrap_or_default().create(settings)?;

        tracing::info!(
            agent = %definition.name,
            provider = %provider,
            model = %definition.model,
            structured = validator.is_some(),
            "agent constructed"
        );

        Ok(Agent {
            runtime: AgentRuntime::new(definition, client, validator),
        })
    }
}

impl std::fmt::Debug for AgentBuilder {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AgentBuilder")
            .field("custom_definitions", &self.definitions.is_some())
            .field("custom_credentials", &self.credentials.is_some())
            .field("clients", &self.clients)
            .field("config", &self.config)
            .finish()
    }
}

// ---------------------------------------------------------------------------
// Agent
// ---------------------------------------------------------------------------

/// A constructed agent.
#[derive(Debug)]
pub struct Agent {
    runtime: AgentRuntime,
}

impl Agent {
    /// Build an agent with the default collaborators.
    pub fn new(options: AgentOptions) -> Result<Self> {
        AgentBuilder::new().build(options)
    }

    pub fn builder() -> AgentBuilder {
        AgentBuilder::new()
    }

    pub fn definition(&self) -> &AgentDefinition {
        self.runtime.definition()
    }

    /// See [`AgentRuntime::run`].
    pub async fn run(
        &mut self,
        user_message: Option<&str>,
        variables: Option<&Variables>,
    ) -> RunResult {
        self.runtime.run(user_message, variables).await
    }

    pub fn load_chat_history(&mut self, messages: Vec<Message>) {
        self.runtime.load_chat_history(messages);
    }

    pub fn last_agent_message(&self) -> Option<&Message> {
        self.runtime.last_agent_message()
    }

    pub fn chat_history(&self, limit: Option<usize>) -> &[Message] {
        self.runtime.chat_history(limit)
    }

    pub fn full_chat_history(&self) -> &[Message] {
        self.runtime.full_chat_history()
    }

    pub fn add_user_message(&mut self, content: impl Into<String>) {
        self.runtime.add_user_message(content);
    }

    pub fn add_agent_message(&mut self, content: impl Into<String>) {
        self.runtime.add_agent_message(content);
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
