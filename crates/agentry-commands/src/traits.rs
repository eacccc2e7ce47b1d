//! Core command trait and the command registry.
//!
//! Every command (web search, tweet fetch, ...) implements [`Command`], which
//! gives the CLI and any agent-facing tooling a uniform way to discover and
//! invoke them.

use std::collections::BTreeMap;
use std::sync::Arc;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::{CommandError, Result};

// ---------------------------------------------------------------------------
// Supporting types
// ---------------------------------------------------------------------------

/// Machine-readable description of a command.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CommandDefinition {
    /// Command name (e.g. `web_search`).
    pub name: String,
    /// Human-readable description of what the command does.
    pub description: String,
    /// JSON Schema describing the command's input parameters.
    pub parameters: Value,
}

// ---------------------------------------------------------------------------
// Core trait
// ---------------------------------------------------------------------------

/// The universal command interface.
#[async_trait]
pub trait Command: Send + Sync {
    /// Unique command name.
    fn name(&self) -> &str;

    /// Human-readable description.
    fn description(&self) -> &str;

    /// JSON Schema for the parameters accepted by [`Command::execute`].
    fn parameters(&self) -> Value;

    /// Run the command with JSON parameters and return its JSON output.
    async fn execute(&self, params: Value) -> Result<Value>;

    /// Credential key the command needs, if any.
    fn required_credential(&self) -> Option<&str> {
        None
    }

    /// Bundle name, description and parameters.
    fn definition(&self) -> CommandDefinition {
        CommandDefinition {
            name: self.name().to_owned(),
            description: self.description().to_owned(),
            parameters: self.parameters(),
        }
    }
}

// ---------------------------------------------------------------------------
// Registry
// ---------------------------------------------------------------------------

/// Commands keyed by name.
#[derive(Clone, Default)]
pub struct CommandRegistry {
    commands: BTreeMap<String, Arc<dyn Command>>,
}

impl CommandRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a command, replacing any command with the same name.
    pub fn register(&mut self, command: Arc<dyn Command>) -> &mut Self {
        let name = command.name().to_owned();
        if self.commands.insert(name.clone(), command).is_some() {
            tracing::warn!(command = %name, "command replaced");
        }
        self
    }

    pub fn get(&self, name: &str) -> Option<&Arc<dyn Command>> {
        self.commands.get(name)
    }

    /// Registered names, sorted.
    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.commands.keys().map(String::as_str)
    }

    /// Definitions of every registered command, sorted by name.
    pub fn definitions(&self) -> Vec<CommandDefinition> {
        self.commands.values().map(|c| c.definition()).collect()
    }

    /// Look up `name` and execute it.
    pub async fn execute(&self, name: &str, params: Value) -> Result<Value> {
        let command = self.get(name).ok_or_else(|| CommandError::NotFound {
            name: name.to_owned(),
        })?;
        tracing::debug!(command = name, "executing command");
        command.execute(params).await
    }

    pub fn len(&self) -> usize {
        self.commands.len()
    }

    pub fn is_empty(&self) -> bool {
        self.commands.is_empty()
    }
}

impl std::fmt::Debug for CommandRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CommandRegistry")
            .field("commands", &self.names().collect::<Vec<_>>())
            .finish()
    }
}
