//! Agent definitions and where they come from.
//!
//! An agent is declared in a YAML file:
//!
//! ```yaml
//! name: summarizer
//! description: Summarizes text
//! system_prompt: |
//!   You summarize text for {{audience}}.
//! model: gpt-4o-mini
//! client: openai
//! dynamic_variables:
//!   audience: engineers
//! output_schema:
//!   type: object
//!   properties:
//!     summary: { type: string }
//!   required: [summary]
//! ```
//!
//! Definitions are resolved by name through a [`DefinitionSource`] (usually an
//! [`AgentRegistry`] filled from a directory), or loaded directly from a path
//! with [`load_definition_file`].

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::{AgentError, Result};

/// Declarative description of an agent.  Immutable once loaded.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AgentDefinition {
    pub name: String,

    #[serde(default)]
    pub description: String,

    /// Prompt template; `{{variable}}` placeholders are filled at run time.
    pub system_prompt: String,

    /// Model identifier passed to the provider.
    pub model: String,

    /// Provider tag (`openai`, `anthropic`, `fireworks`).
    pub client: String,

    /// Default values for template variables.
    #[serde(default)]
    pub dynamic_variables: BTreeMap<String, Value>,

    /// Expected shape of the answer, in the output schema dialect.
    #[serde(default)]
    pub output_schema: Option<Value>,

    #[serde(default)]
    pub temperature: Option<f32>,

    #[serde(default)]
    pub max_tokens: Option<u32>,
}

/// Why a definition document was rejected.
#[derive(Debug, thiserror::Error)]
pub enum DefinitionError {
    #[error("invalid YAML: {0}")]
    Yaml(#[from] serde_yaml::Error),

    #[error("`{field}` must not be empty")]
    EmptyField { field: &'static str },
}

impl AgentDefinition {
    /// Parse a definition from YAML text and check its mandatory fields.
    pub fn from_yaml(content: &str) -> std::result::Result<Self, DefinitionError> {
        let definition: Self = serde_yaml::from_str(content)?;
        definition.check()?;
        Ok(definition)
    }

    fn check(&self) -> std::result::Result<(), DefinitionError> {
        let mandatory = [
            ("name", &self.name),
            ("system_prompt", &self.system_prompt),
            ("model", &self.model),
            ("client", &self.client),
        ];
        for (field, value) in mandatory {
            if value.trim().is_empty() {
                return Err(DefinitionError::EmptyField { field });
            }
        }
        Ok(())
    }
}

/// Load a single definition file.
pub fn load_definition_file(path: &Path) -> Result<AgentDefinition> {
    let content = std::fs::read_to_string(path).map_err(|e| AgentError::DefinitionLoad {
        path: path.to_owned(),
        reason: e.to_string(),
    })?;

    AgentDefinition::from_yaml(&content).map_err(|e| AgentError::DefinitionLoad {
        path: path.to_owned(),
        reason: e.to_string(),
    })
}

/// Resolve `name` from the definitions in `dir`.
///
/// `<dir>/<name>.yaml` (or `.yml`) is loaded directly when present, so a file
/// that fails to parse reports its load error instead of "not found".  Other
/// files are only scanned when no such file declares `name`.
pub fn resolve_in_dir(dir: &Path, name: &str) -> Result<AgentDefinition> {
    if !name.is_empty() && !name.contains(['/', '\\']) {
        for ext in ["yaml", "yml"] {
            let path = dir.join(format!("{name}.{ext}"));
            if !path.is_file() {
                continue;
            }
            let definition = load_definition_file(&path)?;
            if definition.name == name {
                return Ok(definition);
            }
            tracing::debug!(
                path = %path.display(),
                declared = %definition.name,
                "file name does not match the declared agent name"
            );
        }
    }
    AgentRegistry::load_dir(dir)?.resolve(name)
}

// ---------------------------------------------------------------------------
// Name resolution
// ---------------------------------------------------------------------------

/// Resolves agent definitions by name.
pub trait DefinitionSource: Send + Sync {
    /// Return the definition registered as `name`.
    fn resolve(&self, name: &str) -> Result<AgentDefinition>;
}

/// In-memory registry of definitions keyed by name.
#[derive(Debug, Clone, Default)]
pub struct AgentRegistry {
    definitions: BTreeMap<String, AgentDefinition>,
}

impl AgentRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Load every `*.yaml` / `*.yml` file in `dir`.
    ///
    /// Files are visited in name order; a later file registering the same
    /// name replaces the earlier one.  Files that fail to parse are logged and
    /// skipped.  A missing directory yields an empty registry.
    pub fn load_dir(dir: &Path) -> Result<Self> {
        let mut registry = Self::new();

        if !dir.exists() {
            tracing::debug!(path = %dir.display(), "agents directory does not exist");
            return Ok(registry);
        }

        let mut paths: Vec<PathBuf> = std::fs::read_dir(dir)?
            .filter_map(|e| e.ok())
            .map(|e| e.path())
            .filter(|p| {
                p.is_file()
                    && p.extension()
                        .is_some_and(|ext| ext == "yaml" || ext == "yml")
            })
            .collect();
        paths.sort();

        for path in paths {
            match load_definition_file(&path) {
                Ok(definition) => {
                    tracing::debug!(name = %definition.name, path = %path.display(), "loaded agent definition");
                    if let Some(previous) = registry.insert(definition) {
                        tracing::warn!(name = %previous.name, path = %path.display(), "agent definition replaced");
                    }
                }
                Err(e) => {
                    tracing::warn!(path = %path.display(), error = %e, "failed to load agent definition");
                }
            }
        }

        tracing::info!(count = registry.len(), dir = %dir.display(), "agent definitions loaded");
        Ok(registry)
    }

    /// Register a definition, returning the one it replaced.
    pub fn insert(&mut self, definition: AgentDefinition) -> Option<AgentDefinition> {
        self.definitions.insert(definition.name.clone(), definition)
    }

    pub fn get(&self, name: &str) -> Option<&AgentDefinition> {
        self.definitions.get(name)
    }

    /// Registered names, sorted.
    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.definitions.keys().map(String::as_str)
    }

    /// Registered definitions, sorted by name.
    pub fn definitions(&self) -> impl Iterator<Item = &AgentDefinition> {
        self.definitions.values()
    }

    pub fn len(&self) -> usize {
        self.definitions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.definitions.is_empty()
    }
}

impl DefinitionSource for AgentRegistry {
    fn resolve(&self, name: &str) -> Result<AgentDefinition> {
        self.get(name)
            .cloned()
            .ok_or_else(|| AgentError::DefinitionNotFound {
                name: name.to_owned(),
            })
    }
}

/// Return the default agents directory.
///
/// Priority:
/// 1. `$AGENTRY_AGENTS_DIR` environment variable
/// 2. `./agents/`
pub fn default_agents_dir() -> PathBuf {
    match std::env::var("AGENTRY_AGENTS_DIR") {
        Ok(dir) if !dir.is_empty() => PathBuf::from(dir),
        _ => PathBuf::from("agents"),
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
