//! Agent runtime for agentry.
//!
//! This crate turns a declarative agent definition into a callable agent: it
//! picks and constructs the provider client, compiles the definition's output
//! schema into a validator, and keeps the conversation history across runs.
//!
//! ## Architecture
//!
//! ```text
//! ┌──────────────┐     ┌──────────────┐     ┌──────────────┐
//! │    Agent     │────>│ AgentRuntime │────>│ ModelClient  │
//! │  (façade)    │     │ (run/history)│     │ (HTTP / mock)│
//! └──────┬───────┘     └──────┬───────┘     └──────────────┘
//!        │                    │
//!  ┌─────┴──────┐      ┌──────┴──────┐
//!  │ Definition │      │  Validator  │
//!  │  (YAML)    │      │  (schema)   │
//!  └────────────┘      └─────────────┘
//! ```
//!
//! ## Modules
//!
//! - [`agent`] -- The [`Agent`] façade and its builder.
//! - [`runtime`] -- Prompt rendering, the run cycle, and history.
//! - [`schema`] -- Output schema parsing and validation.
//! - [`llm`] -- Model client capability, wire dialects, provider registry.
//! - [`definition`] -- Agent definitions and the definition registry.
//! - [`config`] -- TOML configuration and credential sources.
//! - [`error`] -- Agent error types.

pub mod agent;
pub mod config;
pub mod definition;
pub mod error;
pub mod llm;
pub mod runtime;
pub mod schema;

// Re-export the most commonly used types at the crate root.
pub use agent::{Agent, AgentBuilder, AgentOptions};
pub use config::{
    AgentryConfig, CredentialSource, EnvCredentials, ProviderOverrides, StaticCredentials,
    default_config_path,
};
pub use definition::{
    AgentDefinition, AgentRegistry, DefinitionError, DefinitionSource, default_agents_dir,
    load_definition_file, resolve_in_dir,
};
pub use error::{AgentError, Result};
pub use llm::{
    ChatRequest, ChatResponse, ClientFactory, ClientRegistry, ClientSettings, HttpModelClient,
    Message, ModelClient, ProviderId, Role, WireDialect,
};
pub use runtime::{AgentRuntime, RunResult, Variables, render_template};
pub use schema::{
    Field, OutputShape, SchemaError, ShapeKind, ValidationError, Validator, compile_schema,
};
