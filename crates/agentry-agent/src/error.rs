//! Agent error types.
//!
//! Construction-time failures surface through [`AgentError`] and halt agent
//! creation.  Run-time failures are folded into a
//! [`RunResult`](crate::runtime::RunResult) by the runtime, so callers only
//! handle `AgentError` when building an agent or talking to a model client
//! directly.

use std::path::PathBuf;

/// Unified error type for the agent crate.
#[derive(Debug, thiserror::Error)]
pub enum AgentError {
    // -- Construction errors -------------------------------------------------
    /// Construction options were missing, ambiguous, or otherwise invalid.
    #[error("config error: {reason}")]
    Config { reason: String },

    /// A credential required by the selected provider is not configured.
    #[error("missing credential: {key} is not set")]
    MissingCredential { key: String },

    /// The definition names a provider outside the supported set.
    #[error("Unsupported model client: {client}")]
    UnsupportedClient { client: String },

    /// No agent definition is registered under the requested name.
    #[error("agent definition not found: {name}")]
    DefinitionNotFound { name: String },

    /// An agent definition file could not be read or parsed.
    #[error("failed to load agent definition {}: {reason}", path.display())]
    DefinitionLoad { path: PathBuf, reason: String },

    /// The definition's output schema could not be compiled.
    #[error("invalid output schema for agent `{agent}`: {reason}")]
    InvalidOutputSchema { agent: String, reason: String },

    // -- LLM errors ----------------------------------------------------------
    /// An HTTP request to the LLM provider failed.
    #[error("llm request failed: {reason}")]
    LlmRequestFailed { reason: String },

    /// The LLM response could not be parsed into the expected format.
    #[error("llm response parse error: {reason}")]
    LlmParseFailed { reason: String },

    // -- I/O -----------------------------------------------------------------
    /// An I/O operation failed.
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

/// Convenience alias used throughout the agent crate.
pub type Result<T> = std::result::Result<T, AgentError>;
