//! Command error types.
//!
//! Every command surfaces failures through [`CommandError`].  Variants carry
//! the command name so callers can report which invocation failed without
//! parsing strings.

/// Unified error type for agentry commands.
#[derive(Debug, thiserror::Error)]
pub enum CommandError {
    /// No command is registered under the requested name.
    #[error("command not found: `{name}`")]
    NotFound { name: String },

    /// The parameters supplied to a command are invalid.
    #[error("invalid parameters for command `{command}`: {reason}")]
    InvalidParams { command: String, reason: String },

    /// A command needs a credential that is not configured.
    #[error("missing credential for command `{command}`: {key} is not set")]
    MissingCredential { command: String, key: String },

    /// The backing service call failed.
    #[error("execution failed for command `{command}`: {reason}")]
    ExecutionFailed { command: String, reason: String },

    /// The backing service did not answer in time.
    #[error("timeout after {seconds}s: {reason}")]
    Timeout { seconds: u64, reason: String },

    /// JSON serialization or deserialization failed.
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

/// Convenience alias used throughout the commands crate.
pub type Result<T> = std::result::Result<T, CommandError>;

impl CommandError {
    pub(crate) fn invalid(command: &str, reason: impl Into<String>) -> Self {
        Self::InvalidParams {
            command: command.to_owned(),
            reason: reason.into(),
        }
    }

    pub(crate) fn failed(command: &str, reason: impl Into<String>) -> Self {
        Self::ExecutionFailed {
            command: command.to_owned(),
            reason: reason.into(),
        }
    }

    /// Map a transport error, keeping timeouts distinct.
    pub(crate) fn from_transport(command: &str, service: &str, err: reqwest::Error) -> Self {
        if err.is_timeout() {
            Self::Timeout {
                seconds: crate::REQUEST_TIMEOUT.as_secs(),
                reason: format!("{service} request timed out: {err}"),
            }
        } else {
            Self::failed(command, format!("{service} request failed: {err}"))
        }
    }
}
