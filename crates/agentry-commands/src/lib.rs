//! CLI-style commands for agentry -- web search and tweet fetch.
//!
//! Each command implements the [`Command`] trait defined in [`traits`] and is
//! invoked by name through a [`CommandRegistry`].

use std::sync::Arc;
use std::time::Duration;

use agentry_agent::CredentialSource;

pub mod error;
pub mod traits;
pub mod tweets;
pub mod web_search;

pub use error::{CommandError, Result};
pub use traits::{Command, CommandDefinition, CommandRegistry};
pub use tweets::{TWITTER_BEARER_TOKEN, Tweet, TweetFetchCommand};
pub use web_search::{BRAVE_API_KEY, SearchEngine, SearchHit, WebSearchCommand};

/// HTTP timeout shared by every command.
pub(crate) const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

/// A registry holding every built-in command, configured from `credentials`.
pub fn builtin_commands(credentials: &dyn CredentialSource) -> CommandRegistry {
    let mut registry = CommandRegistry::new();
    registry
        .register(Arc::new(WebSearchCommand::from_credentials(credentials)))
        .register(Arc::new(TweetFetchCommand::from_credentials(credentials)));
    registry
}
