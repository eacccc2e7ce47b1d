//! Shared helper functions used across CLI subcommands.
//!
//! Includes tracing initialization, settings loading, agent construction and
//! output formatting.

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use serde_json::Value;
use tracing::debug;
use tracing_subscriber::EnvFilter;

use agentry_agent::{
    Agent, AgentOptions, AgentryConfig, EnvCredentials, Message, Role, RunResult,
    default_agents_dir, default_config_path,
};

use crate::cli::{AgentSelector, Cli};

// ---------------------------------------------------------------------------
// Tracing
// ---------------------------------------------------------------------------

/// Initialize the tracing subscriber.  `RUST_LOG` wins over `--verbose`.
pub fn init_tracing(verbose: bool) {
    let default_level = if verbose { "debug" } else { "warn" };
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .compact()
        .init();
}

/// Load `.env` from the working directory, if present.
pub fn load_dotenv() {
    match dotenvy::dotenv() {
        Ok(path) => debug!(path = %path.display(), "loaded .env"),
        Err(e) if e.not_found() => {}
        Err(e) => tracing::warn!(error = %e, "failed to load .env"),
    }
}

// ---------------------------------------------------------------------------
// Settings
// ---------------------------------------------------------------------------

/// Load the settings file and apply command-line overrides.
pub fn load_settings(cli: &Cli) -> Result<AgentryConfig> {
    let path = cli.settings.clone().unwrap_or_else(default_config_path);
    let mut config = AgentryConfig::load(&path)
        .with_context(|| format!("failed to load settings from {}", path.display()))?;

    if let Some(dir) = &cli.agents_dir {
        config.agents_dir = Some(dir.clone());
    }
    Ok(config)
}

/// The agents directory in effect.
pub fn agents_dir(config: &AgentryConfig) -> PathBuf {
    config.agents_dir.clone().unwrap_or_else(default_agents_dir)
}

/// Credentials from the environment, falling back to the settings file.
pub fn credentials(config: &AgentryConfig) -> EnvCredentials {
    EnvCredentials::with_fallback(config.api_keys.clone())
}

// ---------------------------------------------------------------------------
// Agents
// ---------------------------------------------------------------------------

/// Build the agent picked on the command line.
pub fn build_agent(config: AgentryConfig, selector: &AgentSelector) -> Result<Agent> {
    let options = AgentOptions {
        agent_name: selector.agent.clone(),
        agent_config_path: selector.config.clone(),
    };
    let label = selector
        .agent
        .clone()
        .or_else(|| selector.config.as_ref().map(|p| p.display().to_string()))
        .unwrap_or_default();

    Agent::builder()
        .config(config)
        .build(options)
        .with_context(|| format!("failed to create agent `{label}`"))
}

/// Read a JSON array of messages.
pub fn load_history_file(path: &Path) -> Result<Vec<Message>> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("failed to read history file {}", path.display()))?;
    serde_json::from_str(&content)
        .with_context(|| format!("history file {} is not a JSON message array", path.display()))
}

/// Parse a `KEY=VALUE` template variable.
pub fn parse_var(raw: &str) -> std::result::Result<(String, Value), String> {
    let (key, value) = raw
        .split_once('=')
        .ok_or_else(|| format!("expected KEY=VALUE, got `{raw}`"))?;
    let key = key.trim();
    if key.is_empty() {
        return Err(format!("empty variable name in `{raw}`"));
    }
    let value = serde_json::from_str(value).unwrap_or_else(|_| Value::String(value.to_owned()));
    Ok((key.to_owned(), value))
}

// ---------------------------------------------------------------------------
// Output
// ---------------------------------------------------------------------------

/// Render a run's output: text verbatim, structured values as pretty JSON.
pub fn format_output(result: &RunResult) -> String {
    match &result.output {
        None => String::new(),
        Some(Value::String(text)) => text.clone(),
        Some(other) => serde_json::to_string_pretty(other).unwrap_or_else(|_| other.to_string()),
    }
}

/// One line per history message.
pub fn format_history(messages: &[Message]) -> String {
    messages
        .iter()
        .map(|m| {
            let role = match m.role {
                Role::User => "user",
                Role::Agent => "agent",
            };
            format!("  [{role}] {}", m.content)
        })
        .collect::<Vec<_>>()
        .join("\n")
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use tempfile::tempdir;

    #[test]
    fn parse_var_accepts_json_and_plain_values() {
        assert_eq!(parse_var("n=3").unwrap(), ("n".into(), json!(3)));
        assert_eq!(parse_var("flag=true").unwrap(), ("flag".into(), json!(true)));
        assert_eq!(
            parse_var("style=very short").unwrap(),
            ("style".into(), json!("very short"))
        );
        assert_eq!(parse_var("eq=a=b").unwrap(), ("eq".into(), json!("a=b")));
        assert_eq!(parse_var("empty=").unwrap(), ("empty".into(), json!("")));
        assert!(parse_var("novalue").is_err());
        assert!(parse_var("=x").is_err());
    }

    #[test]
    fn history_file_round_trips_roles() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("history.json");
        std::fs::write(
            &path,
            r#"[{"role": "user", "content": "hi"}, {"role": "agent", "content": "hello"}]"#,
        )
        .unwrap();

        let messages = load_history_file(&path).unwrap();
        assert_eq!(messages, [Message::user("hi"), Message::agent("hello")]);
        assert_eq!(format_history(&messages), "  [user] hi\n  [agent] hello");
    }

    #[test]
    fn history_file_errors_name_the_file() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("bad.json");
        std::fs::write(&path, r#"{"role": "user"}"#).unwrap();
        let err = load_history_file(&path).unwrap_err();
        assert!(err.to_string().contains("bad.json"));
    }

    #[test]
    fn format_output_pretty_prints_structures() {
        let text = RunResult {
            success: true,
            output: Some(json!("plain")),
            error: None,
        };
        assert_eq!(format_output(&text), "plain");

        let structured = RunResult {
            success: true,
            output: Some(json!({"count": 2})),
            error: None,
        };
        assert_eq!(format_output(&structured), "{\n  \"count\": 2\n}");
    }
}
