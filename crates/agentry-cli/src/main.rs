//! CLI entry point for agentry.
//!
//! This binary provides the `agentry` command with subcommands for running
//! and chatting with agents, listing definitions, searching the web and
//! fetching tweets.

mod cli;
mod helpers;
mod repl;

use anyhow::{Context, Result, bail};
use clap::Parser;
use serde_json::{Value, json};
use tracing::info;

use agentry_agent::{AgentRegistry, AgentryConfig, Message, Variables};
use agentry_commands::{Command, TweetFetchCommand, WebSearchCommand};

use crate::cli::{AgentSelector, Cli, Commands};
use crate::helpers::{
    agents_dir, build_agent, credentials, format_output, init_tracing, load_dotenv,
    load_history_file, load_settings,
};

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.verbose);
    load_dotenv();

    let config = load_settings(&cli)?;

    match cli.command {
        Commands::Run {
            selector,
            vars,
            history,
            message,
        } => {
            let history = history.as_deref().map(load_history_file).transpose()?;
            cmd_run(config, &selector, vars, history, message).await
        }
        Commands::Chat { selector } => repl::cmd_chat(build_agent(config, &selector)?).await,
        Commands::Agents => cmd_agents(&config),
        Commands::Search {
            query,
            max_results,
            json,
        } => cmd_search(&config, &query.join(" "), max_results, json).await,
        Commands::Tweets {
            user,
            query,
            max_results,
            json,
        } => cmd_tweets(&config, user, query, max_results, json).await,
    }
}

// ---------------------------------------------------------------------------
// Subcommand: run
// ---------------------------------------------------------------------------

async fn cmd_run(
    config: AgentryConfig,
    selector: &AgentSelector,
    vars: Vec<(String, Value)>,
    history: Option<Vec<Message>>,
    message: Option<String>,
) -> Result<()> {
    let mut agent = build_agent(config, selector)?;

    if let Some(messages) = history {
        info!(count = messages.len(), "seeding chat history");
        agent.load_chat_history(messages);
    }
    if message.is_none() && agent.full_chat_history().is_empty() {
        bail!("nothing to send: provide a message or a non-empty --history file");
    }

    let variables: Variables = vars.into_iter().collect();
    let variables = (!variables.is_empty()).then_some(variables);

    let result = agent.run(message.as_deref(), variables.as_ref()).await;
    if !result.success {
        bail!(
            "agent `{}` failed: {}",
            agent.definition().name,
            result.error.unwrap_or_default()
        );
    }

    println!("{}", format_output(&result));
    Ok(())
}

// ---------------------------------------------------------------------------
// Subcommand: agents
// ---------------------------------------------------------------------------

fn cmd_agents(config: &AgentryConfig) -> Result<()> {
    let dir = agents_dir(config);
    let registry = AgentRegistry::load_dir(&dir)
        .with_context(|| format!("failed to read agents directory {}", dir.display()))?;

    if registry.is_empty() {
        println!("  No agents found in {}", dir.display());
        return Ok(());
    }

    let width = registry.names().map(str::len).max().unwrap_or(0);
    for definition in registry.definitions() {
        println!(
            "  {:<width$}  {:<10} {}",
            definition.name, definition.client, definition.description
        );
    }
    Ok(())
}

// ---------------------------------------------------------------------------
// Subcommands: search / tweets
// ---------------------------------------------------------------------------

async fn cmd_search(
    config: &AgentryConfig,
    query: &str,
    max_results: u64,
    raw_json: bool,
) -> Result<()> {
    let command = WebSearchCommand::from_credentials(&credentials(config));
    let output = command
        .execute(json!({ "query": query, "max_results": max_results }))
        .await?;

    if raw_json {
        println!("{}", serde_json::to_string_pretty(&output)?);
        return Ok(());
    }

    let results = output["results"].as_array().map(Vec::as_slice).unwrap_or_default();
    println!("  {} result(s) from {}", results.len(), output["engine"].as_str().unwrap_or("?"));
    for (i, hit) in results.iter().enumerate() {
        println!();
        println!("  {}. {}", i + 1, hit["title"].as_str().unwrap_or_default());
        println!("     {}", hit["url"].as_str().unwrap_or_default());
        let snippet = hit["snippet"].as_str().unwrap_or_default();
        if !snippet.is_empty() {
            println!("     {snippet}");
        }
    }
    Ok(())
}

async fn cmd_tweets(
    config: &AgentryConfig,
    user: Option<String>,
    query: Option<String>,
    max_results: u64,
    raw_json: bool,
) -> Result<()> {
    let command = TweetFetchCommand::from_credentials(&credentials(config));
    let output = command
        .execute(json!({ "username": user, "query": query, "max_results": max_results }))
        .await?;

    if raw_json {
        println!("{}", serde_json::to_string_pretty(&output)?);
        return Ok(());
    }

    let tweets = output["tweets"].as_array().map(Vec::as_slice).unwrap_or_default();
    if tweets.is_empty() {
        println!("  No posts found.");
    }
    for tweet in tweets {
        let when = tweet["created_at"].as_str().unwrap_or("-");
        let author = tweet["author_id"].as_str().unwrap_or("?");
        println!("  [{when}] {author}: {}", tweet["text"].as_str().unwrap_or_default());
    }
    Ok(())
}
