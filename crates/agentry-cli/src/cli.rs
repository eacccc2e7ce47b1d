//! CLI argument definitions for agentry.
//!
//! All `clap` structures live here so that `main.rs` stays focused on
//! dispatching subcommands.

use std::path::PathBuf;

use clap::{Args, Parser, Subcommand};
use serde_json::Value;

use crate::helpers::parse_var;

/// agentry -- run declarative LLM agents from the command line.
#[derive(Parser)]
#[command(
    name = "agentry",
    version,
    about = "agentry -- run declarative LLM agents",
    long_about = "Runs agents described in YAML files against OpenAI, Anthropic or Fireworks, \
                  validates structured output, and provides web search and tweet fetch commands."
)]
pub struct Cli {
    /// Directory holding agent definition files.
    #[arg(long, global = true, value_name = "DIR")]
    pub agents_dir: Option<PathBuf>,

    /// TOML settings file (default: $AGENTRY_CONFIG or ./agentry.toml).
    #[arg(long, global = true, value_name = "FILE")]
    pub settings: Option<PathBuf>,

    /// Enable debug logging.
    #[arg(long, short, global = true)]
    pub verbose: bool,

    #[command(subcommand)]
    pub command: Commands,
}

/// Which agent definition to use.
#[derive(Args, Debug, Clone)]
#[group(required = true, multiple = false)]
pub struct AgentSelector {
    /// Agent name, resolved in the agents directory.
    #[arg(long, short)]
    pub agent: Option<String>,

    /// Path of an agent definition file.
    #[arg(long, short, value_name = "FILE")]
    pub config: Option<PathBuf>,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Run an agent once and print its output.
    Run {
        #[command(flatten)]
        selector: AgentSelector,

        /// Template variable, repeatable.  Values are parsed as JSON when
        /// possible and used as plain strings otherwise.
        #[arg(long = "var", value_name = "KEY=VALUE", value_parser = parse_var)]
        vars: Vec<(String, Value)>,

        /// JSON file with prior messages (`[{"role": "user", "content": ...}]`).
        #[arg(long, value_name = "FILE")]
        history: Option<PathBuf>,

        /// The user message.  Omit to run on the loaded history alone.
        message: Option<String>,
    },

    /// Chat with an agent interactively.
    Chat {
        #[command(flatten)]
        selector: AgentSelector,
    },

    /// List the agents found in the agents directory.
    Agents,

    /// Search the web.
    Search {
        /// Search terms.
        #[arg(required = true, num_args = 1..)]
        query: Vec<String>,

        /// Maximum number of results.
        #[arg(long, short = 'n', default_value_t = 10)]
        max_results: u64,

        /// Print the raw JSON result.
        #[arg(long)]
        json: bool,
    },

    /// Fetch recent posts from X (Twitter).
    Tweets {
        /// Account handle whose timeline to read.
        #[arg(long, short, conflicts_with = "query", required_unless_present = "query")]
        user: Option<String>,

        /// Recent search query.
        #[arg(long, short)]
        query: Option<String>,

        /// Number of posts (10 to 100).
        #[arg(long, short = 'n', default_value_t = 10)]
        max_results: u64,

        /// Print the raw JSON result.
        #[arg(long)]
        json: bool,
    },
}
