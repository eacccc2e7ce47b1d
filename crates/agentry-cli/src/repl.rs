//! Subcommand: `agentry chat` -- interactive conversation with one agent.
//!
//! Lines are sent to the agent as user messages.  A few slash commands
//! operate on the history instead:
//!
//! - `/history [N]` -- show the last N messages (all when omitted)
//! - `/reset` -- clear the history
//! - `quit` / `exit` -- leave

use std::io::{self, Write as _};

use anyhow::Result;
use tracing::info;

use agentry_agent::Agent;

use crate::helpers::{format_history, format_output};

/// A parsed input line.
#[derive(Debug, PartialEq, Eq)]
enum Input<'a> {
    Empty,
    Quit,
    History(Option<usize>),
    Reset,
    Unknown(&'a str),
    Message(&'a str),
}

fn parse_input(line: &str) -> Input<'_> {
    let trimmed = line.trim();
    if trimmed.is_empty() {
        return Input::Empty;
    }
    if trimmed == "quit" || trimmed == "exit" {
        return Input::Quit;
    }
    let Some(command) = trimmed.strip_prefix('/') else {
        return Input::Message(trimmed);
    };

    let mut parts = command.split_whitespace();
    match (parts.next(), parts.next()) {
        (Some("history"), None) => Input::History(None),
        (Some("history"), Some(n)) => match n.parse() {
            Ok(n) => Input::History(Some(n)),
            Err(_) => Input::Unknown(trimmed),
        },
        (Some("reset"), None) => Input::Reset,
        _ => Input::Unknown(trimmed),
    }
}

/// Run the interactive loop until EOF or `quit`.
pub async fn cmd_chat(mut agent: Agent) -> Result<()> {
    let definition = agent.definition();
    println!();
    println!("  agentry v{}", env!("CARGO_PKG_VERSION"));
    println!("  Agent: {} ({} / {})", definition.name, definition.client, definition.model);
    if !definition.description.is_empty() {
        println!("  {}", definition.description);
    }
    println!("  Commands: /history [N], /reset, quit");
    println!();

    let stdin = io::stdin();
    let mut line_buf = String::new();

    loop {
        print!("> ");
        io::stdout().flush().ok();

        line_buf.clear();
        match stdin.read_line(&mut line_buf) {
            Ok(0) => {
                println!();
                info!("EOF received, exiting");
                break;
            }
            Ok(_) => {}
            Err(e) => {
                eprintln!("  Error reading input: {e}");
                continue;
            }
        }

        match parse_input(&line_buf) {
            Input::Empty => {}
            Input::Quit => {
                info!("user requested exit");
                break;
            }
            Input::History(limit) => {
                let messages = agent.chat_history(limit);
                if messages.is_empty() {
                    println!("  (no messages)");
                } else {
                    println!("{}", format_history(messages));
                }
            }
            Input::Reset => {
                agent.load_chat_history(Vec::new());
                println!("  History cleared.");
            }
            Input::Unknown(command) => {
                println!("  Unknown command `{command}`. Try /history [N], /reset or quit.");
            }
            Input::Message(text) => {
                let result = agent.run(Some(text), None).await;
                if result.success {
                    println!("{}", format_output(&result));
                } else {
                    eprintln!("  Error: {}", result.error.unwrap_or_default());
                }
                println!();
            }
        }
    }

    Ok(())
}
