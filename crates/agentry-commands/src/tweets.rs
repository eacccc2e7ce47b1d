//! `fetch_tweets` command -- recent posts from the X (Twitter) API v2.
//!
//! Two modes, selected by the parameters:
//!
//! - `username`: resolve the account id, then read its timeline.
//! - `query`: run a recent search.
//!
//! Requests authenticate with an app-only bearer token
//! (`TWITTER_BEARER_TOKEN`).

use async_trait::async_trait;
use chrono::{DateTime, SecondsFormat, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Value, json};
use tracing::{debug, warn};

use agentry_agent::CredentialSource;

use crate::error::{CommandError, Result};
use crate::traits::Command;

const COMMAND: &str = "fetch_tweets";

/// Credential holding the app-only bearer token.
pub const TWITTER_BEARER_TOKEN: &str = "TWITTER_BEARER_TOKEN";

const DEFAULT_BASE_URL: &str = "https://api.twitter.com/2";

/// Page size bounds enforced by the API.
const MIN_RESULTS: u64 = 10;
const MAX_RESULTS: u64 = 100;

const TWEET_FIELDS: &str = "created_at,author_id";

// ---------------------------------------------------------------------------
// Types
// ---------------------------------------------------------------------------

/// A single post.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Tweet {
    pub id: String,
    pub text: String,
    #[serde(default)]
    pub author_id: Option<String>,
    /// RFC 3339 timestamp, normalised to UTC.
    #[serde(default)]
    pub created_at: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum TweetSource {
    User(String),
    Search(String),
}

#[derive(Debug, Clone, PartialEq, Eq)]
struct FetchParams {
    source: TweetSource,
    max_results: u64,
}

impl FetchParams {
    fn from_value(params: &Value) -> Result<Self> {
        let text = |key: &str| -> Result<Option<String>> {
            match params.get(key) {
                None | Some(Value::Null) => Ok(None),
                Some(Value::String(s)) if s.trim().is_empty() => Ok(None),
                Some(Value::String(s)) => Ok(Some(s.trim().to_owned())),
                Some(_) => Err(CommandError::invalid(COMMAND, format!("`{key}` must be a string"))),
            }
        };

        let source = match (text("username")?, text("query")?) {
            (Some(username), None) => TweetSource::User(normalize_username(&username)?),
            (None, Some(query)) => TweetSource::Search(query),
            (None, None) => {
                return Err(CommandError::invalid(
                    COMMAND,
                    "one of `username` or `query` is required",
                ));
            }
            (Some(_), Some(_)) => {
                return Err(CommandError::invalid(
                    COMMAND,
                    "`username` and `query` are mutually exclusive",
                ));
            }
        };

        let max_results = match params.get("max_results") {
            None | Some(Value::Null) => MIN_RESULTS,
            Some(v) => v
                .as_u64()
                .ok_or_else(|| {
                    CommandError::invalid(COMMAND, "`max_results` must be a positive integer")
                })?
                .clamp(MIN_RESULTS, MAX_RESULTS),
        };

        Ok(Self {
            source,
            max_results,
        })
    }
}

/// Strip a leading `@` and check the handle is 1-15 word characters.
fn normalize_username(raw: &str) -> Result<String> {
    let name = raw.strip_prefix('@').unwrap_or(raw);
    let valid = (1..=15).contains(&name.len())
        && name.chars().all(|c| c.is_ascii_alphanumeric() || c == '_');
    if valid {
        Ok(name.to_owned())
    } else {
        Err(CommandError::invalid(COMMAND, format!("invalid username `{raw}`")))
    }
}

// ---------------------------------------------------------------------------
// Command
// ---------------------------------------------------------------------------

/// Tweet fetch command.
pub struct TweetFetchCommand {
    client: reqwest::Client,
    bearer_token: Option<String>,
    base_url: String,
}

impl TweetFetchCommand {
    pub fn new(bearer_token: Option<String>) -> Self {
        let client = reqwest::Client::builder()
            .user_agent(concat!("agentry/", env!("CARGO_PKG_VERSION")))
            .timeout(crate::REQUEST_TIMEOUT)
            .build()
            .unwrap_or_default();

        Self {
            client,
            bearer_token: bearer_token.filter(|t| !t.is_empty()),
            base_url: DEFAULT_BASE_URL.to_owned(),
        }
    }

    /// Create the command, reading the bearer token from `credentials`.
    pub fn from_credentials(credentials: &dyn CredentialSource) -> Self {
        Self::new(credentials.get(TWITTER_BEARER_TOKEN))
    }

    /// Point the command at another API root (proxies, test servers).
    pub fn with_base_url(mut self, base_url: &str) -> Self {
        self.base_url = base_url.trim_end_matches('/').to_owned();
        self
    }

    fn token(&self) -> Result<&str> {
        self.bearer_token
            .as_deref()
            .ok_or_else(|| CommandError::MissingCredential {
                command: COMMAND.to_owned(),
                key: TWITTER_BEARER_TOKEN.to_owned(),
            })
    }

    async fn get_json(&self, path: &str, query: &[(&str, &str)], token: &str) -> Result<Value> {
        let url = format!("{}{path}", self.base_url);
        let response = self
            .client
            .get(&url)
            .bearer_auth(token)
            .query(query)
            .send()
            .await
            .map_err(|e| CommandError::from_transport(COMMAND, "X API", e))?;

        let status = response.status();
        let body = response.text().await.map_err(|e| {
            CommandError::failed(COMMAND, format!("failed to read response body: {e}"))
        })?;

        if !status.is_success() {
            let detail = serde_json::from_str::<Value>(&body)
                .ok()
                .and_then(|v| api_error_message(&v))
                .unwrap_or(body);
            return Err(CommandError::failed(
                COMMAND,
                format!("X API returned {}: {detail}", status.as_u16()),
            ));
        }

        serde_json::from_str(&body).map_err(|e| {
            CommandError::failed(COMMAND, format!("failed to parse X API response: {e}"))
        })
    }

    async fn user_id(&self, username: &str, token: &str) -> Result<String> {
        let body = self
            .get_json(&format!("/users/by/username/{username}"), &[], token)
            .await?;
        parse_user_id(&body)
    }

    async fn fetch(&self, params: &FetchParams, token: &str) -> Result<Vec<Tweet>> {
        let max_results = params.max_results.to_string();
        let page = [
            ("max_results", max_results.as_str()),
            ("tweet.fields", TWEET_FIELDS),
        ];

        let body = match &params.source {
            TweetSource::User(username) => {
                let id = self.user_id(username, token).await?;
                debug!(username = %username, user_id = %id, "resolved user id");
                self.get_json(&format!("/users/{id}/tweets"), &page, token)
                    .await?
            }
            TweetSource::Search(query) => {
                let mut search = page.to_vec();
                search.push(("query", query.as_str()));
                self.get_json("/tweets/search/recent", &search, token)
                    .await?
            }
        };

        parse_tweets(&body)
    }
}

#[async_trait]
impl Command for TweetFetchCommand {
    fn name(&self) -> &str {
        COMMAND
    }

    fn description(&self) -> &str {
        "Fetch recent posts from X (Twitter), either from one account's \
         timeline or from a recent search query."
    }

    fn parameters(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "username": {
                    "type": "string",
                    "description": "Account handle, with or without a leading @"
                },
                "query": {
                    "type": "string",
                    "description": "Recent search query (X search syntax)"
                },
                "max_results": {
                    "type": "integer",
                    "description": "Number of posts, clamped to 10..=100 (default 10)"
                }
            }
        })
    }

    fn required_credential(&self) -> Option<&str> {
        Some(TWITTER_BEARER_TOKEN)
    }

    async fn execute(&self, params: Value) -> Result<Value> {
        let params = FetchParams::from_value(&params)?;
        let token = self.token()?;

        debug!(source = ?params.source, max_results = params.max_results, "fetching tweets");
        let tweets = self.fetch(&params, token).await?;
        debug!(count = tweets.len(), "tweets fetched");

        Ok(json!({ "tweets": tweets }))
    }
}

// ---------------------------------------------------------------------------
// Response parsing
// ---------------------------------------------------------------------------

/// First human-readable message in an API error payload.
fn api_error_message(body: &Value) -> Option<String> {
    body.pointer("/errors/0/detail")
        .or_else(|| body.pointer("/errors/0/message"))
        .or_else(|| body.get("detail"))
        .or_else(|| body.get("title"))
        .and_then(Value::as_str)
        .map(str::to_owned)
}

fn parse_user_id(body: &Value) -> Result<String> {
    if let Some(id) = body.pointer("/data/id").and_then(Value::as_str) {
        return Ok(id.to_owned());
    }
    let reason = api_error_message(body).unwrap_or_else(|| "user not found".to_owned());
    Err(CommandError::failed(COMMAND, reason))
}

fn parse_tweets(body: &Value) -> Result<Vec<Tweet>> {
    let Some(data) = body.get("data") else {
        // An empty page has no `data`; only errors without data are fatal.
        return match api_error_message(body) {
            Some(reason) => Err(CommandError::failed(COMMAND, reason)),
            None => Ok(Vec::new()),
        };
    };

    let mut tweets: Vec<Tweet> = serde_json::from_value(data.clone())?;
    for tweet in &mut tweets {
        if let Some(raw) = tweet.created_at.take() {
            tweet.created_at = Some(normalize_timestamp(&raw));
        }
    }
    Ok(tweets)
}

/// Re-render an RFC 3339 timestamp in UTC with millisecond precision.
/// Unparseable values are passed through.
fn normalize_timestamp(raw: &str) -> String {
    match DateTime::parse_from_rfc3339(raw) {
        Ok(ts) => ts
            .with_timezone(&Utc)
            .to_rfc3339_opts(SecondsFormat::Millis, true),
        Err(e) => {
            warn!(value = raw, error = %e, "unparseable tweet timestamp");
            raw.to_owned()
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
