//! `web_search` command -- web search with automatic engine fallback.
//!
//! Engine priority:
//!   1. Brave Search API (when `BRAVE_API_KEY` is configured)
//!   2. DuckDuckGo HTML results page (no key needed)
//!
//! Both engines produce the same [`SearchHit`] records.

use async_trait::async_trait;
use serde::Serialize;
use serde_json::{Value, json};
use tracing::{debug, warn};

use agentry_agent::CredentialSource;

use crate::error::{CommandError, Result};
use crate::traits::Command;

// ═══════════════════════════════════════════════════════════════════════
//  Constants
// ═══════════════════════════════════════════════════════════════════════

const COMMAND: &str = "web_search";

/// Credential enabling the Brave backend.
pub const BRAVE_API_KEY: &str = "BRAVE_API_KEY";

const DEFAULT_MAX_RESULTS: usize = 10;

/// Upper bound accepted by the Brave API for a single page.
const MAX_RESULTS_CAP: usize = 20;

const BRAVE_SEARCH_URL: &str = "https://api.search.brave.com/res/v1/web/search";

const DUCKDUCKGO_HTML_URL: &str = "https://html.duckduckgo.com/html/";

/// Browser-like User-Agent; DuckDuckGo rejects obvious bots.
const BROWSER_USER_AGENT: &str = "Mozilla/5.0 (X11; Linux x86_64) \
     AppleWebKit/537.36 (KHTML, like Gecko) Chrome/131.0.0.0 Safari/537.36";

// ═══════════════════════════════════════════════════════════════════════
//  Types
// ═══════════════════════════════════════════════════════════════════════

/// One search result.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SearchHit {
    pub title: String,
    pub url: String,
    pub snippet: String,
}

/// Backend that produced a result set.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum SearchEngine {
    Brave,
    DuckDuckGo,
}

#[derive(Debug)]
struct SearchParams {
    query: String,
    max_results: usize,
}

impl SearchParams {
    fn from_value(params: &Value) -> Result<Self> {
        let query = params
            .get("query")
            .and_then(Value::as_str)
            .map(str::trim)
            .filter(|q| !q.is_empty())
            .ok_or_else(|| CommandError::invalid(COMMAND, "missing required string field `query`"))?;

        let max_results = match params.get("max_results") {
            None | Some(Value::Null) => DEFAULT_MAX_RESULTS,
            Some(v) => match v.as_u64() {
                Some(0) | None => {
                    return Err(CommandError::invalid(
                        COMMAND,
                        "`max_results` must be a positive integer",
                    ));
                }
                Some(n) => usize::try_from(n).unwrap_or(MAX_RESULTS_CAP).min(MAX_RESULTS_CAP),
            },
        };

        Ok(Self {
            query: query.to_owned(),
            max_results,
        })
    }
}

// ═══════════════════════════════════════════════════════════════════════
//  Command
// ═══════════════════════════════════════════════════════════════════════

/// Web search command.
pub struct WebSearchCommand {
    client: reqwest::Client,
    brave_api_key: Option<String>,
}

impl WebSearchCommand {
    /// Create the command.  `brave_api_key` enables the Brave backend.
    pub fn new(brave_api_key: Option<String>) -> Self {
        let client = reqwest::Client::builder()
            .user_agent(BROWSER_USER_AGENT)
            .timeout(crate::REQUEST_TIMEOUT)
            .build()
            .unwrap_or_default();

        Self {
            client,
            brave_api_key: brave_api_key.filter(|k| !k.is_empty()),
        }
    }

    /// Create the command, reading the Brave key from `credentials`.
    pub fn from_credentials(credentials: &dyn CredentialSource) -> Self {
        Self::new(credentials.get(BRAVE_API_KEY))
    }

    /// Backends that will be tried, in order.
    pub fn engines(&self) -> Vec<SearchEngine> {
        let mut engines = Vec::with_capacity(2);
        if self.brave_api_key.is_some() {
            engines.push(SearchEngine::Brave);
        }
        engines.push(SearchEngine::DuckDuckGo);
        engines
    }

    async fn search(&self, params: &SearchParams) -> Result<(SearchEngine, Vec<SearchHit>)> {
        if let Some(api_key) = &self.brave_api_key {
            match self.search_brave(params, api_key).await {
                Ok(hits) if !hits.is_empty() => return Ok((SearchEngine::Brave, hits)),
                Ok(_) => debug!("Brave returned no results, falling back to DuckDuckGo"),
                Err(e) => warn!(error = %e, "Brave Search failed, falling back to DuckDuckGo"),
            }
        }

        let hits = self.search_duckduckgo(params).await?;
        Ok((SearchEngine::DuckDuckGo, hits))
    }

    // ───────────────────────────────────────────────────────────────────
    //  Brave Search API
    // ───────────────────────────────────────────────────────────────────

    async fn search_brave(&self, params: &SearchParams, api_key: &str) -> Result<Vec<SearchHit>> {
        let count = params.max_results.to_string();
        let response = self
            .client
            .get(BRAVE_SEARCH_URL)
            .header("X-Subscription-Token", api_key)
            .header("Accept", "application/json")
            .query(&[("q", params.query.as_str()), ("count", count.as_str())])
            .send()
            .await
            .map_err(|e| CommandError::from_transport(COMMAND, "Brave Search", e))?;

        let status = response.status();
        if !status.is_success() {
            return Err(CommandError::failed(
                COMMAND,
                format!("Brave Search returned status {status}"),
            ));
        }

        let body: Value = response.json().await.map_err(|e| {
            CommandError::failed(COMMAND, format!("failed to parse Brave response: {e}"))
        })?;

        Ok(parse_brave_results(&body, params.max_results))
    }

    // ───────────────────────────────────────────────────────────────────
    //  DuckDuckGo HTML
    // ───────────────────────────────────────────────────────────────────

    async fn search_duckduckgo(&self, params: &SearchParams) -> Result<Vec<SearchHit>> {
        let response = self
            .client
            .post(DUCKDUCKGO_HTML_URL)
            .form(&[("q", params.query.as_str()), ("kl", ""), ("df", "")])
            .send()
            .await
            .map_err(|e| CommandError::from_transport(COMMAND, "DuckDuckGo", e))?;

        let status = response.status();
        if !status.is_success() {
            return Err(CommandError::failed(
                COMMAND,
                format!("DuckDuckGo returned status {status}"),
            ));
        }

        let html = response.text().await.map_err(|e| {
            CommandError::failed(COMMAND, format!("failed to read DuckDuckGo response: {e}"))
        })?;

        Ok(parse_duckduckgo_results(&html, params.max_results))
    }
}

#[async_trait]
impl Command for WebSearchCommand {
    fn name(&self) -> &str {
        COMMAND
    }

    fn description(&self) -> &str {
        "Search the web and return titles, URLs and snippets. Uses Brave Search \
         when BRAVE_API_KEY is set, otherwise DuckDuckGo."
    }

    fn parameters(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "query": {
                    "type": "string",
                    "description": "The search query"
                },
                "max_results": {
                    "type": "integer",
                    "description": "Maximum number of results (default 10, at most 20)"
                }
            },
            "required": ["query"]
        })
    }

    async fn execute(&self, params: Value) -> Result<Value> {
        let params = SearchParams::from_value(&params)?;
        debug!(query = %params.query, max_results = params.max_results, "performing web search");

        let (engine, results) = self.search(&params).await?;
        debug!(count = results.len(), engine = ?engine, "search completed");

        Ok(json!({ "engine": engine, "results": results }))
    }
}

// ═══════════════════════════════════════════════════════════════════════
//  Result parsing
// ═══════════════════════════════════════════════════════════════════════

fn parse_brave_results(body: &Value, max_results: usize) -> Vec<SearchHit> {
    let Some(items) = body.pointer("/web/results").and_then(Value::as_array) else {
        return Vec::new();
    };

    items
        .iter()
        .filter_map(|item| {
            let field = |key: &str| item.get(key).and_then(Value::as_str).unwrap_or_default();
            let (title, url) = (field("title"), field("url"));
            if title.is_empty() && url.is_empty() {
                return None;
            }
            Some(SearchHit {
                title: strip_html_tags(title),
                url: url.to_owned(),
                snippet: strip_html_tags(field("description")),
            })
        })
        .take(max_results)
        .collect()
}

const DDG_TITLE_MARKER: &str = "class=\"result__a\"";
const DDG_SNIPPET_MARKER: &str = "class=\"result__snippet\"";

/// Extract results from the DuckDuckGo HTML page.
///
/// Each result starts at a `result__a` anchor; its snippet is the first
/// `result__snippet` element before the next anchor.
fn parse_duckduckgo_results(html: &str, max_results: usize) -> Vec<SearchHit> {
    let anchors: Vec<usize> = html.match_indices(DDG_TITLE_MARKER).map(|(i, _)| i).collect();
    let mut hits = Vec::new();

    for (n, &start) in anchors.iter().enumerate() {
        if hits.len() >= max_results {
            break;
        }

        let end = anchors.get(n + 1).copied().unwrap_or(html.len());
        let block = &html[start + DDG_TITLE_MARKER.len()..end];

        let url = href_before(&html[..start]).map(clean_ddg_url).unwrap_or_default();
        let title = strip_html_tags(element_text(block, "</a>")).trim().to_owned();
        let snippet = block
            .find(DDG_SNIPPET_MARKER)
            .map(|i| strip_html_tags(element_text(&block[i + DDG_SNIPPET_MARKER.len()..], "</")))
            .unwrap_or_default()
            .trim()
            .to_owned();

        if !title.is_empty() || !url.is_empty() {
            hits.push(SearchHit {
                title,
                url,
                snippet,
            });
        }
    }

    hits
}

/// Resolve DuckDuckGo redirect links (`/l/?uddg=...`) to their target.
fn clean_ddg_url(url: &str) -> String {
    if url.contains("duckduckgo.com/l/")
        && let Some((_, rest)) = url.split_once("uddg=")
    {
        return percent_decode(rest.split('&').next().unwrap_or(rest));
    }
    match url.strip_prefix("//") {
        Some(rest) => format!("https://{rest}"),
        None => url.to_owned(),
    }
}

/// Decode `%XX` escapes and `+` as space.  Invalid escapes are kept as-is.
fn percent_decode(input: &str) -> String {
    let bytes = input.as_bytes();
    let mut out = Vec::with_capacity(bytes.len());
    let mut i = 0;
    while i < bytes.len() {
        match bytes[i] {
            b'%' => {
                let decoded = input
                    .get(i + 1..i + 3)
                    .and_then(|hex| u8::from_str_radix(hex, 16).ok());
                match decoded {
                    Some(byte) => {
                        out.push(byte);
                        i += 3;
                        continue;
                    }
                    None => out.push(b'%'),
                }
            }
            b'+' => out.push(b' '),
            b => out.push(b),
        }
        i += 1;
    }
    String::from_utf8_lossy(&out).into_owned()
}

/// The value of the last `href="..."` attribute in `html`.
fn href_before(html: &str) -> Option<&str> {
    const HREF: &str = "href=\"";
    let start = html.rfind(HREF)? + HREF.len();
    let rest = &html[start..];
    rest.find('"').map(|end| &rest[..end])
}

/// Text between the end of the current opening tag and `terminator`.
fn element_text<'a>(after_marker: &'a str, terminator: &str) -> &'a str {
    let Some(open_end) = after_marker.find('>') else {
        return "";
    };
    let content = &after_marker[open_end + 1..];
    content.find(terminator).map_or(content, |end| &content[..end])
}

/// Strip HTML tags and decode the common entities.
pub fn strip_html_tags(input: &str) -> String {
    let mut text = String::with_capacity(input.len());
    let mut in_tag = false;
    for ch in input.chars() {
        match ch {
            '<' => in_tag = true,
            '>' => in_tag = false,
            _ if !in_tag => text.push(ch),
            _ => {}
        }
    }

    [
        ("&lt;", "<"),
        ("&gt;", ">"),
        ("&quot;", "\""),
        ("&#39;", "'"),
        ("&#x27;", "'"),
        ("&apos;", "'"),
        ("&nbsp;", " "),
        ("&amp;", "&"),
    ]
    .iter()
    .fold(text, |acc, (entity, replacement)| acc.replace(entity, replacement))
}

// ═══════════════════════════════════════════════════════════════════════
//  Tests
// ═══════════════════════════════════════════════════════════════════════
