//! Agent runtime.
//!
//! [`AgentRuntime`] executes one request/response cycle per [`run`] call and
//! owns the conversation history.  A run:
//!
//! 1. Appends the user message (if any) to history.
//! 2. Renders the system prompt template from the supplied variables, falling
//!    back to the definition's defaults.
//! 3. Sends the prompt and full history to the model client.
//! 4. Validates the answer against the compiled output schema, if any.
//! 5. Appends one agent message on success.
//!
//! Failures never escape `run`; they are reported through [`RunResult`].  The
//! user message stays in history when the provider call fails, so a retry
//! resumes from the same point.
//!
//! `run` takes `&mut self`: only one call can be in flight per runtime.
//! Share a runtime across tasks by wrapping it in a `tokio::sync::Mutex`.
//!
//! [`run`]: AgentRuntime::run

use std::collections::{BTreeMap, HashMap};
use std::sync::LazyLock;

use regex::{Captures, Regex};
use serde::Serialize;
use serde_json::Value;
use uuid::Uuid;

use crate::definition::AgentDefinition;
use crate::llm::client::ModelClient;
use crate::llm::types::{ChatRequest, Message, Role};
use crate::schema::Validator;

/// Template variables supplied to a run.
pub type Variables = HashMap<String, Value>;

/// Matches `{{ name }}` placeholders.
static PLACEHOLDER: LazyLock<Option<Regex>> = LazyLock::new(|| {
    match Regex::new(r"\{\{\s*([A-Za-z_][A-Za-z0-9_.-]*)\s*\}\}") {
        Ok(re) => Some(re),
        Err(e) => {
            tracing::error!(error = %e, "placeholder pattern failed to compile, templates render verbatim");
            None
        }
    }
});

// ---------------------------------------------------------------------------
// Run result
// ---------------------------------------------------------------------------

/// Outcome of a single [`AgentRuntime::run`] call.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RunResult {
    pub success: bool,

    /// Validated structured value, or the raw answer as a JSON string when
    /// the agent has no output schema.  `None` on failure.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub output: Option<Value>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl RunResult {
    fn ok(output: Value) -> Self {
        Self {
            success: true,
            output: Some(output),
            error: None,
        }
    }

    fn failed(error: impl Into<String>) -> Self {
        Self {
            success: false,
            output: None,
            error: Some(error.into()),
        }
    }

    /// The output as text: strings verbatim, other values as compact JSON.
    pub fn output_text(&self) -> Option<String> {
        self.output.as_ref().map(value_to_text)
    }
}

// ---------------------------------------------------------------------------
// Runtime
// ---------------------------------------------------------------------------

/// Executes runs against one model client and keeps the conversation history.
pub struct AgentRuntime {
    definition: AgentDefinition,
    client: Box<dyn ModelClient>,
    validator: Option<Validator>,
    history: Vec<Message>,
}

impl AgentRuntime {
    /// Create a runtime with an empty history.
    pub fn new(
        definition: AgentDefinition,
        client: Box<dyn ModelClient>,
        validator: Option<Validator>,
    ) -> Self {
        Self {
            definition,
            client,
            validator,
            history: Vec::new(),
        }
    }

    pub fn definition(&self) -> &AgentDefinition {
        &self.definition
    }

    pub fn validator(&self) -> Option<&Validator> {
        self.validator.as_ref()
    }

    /// Execute one request/response cycle.
    pub async fn run(
        &mut self,
        user_message: Option<&str>,
        variables: Option<&Variables>,
    ) -> RunResult {
        let run_id = Uuid::now_v7();

        if let Some(content) = user_message {
            self.history.push(Message::user(content));
        }

        let request = self.build_request(variables);

        tracing::info!(
            run_id = %run_id,
            agent = %self.definition.name,
            provider = %self.client.provider(),
            history_len = self.history.len(),
            "running agent"
        );

        let response = match self.client.chat_completion(&request).await {
            Ok(response) => response,
            Err(e) => {
                tracing::warn!(run_id = %run_id, error = %e, "model client call failed");
                return RunResult::failed(e.to_string());
            }
        };

        let output = match &self.validator {
            None => Value::String(response.content),
            Some(validator) => match parse_structured(validator, &response.content) {
                Ok(value) => value,
                Err(reason) => {
                    tracing::warn!(run_id = %run_id, error = %reason, "response rejected by output schema");
                    return RunResult::failed(reason);
                }
            },
        };

        self.history.push(Message::agent(value_to_text(&output)));
        tracing::debug!(run_id = %run_id, history_len = self.history.len(), "agent run completed");

        RunResult::ok(output)
    }

    /// Build the provider request for the current history.
    fn build_request(&self, variables: Option<&Variables>) -> ChatRequest {
        let system = render_template(
            &self.definition.system_prompt,
            &self.definition.dynamic_variables,
            variables,
        );

        ChatRequest {
            model: self.definition.model.clone(),
            system: Some(system).filter(|s| !s.is_empty()),
            messages: self.history.clone(),
            temperature: self.definition.temperature,
            max_tokens: self.definition.max_tokens,
            response_schema: self.validator.as_ref().map(Validator::to_json_schema),
        }
    }

    // -- History -------------------------------------------------------------

    /// Replace the whole history.
    pub fn load_chat_history(&mut self, messages: Vec<Message>) {
        self.history = messages;
    }

    /// Every recorded message, oldest first.
    pub fn full_chat_history(&self) -> &[Message] {
        &self.history
    }

    /// The most recent `limit` messages, oldest first.  `None` returns the
    /// full history.
    pub fn chat_history(&self, limit: Option<usize>) -> &[Message] {
        match limit {
            Some(n) => &self.history[self.history.len().saturating_sub(n)..],
            None => &self.history,
        }
    }

    /// The most recent agent message.
    pub fn last_agent_message(&self) -> Option<&Message> {
        self.history.iter().rev().find(|m| m.role == Role::Agent)
    }

    pub fn add_user_message(&mut self, content: impl Into<String>) {
        self.history.push(Message::user(content));
    }

    pub fn add_agent_message(&mut self, content: impl Into<String>) {
        self.history.push(Message::agent(content));
    }
}

impl std::fmt::Debug for AgentRuntime {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AgentRuntime")
            .field("agent", &self.definition.name)
            .field("provider", &self.client.provider())
            .field("structured", &self.validator.is_some())
            .field("history_len", &self.history.len())
            .finish()
    }
}

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

/// Substitute `{{name}}` placeholders.  Supplied variables win over defaults;
/// unknown placeholders are left untouched.
pub fn render_template(
    template: &str,
    defaults: &BTreeMap<String, Value>,
    variables: Option<&Variables>,
) -> String {
    let Some(placeholder) = PLACEHOLDER.as_ref() else {
        return template.to_owned();
    };
    placeholder
        .replace_all(template, |caps: &Captures<'_>| {
            let name = &caps[1];
            variables
                .and_then(|vars| vars.get(name))
                .or_else(|| defaults.get(name))
                .map(value_to_text)
                .unwrap_or_else(|| caps[0].to_owned())
        })
        .into_owned()
}

/// Parse a model answer as JSON and check it against `validator`.
///
/// A root that accepts any value also accepts an answer that is not JSON; it
/// is returned as a string.
fn parse_structured(validator: &Validator, content: &str) -> Result<Value, String> {
    let payload = strip_code_fence(content);
    let value: Value = match serde_json::from_str(payload) {
        Ok(value) => value,
        Err(_) if validator.kind_name() == "any" => return Ok(Value::String(content.to_owned())),
        Err(e) => return Err(format!("response is not valid JSON: {e}")),
    };
    validator
        .validate(&value)
        .map_err(|e| format!("response does not match output schema: {e}"))?;
    Ok(value)
}

/// Remove a surrounding Markdown code fence (```` ```json ... ``` ````).
fn strip_code_fence(content: &str) -> &str {
    let trimmed = content.trim();
    let Some(rest) = trimmed.strip_prefix("```") else {
        return trimmed;
    };
    let Some(body) = rest.strip_suffix("```") else {
        return trimmed;
    };
    // Drop the info string (`json`) on the opening line.
    if let Some(newline) = body.find('\n') {
        return body[newline + 1..].trim();
    }
    let body = body.trim();
    match body.split_once(char::is_whitespace) {
        Some((tag, rest)) if !tag.is_empty() && tag.chars().all(|c| c.is_ascii_alphabetic()) => {
            rest.trim()
        }
        _ => body,
    }
}

fn value_to_text(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use std::collections::VecDeque;
    use std::sync::{Arc, Mutex};

    use async_trait::async_trait;
    use serde_json::json;

    use super::*;
    use crate::error::{AgentError, Result};
    use crate::llm::provider::ProviderId;
    use crate::llm::types::ChatResponse;
    use crate::schema::compile_schema;

    /// Replays scripted answers and records the requests it receives.
    struct ScriptedClient {
        replies: Mutex<VecDeque<Result<ChatResponse>>>,
        requests: Arc<Mutex<Vec<ChatRequest>>>,
    }

    impl ScriptedClient {
        fn new(replies: Vec<Result<ChatResponse>>) -> (Self, Arc<Mutex<Vec<ChatRequest>>>) {
            let requests = Arc::new(Mutex::new(Vec::new()));
            let client = Self {
                replies: Mutex::new(replies.into()),
                requests: Arc::clone(&requests),
            };
            (client, requests)
        }
    }

    #[async_trait]
    impl ModelClient for ScriptedClient {
        fn provider(&self) -> ProviderId {
            ProviderId::OpenAi
        }

        fn default_model(&self) -> &str {
            "scripted"
        }

        async fn chat_completion(&self, request: &ChatRequest) -> Result<ChatResponse> {
            self.requests.lock().unwrap().push(request.clone());
            self.replies
                .lock()
                .unwrap()
                .pop_front()
                .unwrap_or_else(|| Ok(ChatResponse::text("")))
        }
    }

    fn definition() -> AgentDefinition {
        AgentDefinition {
            name: "summarizer".into(),
            description: String::new(),
            system_prompt: "Summarize for {{ audience }} in {{language}}.".into(),
            model: "gpt-4o-mini".into(),
            client: "openai".into(),
            dynamic_variables: BTreeMap::from([
                ("audience".to_owned(), json!("engineers")),
                ("language".to_owned(), json!("English")),
            ]),
            output_schema: None,
            temperature: Some(0.2),
            max_tokens: None,
        }
    }

    fn runtime(
        replies: Vec<Result<ChatResponse>>,
        validator: Option<Validator>,
    ) -> (AgentRuntime, Arc<Mutex<Vec<ChatRequest>>>) {
        let (client, requests) = ScriptedClient::new(replies);
        (
            AgentRuntime::new(definition(), Box::new(client), validator),
            requests,
        )
    }

    fn count_validator() -> Validator {
        compile_schema(Some(&json!({
            "type": "object",
            "properties": {"count": {"type": "number"}},
            "required": ["count"]
        })))
        .unwrap()
    }

    // -- Template rendering --------------------------------------------------

    #[test]
    fn template_uses_overrides_then_defaults() {
        let defaults = BTreeMap::from([
            ("audience".to_owned(), json!("engineers")),
            ("limit".to_owned(), json!(3)),
        ]);
        let vars = Variables::from([("audience".to_owned(), json!("managers"))]);

        let rendered = render_template(
            "For {{audience}}, max {{ limit }} points. {{unknown}}",
            &defaults,
            Some(&vars),
        );
        assert_eq!(rendered, "For managers, max 3 points. {{unknown}}");
    }

    #[test]
    fn strip_code_fence_variants() {
        assert_eq!(strip_code_fence("```json\n{\"a\":1}\n```"), "{\"a\":1}");
        assert_eq!(strip_code_fence("```\n[1]\n```"), "[1]");
        assert_eq!(strip_code_fence("  {\"a\":1}  "), "{\"a\":1}");
        assert_eq!(strip_code_fence("```unterminated"), "```unterminated");
        assert_eq!(strip_code_fence("```json {\"count\": 3}```"), "{\"count\": 3}");
        assert_eq!(strip_code_fence("```{\"count\": 3}```"), "{\"count\": 3}");
        assert_eq!(strip_code_fence("```true```"), "true");
    }

    // -- Runs ----------------------------------------------------------------

    #[tokio::test]
    async fn plain_run_records_user_and_agent_messages() {
        let (mut rt, requests) = runtime(vec![Ok(ChatResponse::text("A short summary."))], None);

        let result = rt.run(Some("Summarize: hello world"), None).await;

        assert!(result.success);
        assert_eq!(result.output, Some(json!("A short summary.")));
        assert!(result.error.is_none());

        let history = rt.full_chat_history();
        assert_eq!(history.len(), 2);
        assert_eq!(history[0], Message::user("Summarize: hello world"));
        assert_eq!(history[1], Message::agent("A short summary."));

        let sent = &requests.lock().unwrap()[0];
        assert_eq!(sent.model, "gpt-4o-mini");
        assert_eq!(sent.system.as_deref(), Some("Summarize for engineers in English."));
        assert_eq!(sent.messages, vec![Message::user("Summarize: hello world")]);
        assert_eq!(sent.temperature, Some(0.2));
        assert!(sent.response_schema.is_none());
    }

    #[tokio::test]
    async fn run_variables_override_defaults() {
        let (mut rt, requests) = runtime(vec![Ok(ChatResponse::text("ok"))], None);
        let vars = Variables::from([("language".to_owned(), json!("French"))]);

        rt.run(Some("hi"), Some(&vars)).await;

        let sent = &requests.lock().unwrap()[0];
        assert_eq!(sent.system.as_deref(), Some("Summarize for engineers in French."));
    }

    #[tokio::test]
    async fn run_without_message_sends_existing_history() {
        let (mut rt, requests) = runtime(vec![Ok(ChatResponse::text("continued"))], None);
        rt.add_user_message("first");

        let result = rt.run(None, None).await;

        assert!(result.success);
        assert_eq!(requests.lock().unwrap()[0].messages.len(), 1);
        assert_eq!(rt.full_chat_history().len(), 2);
    }

    #[tokio::test]
    async fn provider_failure_keeps_user_message() {
        let (mut rt, _) = runtime(
            vec![Err(AgentError::LlmRequestFailed {
                reason: "API returned 503".into(),
            })],
            None,
        );

        let result = rt.run(Some("hello"), None).await;

        assert!(!result.success);
        assert!(result.output.is_none());
        assert!(result.error.unwrap().contains("API returned 503"));
        assert_eq!(rt.full_chat_history(), &[Message::user("hello")]);
        assert!(rt.last_agent_message().is_none());
    }

    #[tokio::test]
    async fn structured_output_is_validated_and_projected_to_text() {
        let (mut rt, requests) = runtime(
            vec![Ok(ChatResponse::text("```json\n{\"count\": 3}\n```"))],
            Some(count_validator()),
        );

        let result = rt.run(Some("count the words"), None).await;

        assert!(result.success, "error: {:?}", result.error);
        assert_eq!(result.output, Some(json!({"count": 3})));
        assert_eq!(rt.last_agent_message().unwrap().content, r#"{"count":3}"#);

        let sent = &requests.lock().unwrap()[0];
        assert_eq!(sent.response_schema.as_ref().unwrap()["required"], json!(["count"]));
    }

    #[tokio::test]
    async fn structured_output_missing_required_field_fails() {
        let (mut rt, _) = runtime(
            vec![Ok(ChatResponse::text(r#"{"total": 3}"#))],
            Some(count_validator()),
        );

        let result = rt.run(Some("count"), None).await;

        assert!(!result.success);
        assert!(result.output.is_none());
        let error = result.error.unwrap();
        assert!(error.contains("$.count"), "error was {error}");
        assert_eq!(rt.full_chat_history().len(), 1);
    }

    #[tokio::test]
    async fn structured_output_rejects_non_json() {
        let (mut rt, _) = runtime(
            vec![Ok(ChatResponse::text("three"))],
            Some(count_validator()),
        );

        let result = rt.run(Some("count"), None).await;
        assert!(!result.success);
        assert!(result.error.unwrap().contains("not valid JSON"));
    }

    #[tokio::test]
    async fn permissive_schema_accepts_plain_text() {
        for schema in [json!({"type": "text"}), json!({"description": "anything"})] {
            let validator = compile_schema(Some(&schema)).unwrap();
            let (mut rt, _) = runtime(vec![Ok(ChatResponse::text("hello there"))], Some(validator));

            let result = rt.run(Some("greet me"), None).await;

            assert!(result.success, "schema {schema}: {:?}", result.error);
            assert_eq!(result.output, Some(json!("hello there")));
            assert_eq!(rt.last_agent_message().unwrap().content, "hello there");
        }
    }

    #[tokio::test]
    async fn permissive_schema_still_parses_json_answers() {
        let validator = compile_schema(Some(&json!({"description": "anything"}))).unwrap();
        let (mut rt, _) = runtime(vec![Ok(ChatResponse::text("[1, 2]"))], Some(validator));

        let result = rt.run(Some("list"), None).await;
        assert_eq!(result.output, Some(json!([1, 2])));
    }

    #[tokio::test]
    async fn single_line_fence_with_language_tag_is_parsed() {
        let (mut rt, _) = runtime(
            vec![Ok(ChatResponse::text(r#"```json {"count": 3}```"#))],
            Some(count_validator()),
        );

        let result = rt.run(Some("count"), None).await;
        assert!(result.success, "error: {:?}", result.error);
        assert_eq!(result.output, Some(json!({"count": 3})));
    }

    #[tokio::test]
    async fn sequential_runs_grow_history_in_order() {
        let (mut rt, requests) = runtime(
            vec![Ok(ChatResponse::text("one")), Ok(ChatResponse::text("two"))],
            None,
        );

        rt.run(Some("first"), None).await;
        rt.run(Some("second"), None).await;

        let contents: Vec<&str> = rt
            .full_chat_history()
            .iter()
            .map(|m| m.content.as_str())
            .collect();
        assert_eq!(contents, ["first", "one", "second", "two"]);
        assert_eq!(requests.lock().unwrap()[1].messages.len(), 3);
    }

    // -- History accessors ---------------------------------------------------

    #[test]
    fn chat_history_returns_tail_in_order() {
        let (mut rt, _) = runtime(vec![], None);
        for i in 0..5 {
            rt.add_user_message(format!("m{i}"));
        }

        let tail = rt.chat_history(Some(2));
        assert_eq!(tail, &[Message::user("m3"), Message::user("m4")]);
        assert_eq!(rt.chat_history(Some(10)).len(), 5);
        assert_eq!(rt.chat_history(None).len(), 5);
        assert!(rt.chat_history(Some(0)).is_empty());
    }

    #[test]
    fn load_chat_history_replaces_everything() {
        let (mut rt, _) = runtime(vec![], None);
        rt.add_user_message("old");
        rt.add_agent_message("old answer");

        let loaded = vec![Message::user("resumed"), Message::agent("welcome back")];
        rt.load_chat_history(loaded.clone());

        assert_eq!(rt.full_chat_history(), loaded.as_slice());
        assert_eq!(rt.last_agent_message().unwrap().content, "welcome back");
    }

    #[test]
    fn last_agent_message_skips_trailing_user_messages() {
        let (mut rt, _) = runtime(vec![], None);
        rt.add_agent_message("answer");
        rt.add_user_message("follow-up");
        assert_eq!(rt.last_agent_message().unwrap().content, "answer");
    }
}
