//! Model client capability and its HTTP implementation.
//!
//! [`ModelClient`] is the only thing the agent runtime knows about a provider:
//! send a [`ChatRequest`], get a [`ChatResponse`] back or an error.
//! [`HttpModelClient`] implements it for the **OpenAI Chat Completions API**
//! (OpenAI and Fireworks) and the **Anthropic Messages API**, non-streaming.

use async_trait::async_trait;
use reqwest::header::{AUTHORIZATION, CONTENT_TYPE, HeaderMap, HeaderValue};
use serde_json::{Value, json};

use crate::error::{AgentError, Result};
use crate::llm::provider::{ClientSettings, ProviderId, WireDialect};
use crate::llm::types::{ChatRequest, ChatResponse, Message, Role};

// ---------------------------------------------------------------------------
// Constants
// ---------------------------------------------------------------------------

/// Anthropic API version header value.
const ANTHROPIC_VERSION: &str = "2023-06-01";

/// Name given to the structured output format in OpenAI requests.
const RESPONSE_FORMAT_NAME: &str = "agent_output";

// ---------------------------------------------------------------------------
// Capability
// ---------------------------------------------------------------------------

/// A provider capable of answering chat requests.
///
/// Implementations own their credentials and default parameters.  They do not
/// retry; a failed call is reported once to the caller.
#[async_trait]
pub trait ModelClient: Send + Sync {
    /// The provider this client talks to.
    fn provider(&self) -> ProviderId;

    /// Model used when a request leaves `model` empty.
    fn default_model(&self) -> &str;

    /// Send one chat request and wait for the complete answer.
    async fn chat_completion(&self, request: &ChatRequest) -> Result<ChatResponse>;
}

// ---------------------------------------------------------------------------
// HTTP client
// ---------------------------------------------------------------------------

/// A [`ModelClient`] backed by the provider's public HTTP API.
#[derive(Debug, Clone)]
pub struct HttpModelClient {
    settings: ClientSettings,
    http: reqwest::Client,
}

impl HttpModelClient {
    /// Create a new client.  Fails when the API key is empty.
    pub fn new(settings: ClientSettings) -> Result<Self> {
        if settings.api_key.trim().is_empty() {
            return Err(AgentError::MissingCredential {
                key: settings.provider.credential_key().to_owned(),
            });
        }

        let http = reqwest::Client::builder()
            .timeout(settings.timeout)
            .build()
            .map_err(|e| AgentError::LlmRequestFailed {
                reason: format!("failed to build HTTP client: {e}"),
            })?;

        Ok(Self { settings, http })
    }

    /// The settings this client was built with.
    pub fn settings(&self) -> &ClientSettings {
        &self.settings
    }

    fn model_for<'a>(&'a self, request: &'a ChatRequest) -> &'a str {
        if request.model.is_empty() {
            &self.settings.model
        } else {
            &request.model
        }
    }

    // =======================================================================
    // OpenAI-compatible implementation
    // =======================================================================

    async fn chat_openai(&self, request: &ChatRequest) -> Result<ChatResponse> {
        let body = self.build_openai_request_body(request);
        let url = format!("{}/chat/completions", self.settings.base_url);

        let mut headers = HeaderMap::new();
        let auth_value = format!("Bearer {}", self.settings.api_key);
        headers.insert(
            AUTHORIZATION,
            HeaderValue::from_str(&auth_value).map_err(|e| AgentError::LlmRequestFailed {
                reason: format!("invalid authorization header: {e}"),
            })?,
        );
        headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));

        tracing::debug!(url = %url, model = %body["model"], provider = %self.settings.provider, "sending LLM request");

        let v = self.send(&url, headers, &body).await?;
        parse_openai_response(&v)
    }

    /// Build the JSON body for the Chat Completions API.
    ///
    /// OpenAI receives object schemas as a `json_schema` response format and
    /// Fireworks as a `json_object` format with an attached schema.  Anything
    /// else falls back to an instruction in the system prompt.
    fn build_openai_request_body(&self, request: &ChatRequest) -> Value {
        let mut system = request.system.clone();
        let mut response_format = None;

        if let Some(schema) = &request.response_schema {
            match self.settings.provider {
                ProviderId::Fireworks => {
                    response_format = Some(json!({ "type": "json_object", "schema": schema }));
                }
                _ if schema["type"] == "object" => {
                    response_format = Some(json!({
                        "type": "json_schema",
                        "json_schema": {
                            "name": RESPONSE_FORMAT_NAME,
                            "schema": schema,
                            "strict": false,
                        }
                    }));
                }
                _ => system = Some(append_json_instruction(system.as_deref(), schema)),
            }
        }

        let mut body = json!({
            "model": self.model_for(request),
            "max_tokens": request.max_tokens.unwrap_or(self.settings.max_tokens),
            "messages": messages_to_openai(system.as_deref(), &request.messages),
        });

        if let Some(temp) = request.temperature {
            body["temperature"] = json!(temp);
        }

        if let Some(format) = response_format {
            body["response_format"] = format;
        }

        body
    }

    // =======================================================================
    // Anthropic implementation
    // =======================================================================

    async fn chat_anthropic(&self, request: &ChatRequest) -> Result<ChatResponse> {
        let body = self.build_anthropic_request_body(request);
        let url = format!("{}/v1/messages", self.settings.base_url);

        let mut headers = HeaderMap::new();
        headers.insert(
            "x-api-key",
            HeaderValue::from_str(&self.settings.api_key).map_err(|e| {
                AgentError::LlmRequestFailed {
                    reason: format!("invalid API key header: {e}"),
                }
            })?,
        );
        headers.insert(
            "anthropic-version",
            HeaderValue::from_static(ANTHROPIC_VERSION),
        );
        headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));

        tracing::debug!(url = %url, model = %body["model"], provider = "anthropic", "sending LLM request");

        let v = self.send(&url, headers, &body).await?;
        parse_anthropic_response(&v)
    }

    /// Build the JSON body for the Anthropic Messages API.
    ///
    /// The system prompt is a top-level field; a response schema is conveyed
    /// as an instruction appended to it.
    fn build_anthropic_request_body(&self, request: &ChatRequest) -> Value {
        let system = match &request.response_schema {
            Some(schema) => Some(append_json_instruction(request.system.as_deref(), schema)),
            None => request.system.clone(),
        };

        let mut body = json!({
            "model": self.model_for(request),
            "max_tokens": request.max_tokens.unwrap_or(self.settings.max_tokens),
            "messages": messages_to_wire(&request.messages),
        });

        if let Some(system) = system {
            body["system"] = json!(system);
        }

        if let Some(temp) = request.temperature {
            body["temperature"] = json!(temp);
        }

        body
    }

    // -- Shared transport ----------------------------------------------------

    async fn send(&self, url: &str, headers: HeaderMap, body: &Value) -> Result<Value> {
        let resp = self
            .http
            .post(url)
            .headers(headers)
            .json(body)
            .send()
            .await
            .map_err(|e| AgentError::LlmRequestFailed {
                reason: e.to_string(),
            })?;

        let status = resp.status();
        let text = resp
            .text()
            .await
            .map_err(|e| AgentError::LlmRequestFailed {
                reason: format!("failed to read response body: {e}"),
            })?;

        if !status.is_success() {
            return Err(AgentError::LlmRequestFailed {
                reason: format!("API returned {status}: {text}"),
            });
        }

        serde_json::from_str(&text).map_err(|e| AgentError::LlmParseFailed {
            reason: format!("invalid JSON response: {e}"),
        })
    }
}

#[async_trait]
impl ModelClient for HttpModelClient {
    fn provider(&self) -> ProviderId {
        self.settings.provider
    }

    fn default_model(&self) -> &str {
        &self.settings.model
    }

    async fn chat_completion(&self, request: &ChatRequest) -> Result<ChatResponse> {
        match self.settings.provider.dialect() {
            WireDialect::OpenAi => self.chat_openai(request).await,
            WireDialect::Anthropic => self.chat_anthropic(request).await,
        }
    }
}

// ===========================================================================
// Format conversion (free functions)
// ===========================================================================

fn wire_role(role: Role) -> &'static str {
    match role {
        Role::User => "user",
        Role::Agent => "assistant",
    }
}

/// Convert history messages to `{role, content}` wire objects.
fn messages_to_wire(messages: &[Message]) -> Vec<Value> {
    messages
        .iter()
        .map(|msg| {
            json!({
                "role": wire_role(msg.role),
                "content": msg.content,
            })
        })
        .collect()
}

/// Convert history to the Chat Completions format, where the system prompt is
/// the first entry of the `messages` array.
pub fn messages_to_openai(system: Option<&str>, messages: &[Message]) -> Vec<Value> {
    let mut wire = Vec::with_capacity(messages.len() + 1);
    if let Some(system) = system {
        wire.push(json!({ "role": "system", "content": system }));
    }
    wire.extend(messages_to_wire(messages));
    wire
}

/// Append an instruction asking for JSON that matches `schema`.
fn append_json_instruction(system: Option<&str>, schema: &Value) -> String {
    let instruction = format!(
        "Respond only with a JSON value that conforms to this JSON Schema, \
         without any surrounding prose:\n{schema}"
    );
    match system {
        Some(s) if !s.is_empty() => format!("{s}\n\n{instruction}"),
        _ => instruction,
    }
}

/// Parse a non-streaming Chat Completions response.
pub fn parse_openai_response(v: &Value) -> Result<ChatResponse> {
    let choice = &v["choices"][0];
    let message = &choice["message"];

    if message.is_null() {
        return Err(AgentError::LlmParseFailed {
            reason: "missing `choices[0].message` in response".into(),
        });
    }

    Ok(ChatResponse {
        content: message["content"].as_str().unwrap_or_default().to_owned(),
        model: v["model"].as_str().map(str::to_owned),
        finish_reason: choice["finish_reason"].as_str().map(str::to_owned),
    })
}

/// Parse a non-streaming Anthropic Messages response.
fn parse_anthropic_response(v: &Value) -> Result<ChatResponse> {
    let content = v["content"]
        .as_array()
        .ok_or_else(|| AgentError::LlmParseFailed {
            reason: "missing `content` array in response".into(),
        })?;

    let text: String = content
        .iter()
        .filter(|block| block["type"] == "text")
        .filter_map(|block| block["text"].as_str())
        .collect();

    Ok(ChatResponse {
        content: text,
        model: v["model"].as_str().map(str::to_owned),
        finish_reason: v["stop_reason"].as_str().map(str::to_owned),
    })
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    fn client(provider: ProviderId, model: &str) -> HttpModelClient {
        HttpModelClient::new(ClientSettings::new(provider, "test-key", model)).unwrap()
    }

    fn request(messages: Vec<Message>) -> ChatRequest {
        ChatRequest {
            system: Some("You are helpful.".into()),
            messages,
            ..ChatRequest::default()
        }
    }

    // -- Construction --------------------------------------------------------

    #[test]
    fn empty_api_key_names_the_credential() {
        let result = HttpModelClient::new(ClientSettings::new(ProviderId::Fireworks, "", "m"));
        match result {
            Err(AgentError::MissingCredential { key }) => assert_eq!(key, "FIREWORKS_API_KEY"),
            other => panic!("expected MissingCredential, got {other:?}"),
        }
    }

    #[test]
    fn provider_detection() {
        assert_eq!(client(ProviderId::OpenAi, "gpt-4o").provider(), ProviderId::OpenAi);
        assert_eq!(
            client(ProviderId::Anthropic, "claude-sonnet-4-20250514").provider(),
            ProviderId::Anthropic
        );
        assert_eq!(client(ProviderId::OpenAi, "gpt-4o").default_model(), "gpt-4o");
    }

    // -- OpenAI request body -------------------------------------------------

    #[test]
    fn build_openai_request_body_basic() {
        let client = client(ProviderId::OpenAi, "gpt-4o");
        let mut request = request(vec![
            Message::user("Hello"),
            Message::agent("Hi!"),
            Message::user("Summarize this"),
        ]);
        request.temperature = Some(0.5);
        request.max_tokens = Some(2048);

        let body = client.build_openai_request_body(&request);

        assert_eq!(body["model"], "gpt-4o");
        assert_eq!(body["max_tokens"], 2048);
        let temp = body["temperature"].as_f64().unwrap();
        assert!((temp - 0.5).abs() < 1e-6);
        assert!(body.get("response_format").is_none());

        let messages = body["messages"].as_array().unwrap();
        assert_eq!(messages.len(), 4);
        assert_eq!(messages[0]["role"], "system");
        assert_eq!(messages[0]["content"], "You are helpful.");
        assert_eq!(messages[1]["role"], "user");
        assert_eq!(messages[2]["role"], "assistant");
        assert_eq!(messages[3]["content"], "Summarize this");
    }

    #[test]
    fn build_openai_request_body_uses_request_model_and_default_tokens() {
        let client = client(ProviderId::OpenAi, "gpt-4o");
        let mut request = request(vec![Message::user("Hi")]);
        request.model = "gpt-4o-mini".into();

        let body = client.build_openai_request_body(&request);
        assert_eq!(body["model"], "gpt-4o-mini");
        assert_eq!(body["max_tokens"], 4096);
        assert!(body.get("temperature").is_none());
    }

    #[test]
    fn openai_object_schema_becomes_json_schema_format() {
        let client = client(ProviderId::OpenAi, "gpt-4o");
        let mut request = request(vec![Message::user("Count")]);
        request.response_schema = Some(json!({
            "type": "object",
            "properties": {"count": {"type": "number"}},
            "required": ["count"]
        }));

        let body = client.build_openai_request_body(&request);
        assert_eq!(body["response_format"]["type"], "json_schema");
        assert_eq!(body["response_format"]["json_schema"]["name"], "agent_output");
        assert_eq!(
            body["response_format"]["json_schema"]["schema"]["required"],
            json!(["count"])
        );
        assert_eq!(body["messages"][0]["content"], "You are helpful.");
    }

    #[test]
    fn openai_non_object_schema_falls_back_to_instruction() {
        let client = client(ProviderId::OpenAi, "gpt-4o");
        let mut request = request(vec![Message::user("List")]);
        request.response_schema = Some(json!({"type": "array", "items": {"type": "string"}}));

        let body = client.build_openai_request_body(&request);
        assert!(body.get("response_format").is_none());
        let system = body["messages"][0]["content"].as_str().unwrap();
        assert!(system.starts_with("You are helpful."));
        assert!(system.contains("\"array\""));
    }

    #[test]
    fn fireworks_schema_becomes_json_object_format() {
        let client = client(ProviderId::Fireworks, "accounts/fireworks/models/llama-v3p1-8b-instruct");
        let mut request = request(vec![Message::user("Count")]);
        request.response_schema = Some(json!({"type": "object"}));

        let body = client.build_openai_request_body(&request);
        assert_eq!(body["response_format"]["type"], "json_object");
        assert_eq!(body["response_format"]["schema"]["type"], "object");
    }

    // -- Anthropic request body ----------------------------------------------

    #[test]
    fn build_anthropic_request_body_basic() {
        let client = client(ProviderId::Anthropic, "claude-sonnet-4-20250514");
        let mut request = request(vec![Message::user("Hello"), Message::agent("Hi")]);
        request.temperature = Some(0.7);
        request.max_tokens = Some(1024);

        let body = client.build_anthropic_request_body(&request);

        assert_eq!(body["model"], "claude-sonnet-4-20250514");
        assert_eq!(body["system"], "You are helpful.");
        assert_eq!(body["max_tokens"], 1024);
        let temp = body["temperature"].as_f64().unwrap();
        assert!((temp - 0.7).abs() < 1e-6, "temperature was {temp}");

        let messages = body["messages"].as_array().unwrap();
        assert_eq!(messages.len(), 2);
        assert_eq!(messages[0]["role"], "user");
        assert_eq!(messages[1]["role"], "assistant");
    }

    #[test]
    fn anthropic_schema_is_appended_to_system_prompt() {
        let client = client(ProviderId::Anthropic, "claude-sonnet-4-20250514");
        let mut request = request(vec![Message::user("Count")]);
        request.system = None;
        request.response_schema = Some(json!({"type": "object"}));

        let body = client.build_anthropic_request_body(&request);
        let system = body["system"].as_str().unwrap();
        assert!(system.starts_with("Respond only with a JSON value"));
    }

    // -- Response parsing ----------------------------------------------------

    #[test]
    fn parse_openai_text_response() {
        let response_json = json!({
            "id": "chatcmpl-abc",
            "object": "chat.completion",
            "model": "gpt-4o-2024-08-06",
            "choices": [{
                "index": 0,
                "message": {"role": "assistant", "content": "Hello from OpenAI!"},
                "finish_reason": "stop"
            }]
        });

        let result = parse_openai_response(&response_json).unwrap();
        assert_eq!(result.content, "Hello from OpenAI!");
        assert_eq!(result.model.as_deref(), Some("gpt-4o-2024-08-06"));
        assert_eq!(result.finish_reason.as_deref(), Some("stop"));
    }

    #[test]
    fn parse_openai_response_without_choices_fails() {
        let result = parse_openai_response(&json!({"error": {"message": "nope"}}));
        assert!(matches!(result, Err(AgentError::LlmParseFailed { .. })));
    }

    #[test]
    fn parse_anthropic_text_response_joins_text_blocks() {
        let response_json = json!({
            "id": "msg_01",
            "type": "message",
            "role": "assistant",
            "model": "claude-sonnet-4-20250514",
            "content": [
                {"type": "text", "text": "Hello, "},
                {"type": "text", "text": "world!"}
            ],
            "stop_reason": "end_turn"
        });

        let result = parse_anthropic_response(&response_json).unwrap();
        assert_eq!(result.content, "Hello, world!");
        assert_eq!(result.finish_reason.as_deref(), Some("end_turn"));
    }

    #[test]
    fn parse_anthropic_response_without_content_fails() {
        assert!(parse_anthropic_response(&json!({"type": "error"})).is_err());
    }
}
