//! Core types for LLM interaction.
//!
//! These types model the data flowing between the agent runtime and model
//! clients.  They are provider-agnostic; [`super::client`] translates them
//! into provider-specific wire formats.

use serde::{Deserialize, Serialize};
use serde_json::Value;

// ---------------------------------------------------------------------------
// Messages
// ---------------------------------------------------------------------------

/// The role of a participant in a conversation history.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    /// Input from the caller.
    User,
    /// Output produced by the agent.  Sent as `assistant` on the wire.
    Agent,
}

/// A single message in a conversation history.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Message {
    /// Who produced this message.
    pub role: Role,

    /// The textual content of the message.
    #[serde(default)]
    pub content: String,
}

impl Message {
    /// Create a user message.
    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: Role::User,
            content: content.into(),
        }
    }

    /// Create an agent message.
    pub fn agent(content: impl Into<String>) -> Self {
        Self {
            role: Role::Agent,
            content: content.into(),
        }
    }
}

// ---------------------------------------------------------------------------
// Chat request / response
// ---------------------------------------------------------------------------

/// A full request to send to a model client.
#[derive(Debug, Clone, Default, Serialize)]
pub struct ChatRequest {
    /// The model identifier.  Empty means "use the client's default".
    pub model: String,

    /// The rendered system prompt.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub system: Option<String>,

    /// The conversation history, oldest first.
    pub messages: Vec<Message>,

    /// Sampling temperature.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub temperature: Option<f32>,

    /// Maximum tokens the model may generate.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub max_tokens: Option<u32>,

    /// JSON Schema the answer should conform to, if structured output is
    /// expected.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub response_schema: Option<Value>,
}

/// A normalized response from a model client.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ChatResponse {
    /// The textual answer.
    pub content: String,

    /// The model that actually served the request, when reported.
    pub model: Option<String>,

    /// Provider stop / finish reason, when reported.
    pub finish_reason: Option<String>,
}

impl ChatResponse {
    /// A response carrying only text.
    pub fn text(content: impl Into<String>) -> Self {
        Self {
            content: content.into(),
            ..Self::default()
        }
    }
}
