//! LLM integration layer.
//!
//! - [`types`] -- Provider-agnostic messages, requests and responses.
//! - [`client`] -- The [`ModelClient`] capability and its HTTP implementation.
//! - [`provider`] -- Supported providers and the client factory registry.

pub mod client;
pub mod provider;
pub mod types;

pub use client::{HttpModelClient, ModelClient};
pub use provider::{ClientFactory, ClientRegistry, ClientSettings, ProviderId, WireDialect};
pub use types::{ChatRequest, ChatResponse, Message, Role};
