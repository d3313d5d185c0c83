//! Model types - request, response, streaming events and errors

use crate::domain::types::ChatMessage;
use serde::Serialize;
use serde_json::Value;
use std::sync::Arc;
use thiserror::Error;

/// Function the model may call, described by a JSON schema.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ToolSpec {
    pub name: String,
    pub description: String,
    pub parameters: Value,
}

#[derive(Debug, Clone, Default)]
pub struct ModelRequest {
    pub messages: Vec<ChatMessage>,
    pub tools: Vec<ToolSpec>,
}

#[derive(Debug, Clone)]
pub struct ModelResponse {
    /// Assistant message; may carry tool calls instead of text.
    pub message: ChatMessage,
}

impl ModelResponse {
    pub fn new(message: ChatMessage) -> Self {
        Self { message }
    }
}

/// Incremental output delivered while a request is in flight.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ModelEvent {
    /// A new model call begins; earlier tokens belong to a finished turn.
    TurnStarted,
    Token(String),
}

pub type ModelSink = Arc<dyn Fn(ModelEvent) + Send + Sync>;

#[derive(Debug, Error)]
pub enum ModelError {
    #[error("provider '{provider}' requires an API key")]
    MissingApiKey { provider: String },
    #[error("network error calling provider '{provider}': {source}")]
    Network {
        provider: String,
        #[source]
        source: reqwest::Error,
    },
    #[error("stream from provider '{provider}' failed: {reason}")]
    Stream { provider: String, reason: String },
    #[error("provider '{provider}' returned invalid response: {reason}")]
    InvalidResponse { provider: String, reason: String },
}

impl ModelError {
    pub fn missing_api_key(provider: impl Into<String>) -> Self {
        Self::MissingApiKey {
            provider: provider.into(),
        }
    }

    pub fn network(provider: impl Into<String>, source: reqwest::Error) -> Self {
        Self::Network {
            provider: provider.into(),
            source,
        }
    }

    pub fn stream(provider: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::Stream {
            provider: provider.into(),
            reason: reason.into(),
        }
    }

    pub fn invalid_response(provider: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::InvalidResponse {
            provider: provider.into(),
            reason: reason.into(),
        }
    }
}
