//! Model traits

use super::types::{ModelError, ModelRequest, ModelResponse, ModelSink};
use crate::application::agent::AgentSettings;
use async_trait::async_trait;

/// A chat model that can answer or request tool calls.
#[async_trait]
pub trait ChatModel: Send + Sync {
    fn id(&self) -> &str;

    /// Runs one completion. With a sink, text is streamed to it as it arrives.
    async fn complete(
        &self,
        request: ModelRequest,
        sink: Option<&ModelSink>,
    ) -> Result<ModelResponse, ModelError>;
}

/// Builds a fresh model client for each agent invocation.
#[async_trait]
pub trait ModelFactory: Send + Sync {
    async fn build(&self, settings: &AgentSettings) -> Result<Box<dyn ChatModel>, ModelError>;
}
