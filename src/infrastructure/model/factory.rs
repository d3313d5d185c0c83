//! Model factory - creates clients from the config store

use super::openai::{OpenAiChatModel, OpenAiSettings};
use super::traits::{ChatModel, ModelFactory};
use super::types::ModelError;
use crate::application::agent::AgentSettings;
use crate::config::ConfigStore;
use crate::constants::DEFAULT_BASE_URL;
use async_trait::async_trait;
use std::sync::Arc;
use tracing::warn;

/// Builds [`OpenAiChatModel`]s with the key, endpoint and model name found in
/// the config store.
pub struct OpenAiModelFactory {
    config: Arc<ConfigStore>,
}

impl OpenAiModelFactory {
    pub fn new(config: Arc<ConfigStore>) -> Self {
        Self { config }
    }
}

#[async_trait]
impl ModelFactory for OpenAiModelFactory {
    async fn build(&self, settings: &AgentSettings) -> Result<Box<dyn ChatModel>, ModelError> {
        let Some(api_key) = self.config.api_key().await else {
            warn!("No API key in config or environment");
            return Err(ModelError::missing_api_key("openai"));
        };

        let model = self
            .config
            .model()
            .await
            .unwrap_or_else(|| settings.model.clone());
        let base_url = self
            .config
            .base_url()
            .await
            .unwrap_or_else(|| DEFAULT_BASE_URL.to_string());

        Ok(Box::new(OpenAiChatModel::new(OpenAiSettings {
            base_url,
            api_key: Some(api_key),
            model,
            temperature: settings.temperature,
        })))
    }
}
