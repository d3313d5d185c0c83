//! OpenAI-compatible chat completions client

use super::stream::{StreamAssembler, generate_call_id, parse_tool_arguments};
use super::traits::ChatModel;
use super::types::{ModelError, ModelEvent, ModelRequest, ModelResponse, ModelSink, ToolSpec};
use crate::constants::DEFAULT_BASE_URL;
use crate::domain::types::{ChatMessage, MessageContent, MessageRole, ToolCall};
use async_trait::async_trait;
use futures::StreamExt;
use reqwest::Client;
use reqwest_eventsource::{Event, EventSource};
use serde::{Deserialize, Serialize};
use serde_json::{Value, json};
use tracing::{debug, info};

const PROVIDER_ID: &str = "openai";
const API_PATH: &str = "/v1/chat/completions";

#[derive(Debug, Clone)]
pub struct OpenAiSettings {
    pub base_url: String,
    pub api_key: Option<String>,
    pub model: String,
    pub temperature: f32,
}

impl Default for OpenAiSettings {
    fn default() -> Self {
        Self {
            base_url: DEFAULT_BASE_URL.to_string(),
            api_key: None,
            model: "gpt-4".to_string(),
            temperature: 0.7,
        }
    }
}

#[derive(Clone)]
pub struct OpenAiChatModel {
    settings: OpenAiSettings,
    http: Client,
}

impl OpenAiChatModel {
    pub fn new(settings: OpenAiSettings) -> Self {
        Self {
            settings,
            http: Client::new(),
        }
    }

    pub fn model(&self) -> &str {
        &self.settings.model
    }

    fn build_url(&self) -> String {
        let base = self.settings.base_url.trim_end_matches('/');
        let path = API_PATH.trim_start_matches('/');
        format!("{base}/{path}")
    }

    fn require_api_key(&self) -> Result<&str, ModelError> {
        self.settings
            .api_key
            .as_deref()
            .filter(|key| !key.trim().is_empty())
            .ok_or_else(|| ModelError::missing_api_key(PROVIDER_ID))
    }

    fn payload(&self, request: &ModelRequest, stream: bool) -> CompletionRequest {
        CompletionRequest {
            model: self.settings.model.clone(),
            messages: to_openai_messages(&request.messages),
            temperature: self.settings.temperature,
            tools: request.tools.iter().map(to_openai_tool).collect(),
            stream,
        }
    }

    async fn complete_blocking(&self, request: ModelRequest) -> Result<ModelResponse, ModelError> {
        let api_key = self.require_api_key()?;
        let payload = self.payload(&request, false);

        let response: CompletionResponse = self
            .http
            .post(self.build_url())
            .bearer_auth(api_key)
            .json(&payload)
            .send()
            .await
            .map_err(|e| ModelError::network(PROVIDER_ID, e))?
            .error_for_status()
            .map_err(|e| ModelError::network(PROVIDER_ID, e))?
            .json()
            .await
            .map_err(|e| ModelError::network(PROVIDER_ID, e))?;
        debug!("Received response from OpenAI-compatible provider");

        let message = response
            .choices
            .into_iter()
            .next()
            .map(|choice| choice.message)
            .ok_or_else(|| ModelError::invalid_response(PROVIDER_ID, "missing choices"))?;
        Ok(ModelResponse::new(from_openai_message(message)?))
    }

    async fn complete_streaming(
        &self,
        request: ModelRequest,
        sink: &ModelSink,
    ) -> Result<ModelResponse, ModelError> {
        let api_key = self.require_api_key()?;
        let payload = self.payload(&request, true);

        let builder = self
            .http
            .post(self.build_url())
            .bearer_auth(api_key)
            .json(&payload);
        let mut source = EventSource::new(builder)
            .map_err(|err| ModelError::stream(PROVIDER_ID, err.to_string()))?;

        let mut assembler = StreamAssembler::new();
        while let Some(event) = source.next().await {
            match event {
                Ok(Event::Open) => debug!("Completion stream opened"),
                Ok(Event::Message(message)) => {
                    if message.data.trim() == "[DONE]" {
                        break;
                    }
                    match assembler.push(&message.data) {
                        Ok(Some(token)) => sink(ModelEvent::Token(token)),
                        Ok(None) => {}
                        Err(err) => {
                            source.close();
                            return Err(ModelError::invalid_response(PROVIDER_ID, err.to_string()));
                        }
                    }
                }
                Err(reqwest_eventsource::Error::StreamEnded) => break,
                Err(err) => {
                    source.close();
                    return Err(ModelError::stream(PROVIDER_ID, err.to_string()));
                }
            }
        }
        source.close();

        let message = assembler
            .finish()
            .map_err(|reason| ModelError::invalid_response(PROVIDER_ID, reason))?;
        Ok(ModelResponse::new(message))
    }
}

#[async_trait]
impl ChatModel for OpenAiChatModel {
    fn id(&self) -> &str {
        PROVIDER_ID
    }

    async fn complete(
        &self,
        request: ModelRequest,
        sink: Option<&ModelSink>,
    ) -> Result<ModelResponse, ModelError> {
        info!(
            provider = PROVIDER_ID,
            model = self.settings.model.as_str(),
            messages = request.messages.len(),
            tools = request.tools.len(),
            stream = sink.is_some(),
            "Sending request to OpenAI-compatible provider"
        );
        match sink {
            Some(sink) => self.complete_streaming(request, sink).await,
            None => self.complete_blocking(request).await,
        }
    }
}

#[derive(Serialize)]
struct CompletionRequest {
    model: String,
    messages: Vec<Value>,
    temperature: f32,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    tools: Vec<Value>,
    stream: bool,
}

#[derive(Deserialize)]
struct CompletionResponse {
    #[serde(default)]
    choices: Vec<CompletionChoice>,
}

#[derive(Deserialize)]
struct CompletionChoice {
    message: CompletionMessage,
}

#[derive(Deserialize)]
struct CompletionMessage {
    #[serde(default)]
    content: Option<MessageContent>,
    #[serde(default)]
    tool_calls: Vec<CompletionToolCall>,
}

#[derive(Deserialize)]
struct CompletionToolCall {
    #[serde(default)]
    id: Option<String>,
    function: CompletionFunction,
}

#[derive(Deserialize)]
struct CompletionFunction {
    name: String,
    #[serde(default)]
    arguments: String,
}

fn from_openai_message(message: CompletionMessage) -> Result<ChatMessage, ModelError> {
    let mut calls = Vec::with_capacity(message.tool_calls.len());
    for call in message.tool_calls {
        let arguments = parse_tool_arguments(&call.function.arguments)
            .map_err(|reason| ModelError::invalid_response(PROVIDER_ID, reason))?;
        calls.push(ToolCall {
            id: call.id.unwrap_or_else(generate_call_id),
            name: call.function.name,
            arguments,
        });
    }
    Ok(ChatMessage::assistant(message.content.unwrap_or_default()).with_tool_calls(calls))
}

fn to_openai_messages(messages: &[ChatMessage]) -> Vec<Value> {
    messages
        .iter()
        .map(|msg| match msg.role {
            MessageRole::Assistant if !msg.tool_calls.is_empty() => {
                let calls: Vec<Value> = msg
                    .tool_calls
                    .iter()
                    .map(|call| {
                        json!({
                            "id": call.id,
                            "type": "function",
                            "function": {
                                "name": call.name,
                                "arguments": call.arguments.to_string(),
                            }
                        })
                    })
                    .collect();
                let content = if msg.content.is_empty() {
                    Value::Null
                } else {
                    json!(msg.content)
                };
                json!({ "role": "assistant", "content": content, "tool_calls": calls })
            }
            MessageRole::Tool => json!({
                "role": "tool",
                "tool_call_id": msg.tool_call_id,
                "content": msg.text(),
            }),
            role => json!({ "role": role.as_str(), "content": msg.content }),
        })
        .collect()
}

fn to_openai_tool(spec: &ToolSpec) -> Value {
    json!({
        "type": "function",
        "function": {
            "name": spec.name,
            "description": spec.description,
            "parameters": spec.parameters,
        }
    })
}
