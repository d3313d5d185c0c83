use super::errors::{AgentError, ToolError};
use super::settings::AgentSettings;
use super::tools::ToolSet;
use crate::domain::types::{ChatMessage, ToolCall};
use crate::infrastructure::model::{ChatModel, ModelEvent, ModelRequest, ModelSink};
use async_trait::async_trait;
use tracing::{debug, info, warn};

/// Decides, turn by turn, whether to call a tool or answer.
#[async_trait]
pub trait AgentRuntime: Send + Sync {
    /// Returns `messages` followed by everything produced; the last entry is
    /// the reply.
    async fn invoke(
        &self,
        model: &dyn ChatModel,
        messages: Vec<ChatMessage>,
        tools: &ToolSet,
        sink: Option<&ModelSink>,
    ) -> Result<Vec<ChatMessage>, AgentError>;
}

/// Native tool-calling loop: ask the model, run the tools it requests, feed
/// the results back, repeat until it answers in plain text.
#[derive(Debug, Clone)]
pub struct ToolCallingRuntime {
    system_prompt: Option<String>,
    max_iterations: usize,
}

impl ToolCallingRuntime {
    pub fn new(system_prompt: Option<String>, max_iterations: usize) -> Self {
        Self {
            system_prompt,
            max_iterations,
        }
    }

    pub fn from_settings(settings: &AgentSettings) -> Self {
        Self::new(settings.system_prompt.clone(), settings.max_iterations)
    }

    fn request(&self, transcript: &[ChatMessage], tools: &ToolSet) -> ModelRequest {
        let mut messages = Vec::with_capacity(transcript.len() + 1);
        if let Some(prompt) = &self.system_prompt {
            messages.push(ChatMessage::system(prompt.as_str()));
        }
        messages.extend_from_slice(transcript);
        ModelRequest {
            messages,
            tools: tools.specs(),
        }
    }

    async fn execute(&self, tools: &ToolSet, call: &ToolCall) -> Result<String, ToolError> {
        let Some(tool) = tools.get(&call.name) else {
            warn!(requested_tool = %call.name, "Unknown tool requested by agent");
            return Err(ToolError::UnknownTool(call.name.clone()));
        };
        debug!(tool = %call.name, arguments = %call.arguments, "Running tool");
        tool.call(call.arguments.clone()).await
    }
}

impl Default for ToolCallingRuntime {
    fn default() -> Self {
        Self::from_settings(&AgentSettings::default())
    }
}

#[async_trait]
impl AgentRuntime for ToolCallingRuntime {
    async fn invoke(
        &self,
        model: &dyn ChatModel,
        messages: Vec<ChatMessage>,
        tools: &ToolSet,
        sink: Option<&ModelSink>,
    ) -> Result<Vec<ChatMessage>, AgentError> {
        let mut transcript = messages;

        for iteration in 1..=self.max_iterations {
            if let Some(sink) = sink {
                sink(ModelEvent::TurnStarted);
            }
            let request = self.request(&transcript, tools);
            let response = model.complete(request, sink).await?;
            let message = response.message;

            if message.tool_calls.is_empty() {
                info!(iteration, model = model.id(), "Agent produced final answer");
                transcript.push(message);
                return Ok(transcript);
            }

            let calls = message.tool_calls.clone();
            transcript.push(message);
            for call in calls {
                let output = match self.execute(tools, &call).await {
                    Ok(output) => output,
                    Err(err) => {
                        warn!(tool = %call.name, %err, "Tool call failed");
                        format!("Error: {err}")
                    }
                };
                transcript.push(ChatMessage::tool_result(call.id, output));
            }
        }

        warn!(max_iterations = self.max_iterations, "Agent hit iteration cap");
        Err(AgentError::MaxIterationsReached(self.max_iterations))
    }
}
