//! Assembly of streamed chat-completion chunks into a single message

use crate::domain::types::{ChatMessage, ToolCall};
use serde::Deserialize;
use serde_json::Value;
use std::collections::BTreeMap;

#[derive(Debug, Deserialize)]
struct ChunkPayload {
    #[serde(default)]
    choices: Vec<ChunkChoice>,
}

#[derive(Debug, Deserialize)]
struct ChunkChoice {
    #[serde(default)]
    delta: Delta,
}

#[derive(Debug, Default, Deserialize)]
struct Delta {
    content: Option<String>,
    #[serde(default)]
    tool_calls: Vec<ToolCallDelta>,
}

#[derive(Debug, Deserialize)]
struct ToolCallDelta {
    #[serde(default)]
    index: usize,
    id: Option<String>,
    function: Option<FunctionDelta>,
}

#[derive(Debug, Deserialize)]
struct FunctionDelta {
    name: Option<String>,
    arguments: Option<String>,
}

#[derive(Debug, Default)]
struct PartialToolCall {
    id: Option<String>,
    name: String,
    arguments: String,
}

/// Collects the `data:` payloads of one streamed completion.
#[derive(Debug, Default)]
pub struct StreamAssembler {
    content: String,
    tool_calls: BTreeMap<usize, PartialToolCall>,
}

impl StreamAssembler {
    pub fn new() -> Self {
        Self::default()
    }

    /// Applies one chunk and returns its text delta, if any.
    pub fn push(&mut self, data: &str) -> Result<Option<String>, serde_json::Error> {
        let payload: ChunkPayload = serde_json::from_str(data)?;
        let mut token = String::new();

        for choice in payload.choices {
            if let Some(content) = choice.delta.content {
                token.push_str(&content);
            }
            for delta in choice.delta.tool_calls {
                let entry = self.tool_calls.entry(delta.index).or_default();
                if let Some(id) = delta.id.filter(|id| !id.is_empty()) {
                    entry.id = Some(id);
                }
                if let Some(function) = delta.function {
                    if let Some(name) = function.name {
                        entry.name.push_str(&name);
                    }
                    if let Some(arguments) = function.arguments {
                        entry.arguments.push_str(&arguments);
                    }
                }
            }
        }

        self.content.push_str(&token);
        Ok((!token.is_empty()).then_some(token))
    }

    pub fn content(&self) -> &str {
        &self.content
    }

    /// Builds the assistant message. Fails when a tool call's arguments are not
    /// valid JSON.
    pub fn finish(self) -> Result<ChatMessage, String> {
        let mut calls = Vec::with_capacity(self.tool_calls.len());
        for (_, partial) in self.tool_calls {
            if partial.name.is_empty() {
                return Err("tool call without a function name".to_string());
            }
            calls.push(ToolCall {
                id: partial.id.unwrap_or_else(generate_call_id),
                arguments: parse_tool_arguments(&partial.arguments)?,
                name: partial.name,
            });
        }
        Ok(ChatMessage::assistant(self.content).with_tool_calls(calls))
    }
}

pub(super) fn generate_call_id() -> String {
    format!("call_{}", uuid::Uuid::new_v4().simple())
}

/// Parses the JSON-encoded arguments string of a function call.
pub(super) fn parse_tool_arguments(raw: &str) -> Result<Value, String> {
    if raw.trim().is_empty() {
        return Ok(Value::Object(Default::default()));
    }
    serde_json::from_str(raw).map_err(|err| format!("invalid tool arguments '{raw}': {err}"))
}
