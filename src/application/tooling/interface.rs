use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::{Map as JsonMap, Value};

use super::error::BridgeError;

/// Tool advertised by an MCP server.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ToolDescriptor {
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(default = "empty_schema")]
    pub input_schema: Value,
}

fn empty_schema() -> Value {
    serde_json::json!({ "type": "object", "properties": {} })
}

impl ToolDescriptor {
    pub(crate) fn from_listing(tool: &Value) -> Option<Self> {
        let name = tool.get("name").and_then(Value::as_str)?;
        Some(Self {
            name: name.to_string(),
            description: tool
                .get("description")
                .and_then(Value::as_str)
                .map(str::to_string),
            input_schema: tool
                .get("inputSchema")
                .cloned()
                .unwrap_or_else(empty_schema),
        })
    }
}

/// Result of running a tool on an MCP server.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "status", content = "value", rename_all = "snake_case")]
pub enum ToolOutcome {
    /// Raw `tools/call` result (`content`, `structuredContent`, ...).
    Success(Value),
    /// The server flagged the call with `isError`.
    Failure(String),
}

impl ToolOutcome {
    pub fn from_call_result(result: Value) -> Self {
        let failed = result
            .get("isError")
            .and_then(Value::as_bool)
            .unwrap_or(false);
        if failed {
            let message = first_text_block(&result)
                .unwrap_or_else(|| "tool reported an error".to_string());
            ToolOutcome::Failure(message)
        } else {
            ToolOutcome::Success(result)
        }
    }

    pub fn is_success(&self) -> bool {
        matches!(self, ToolOutcome::Success(_))
    }

    /// Flattens the outcome into text the model can read.
    pub fn into_text(self) -> String {
        match self {
            ToolOutcome::Failure(message) => format!("Error: {message}"),
            ToolOutcome::Success(value) => {
                let texts = text_blocks(&value);
                if !texts.is_empty() {
                    return texts.join("\n");
                }
                match value.get("structuredContent") {
                    Some(structured) => structured.to_string(),
                    None => value.to_string(),
                }
            }
        }
    }
}

fn text_blocks(result: &Value) -> Vec<String> {
    result
        .get("content")
        .and_then(Value::as_array)
        .map(|blocks| {
            blocks
                .iter()
                .filter(|block| block.get("type").and_then(Value::as_str) == Some("text"))
                .filter_map(|block| block.get("text").and_then(Value::as_str))
                .map(str::to_string)
                .collect()
        })
        .unwrap_or_default()
}

fn first_text_block(result: &Value) -> Option<String> {
    text_blocks(result).into_iter().next()
}

/// Command sent across the host boundary, shaped as `{ command, args }`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(
    tag = "command",
    content = "args",
    rename_all = "snake_case",
    rename_all_fields = "camelCase"
)]
pub enum HostRequest {
    ConnectServer {
        connection_id: String,
        command: String,
        args: Vec<String>,
    },
    ListTools {
        connection_id: String,
    },
    CallTool {
        connection_id: String,
        name: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        args: Option<JsonMap<String, Value>>,
    },
    DisconnectServer {
        connection_id: String,
    },
}

impl HostRequest {
    pub fn name(&self) -> &'static str {
        match self {
            HostRequest::ConnectServer { .. } => "connect_server",
            HostRequest::ListTools { .. } => "list_tools",
            HostRequest::CallTool { .. } => "call_tool",
            HostRequest::DisconnectServer { .. } => "disconnect_server",
        }
    }

    pub fn connection_id(&self) -> &str {
        match self {
            HostRequest::ConnectServer { connection_id, .. }
            | HostRequest::ListTools { connection_id }
            | HostRequest::CallTool { connection_id, .. }
            | HostRequest::DisconnectServer { connection_id } => connection_id,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "value", rename_all = "snake_case")]
pub enum HostReply {
    Ack,
    Tools(Vec<ToolDescriptor>),
    ToolResult(ToolOutcome),
}

/// Receiving side of the four bridge commands.
#[async_trait]
pub trait CommandDispatch: Send + Sync {
    async fn dispatch(&self, request: HostRequest) -> Result<HostReply, BridgeError>;
}
