use super::error::BridgeError;
use super::interface::{CommandDispatch, HostReply, HostRequest, ToolDescriptor, ToolOutcome};
use serde_json::{Map as JsonMap, Value};
use std::fmt;
use std::sync::Arc;

/// Caller-side handle for one MCP server connection on the host.
///
/// Every method forwards a single [`HostRequest`] and returns the host's reply
/// or error as-is. The id is not checked for uniqueness here; the host rejects
/// duplicates on `connect`.
#[derive(Clone)]
pub struct McpServerClient {
    connection_id: String,
    dispatch: Arc<dyn CommandDispatch>,
}

impl McpServerClient {
    pub fn new(connection_id: impl Into<String>, dispatch: Arc<dyn CommandDispatch>) -> Self {
        Self {
            connection_id: connection_id.into(),
            dispatch,
        }
    }

    pub fn connection_id(&self) -> &str {
        &self.connection_id
    }

    pub async fn connect(&self, command: &str, args: &[String]) -> Result<(), BridgeError> {
        let request = HostRequest::ConnectServer {
            connection_id: self.connection_id.clone(),
            command: command.to_string(),
            args: args.to_vec(),
        };
        match self.dispatch.dispatch(request).await? {
            HostReply::Ack => Ok(()),
            _ => Err(BridgeError::UnexpectedReply {
                command: "connect_server",
            }),
        }
    }

    pub async fn list_tools(&self) -> Result<Vec<ToolDescriptor>, BridgeError> {
        let request = HostRequest::ListTools {
            connection_id: self.connection_id.clone(),
        };
        match self.dispatch.dispatch(request).await? {
            HostReply::Tools(tools) => Ok(tools),
            _ => Err(BridgeError::UnexpectedReply {
                command: "list_tools",
            }),
        }
    }

    pub async fn call_tool(
        &self,
        name: &str,
        args: Option<JsonMap<String, Value>>,
    ) -> Result<ToolOutcome, BridgeError> {
        let request = HostRequest::CallTool {
            connection_id: self.connection_id.clone(),
            name: name.to_string(),
            args,
        };
        match self.dispatch.dispatch(request).await? {
            HostReply::ToolResult(outcome) => Ok(outcome),
            _ => Err(BridgeError::UnexpectedReply {
                command: "call_tool",
            }),
        }
    }

    pub async fn disconnect(&self) -> Result<(), BridgeError> {
        let request = HostRequest::DisconnectServer {
            connection_id: self.connection_id.clone(),
        };
        match self.dispatch.dispatch(request).await? {
            HostReply::Ack => Ok(()),
            _ => Err(BridgeError::UnexpectedReply {
                command: "disconnect_server",
            }),
        }
    }
}

impl fmt::Debug for McpServerClient {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("McpServerClient")
            .field("connection_id", &self.connection_id)
            .finish()
    }
}
