use super::error::BridgeError;
use super::interface::{CommandDispatch, HostReply, HostRequest, ToolDescriptor, ToolOutcome};
use super::process::McpProcess;
use async_trait::async_trait;
use serde_json::{Map as JsonMap, Value};
use std::collections::HashMap;
use tokio::sync::Mutex as AsyncMutex;
use tracing::{debug, error, info};

/// Native side of the bridge: owns one MCP server process per connection id.
#[derive(Default)]
pub struct McpHost {
    clients: AsyncMutex<HashMap<String, Slot>>,
}

enum Slot {
    /// Reserved while the server is spawned and initialized.
    Connecting,
    Ready(McpProcess),
}

impl McpHost {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn connect_server(
        &self,
        connection_id: &str,
        command: &str,
        args: &[String],
    ) -> Result<(), BridgeError> {
        {
            let mut clients = self.clients.lock().await;
            if clients.contains_key(connection_id) {
                error!(connection = connection_id, "client already connected");
                return Err(BridgeError::AlreadyConnected {
                    connection_id: connection_id.to_string(),
                });
            }
            clients.insert(connection_id.to_string(), Slot::Connecting);
        }

        info!(connection = connection_id, command, ?args, "starting MCP server");
        let started = McpProcess::start(connection_id, command, args).await;

        let mut clients = self.clients.lock().await;
        match started {
            Ok(process) => {
                clients.insert(connection_id.to_string(), Slot::Ready(process));
                Ok(())
            }
            Err(err) => {
                clients.remove(connection_id);
                Err(err)
            }
        }
    }

    pub async fn list_tools(&self, connection_id: &str) -> Result<Vec<ToolDescriptor>, BridgeError> {
        let process = self.process(connection_id).await?;
        process.list_tools().await
    }

    pub async fn call_tool(
        &self,
        connection_id: &str,
        name: &str,
        args: Option<JsonMap<String, Value>>,
    ) -> Result<ToolOutcome, BridgeError> {
        info!(connection = connection_id, tool = name, ?args, "calling tool");
        let process = self.process(connection_id).await?;
        let outcome = process.call_tool(name, args).await?;
        debug!(connection = connection_id, tool = name, ?outcome, "tool result");
        Ok(outcome)
    }

    pub async fn disconnect_server(&self, connection_id: &str) -> Result<(), BridgeError> {
        let process = {
            let mut clients = self.clients.lock().await;
            if !matches!(clients.get(connection_id), Some(Slot::Ready(_))) {
                return Err(BridgeError::not_connected(connection_id));
            }
            match clients.remove(connection_id) {
                Some(Slot::Ready(process)) => process,
                _ => return Err(BridgeError::not_connected(connection_id)),
            }
        };
        process.shutdown().await;
        info!(connection = connection_id, "MCP server disconnected");
        Ok(())
    }

    /// Disconnects every server that finished connecting.
    pub async fn shutdown(&self) {
        let mut ready = Vec::new();
        {
            let mut clients = self.clients.lock().await;
            for (id, slot) in std::mem::take(&mut *clients) {
                match slot {
                    Slot::Ready(process) => ready.push((id, process)),
                    Slot::Connecting => {
                        clients.insert(id, Slot::Connecting);
                    }
                }
            }
        }
        for (connection_id, process) in ready {
            process.shutdown().await;
            debug!(connection = %connection_id, "MCP server stopped");
        }
    }

    /// Ids with a running, initialized server.
    pub async fn connection_ids(&self) -> Vec<String> {
        let mut ids: Vec<_> = self
            .clients
            .lock()
            .await
            .iter()
            .filter(|(_, slot)| matches!(slot, Slot::Ready(_)))
            .map(|(id, _)| id.clone())
            .collect();
        ids.sort();
        ids
    }

    async fn process(&self, connection_id: &str) -> Result<McpProcess, BridgeError> {
        match self.clients.lock().await.get(connection_id) {
            Some(Slot::Ready(process)) => Ok(process.clone()),
            _ => {
                error!(connection = connection_id, "client not connected");
                Err(BridgeError::not_connected(connection_id))
            }
        }
    }
}

#[async_trait]
impl CommandDispatch for McpHost {
    async fn dispatch(&self, request: HostRequest) -> Result<HostReply, BridgeError> {
        match request {
            HostRequest::ConnectServer {
                connection_id,
                command,
                args,
            } => self
                .connect_server(&connection_id, &command, &args)
                .await
                .map(|_| HostReply::Ack),
            HostRequest::ListTools { connection_id } => {
                self.list_tools(&connection_id).await.map(HostReply::Tools)
            }
            HostRequest::CallTool {
                connection_id,
                name,
                args,
            } => self
                .call_tool(&connection_id, &name, args)
                .await
                .map(HostReply::ToolResult),
            HostRequest::DisconnectServer { connection_id } => self
                .disconnect_server(&connection_id)
                .await
                .map(|_| HostReply::Ack),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    #[cfg(unix)]
    use crate::application::tooling::process::scripted_server;
    use serde_json::json;
    use std::sync::Arc;
    use std::time::Duration;
    use tokio::time::timeout;

    #[tokio::test]
    async fn unknown_connections_are_rejected() {
        let host = McpHost::new();

        let err = host.list_tools("missing").await.unwrap_err();
        assert_eq!(err.to_string(), "Client with id 'missing' not connected");

        let err = host.call_tool("missing", "fetch", None).await.unwrap_err();
        assert!(matches!(err, BridgeError::NotConnected { .. }));

        let err = host.disconnect_server("missing").await.unwrap_err();
        assert!(matches!(err, BridgeError::NotConnected { .. }));
    }

    #[tokio::test]
    async fn failed_spawn_binds_nothing() {
        let host = McpHost::new();
        let err = host
            .connect_server("broken", "/definitely/not/a/real/mcp-server", &[])
            .await
            .unwrap_err();
        assert!(matches!(err, BridgeError::Spawn { .. }));
        assert!(host.connection_ids().await.is_empty());

        // The id is free again after the failure.
        let err = host
            .connect_server("broken", "/definitely/not/a/real/mcp-server", &[])
            .await
            .unwrap_err();
        assert!(matches!(err, BridgeError::Spawn { .. }));
    }

    #[tokio::test]
    async fn shutdown_on_empty_host_is_a_no_op() {
        let host = McpHost::new();
        host.shutdown().await;
        assert!(host.connection_ids().await.is_empty());
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn slow_handshake_does_not_block_other_connections() {
        let host = Arc::new(McpHost::new());
        // `sleep` never answers `initialize`.
        let pending = {
            let host = Arc::clone(&host);
            tokio::spawn(async move {
                host.connect_server("slow", "sleep", &["5".to_string()])
                    .await
            })
        };
        tokio::time::sleep(Duration::from_millis(200)).await;

        let err = timeout(Duration::from_secs(1), host.list_tools("other"))
            .await
            .expect("list_tools is not blocked by the handshake")
            .unwrap_err();
        assert!(matches!(err, BridgeError::NotConnected { .. }));

        let err = timeout(
            Duration::from_secs(1),
            host.connect_server("slow", "sleep", &["5".to_string()]),
        )
        .await
        .expect("duplicate connect is rejected immediately")
        .unwrap_err();
        assert!(matches!(err, BridgeError::AlreadyConnected { .. }));

        let err = host.list_tools("slow").await.unwrap_err();
        assert!(matches!(err, BridgeError::NotConnected { .. }));
        assert!(host.connection_ids().await.is_empty());

        timeout(Duration::from_secs(1), host.shutdown())
            .await
            .expect("shutdown is not blocked by the handshake");
        pending.abort();
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn disconnect_fails_in_flight_calls() {
        let host = Arc::new(McpHost::new());
        let (command, args) = scripted_server("read -r line\nexec sleep 5\n");
        host.connect_server("busy", &command, &args)
            .await
            .expect("connect");

        let call = {
            let host = Arc::clone(&host);
            tokio::spawn(async move { host.call_tool("busy", "slow_tool", None).await })
        };
        tokio::time::sleep(Duration::from_millis(200)).await;

        host.disconnect_server("busy").await.expect("disconnect");
        let result = timeout(Duration::from_secs(1), call)
            .await
            .expect("call finishes after disconnect")
            .expect("task joined");
        assert!(matches!(result, Err(BridgeError::Terminated { .. })), "{result:?}");
        assert!(host.connection_ids().await.is_empty());
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn dispatch_drives_a_full_session() {
        let host = McpHost::new();
        let (command, args) = scripted_server(
            r#"read -r line
echo '{"jsonrpc":"2.0","id":"req-2","result":{"tools":[{"name":"calculate_bmi","inputSchema":{"type":"object"}}]}}'
read -r line
echo '{"jsonrpc":"2.0","id":"req-3","result":{"content":[{"type":"text","text":"22.86"}]}}'
exec sleep 5
"#,
        );

        let reply = host
            .dispatch(HostRequest::ConnectServer {
                connection_id: "bmi".into(),
                command,
                args,
            })
            .await
            .expect("connect");
        assert_eq!(reply, HostReply::Ack);
        assert_eq!(host.connection_ids().await, ["bmi"]);

        let reply = host
            .dispatch(HostRequest::ListTools {
                connection_id: "bmi".into(),
            })
            .await
            .expect("list");
        assert!(matches!(reply, HostReply::Tools(ref tools) if tools[0].name == "calculate_bmi"));

        let reply = host
            .dispatch(HostRequest::CallTool {
                connection_id: "bmi".into(),
                name: "calculate_bmi".into(),
                args: json!({ "height": 1.75, "weight": 70 }).as_object().cloned(),
            })
            .await
            .expect("call");
        let HostReply::ToolResult(outcome) = reply else {
            panic!("expected a tool result, got {reply:?}");
        };
        assert_eq!(outcome.into_text(), "22.86");

        let reply = host
            .dispatch(HostRequest::DisconnectServer {
                connection_id: "bmi".into(),
            })
            .await
            .expect("disconnect");
        assert_eq!(reply, HostReply::Ack);
        assert!(host.connection_ids().await.is_empty());
    }
}
