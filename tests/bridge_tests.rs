// Bridge tests - McpServerClient against stub and native hosts

use async_trait::async_trait;
use desk_agent::tooling::{
    BridgeError, CommandDispatch, HostReply, HostRequest, McpHost, McpServerClient,
    discover_tools,
};
use desk_agent::{LogSink, ServerConfig};
use serde_json::json;
use std::collections::HashSet;
use std::sync::Arc;
use tokio::sync::Mutex;

/// Mimics the native host's bookkeeping without spawning anything.
#[derive(Default)]
struct StubHost {
    connected: Mutex<HashSet<String>>,
}

#[async_trait]
impl CommandDispatch for StubHost {
    async fn dispatch(&self, request: HostRequest) -> Result<HostReply, BridgeError> {
        let id = request.connection_id().to_string();
        let mut connected = self.connected.lock().await;
        match request {
            HostRequest::ConnectServer { command, .. } => {
                if command == "missing-binary" {
                    return Err(BridgeError::Spawn {
                        connection_id: id,
                        source: std::io::Error::new(std::io::ErrorKind::NotFound, "not found"),
                    });
                }
                if !connected.insert(id.clone()) {
                    return Err(BridgeError::AlreadyConnected { connection_id: id });
                }
                Ok(HostReply::Ack)
            }
            HostRequest::DisconnectServer { .. } => {
                if connected.remove(&id) {
                    Ok(HostReply::Ack)
                } else {
                    Err(BridgeError::not_connected(id))
                }
            }
            HostRequest::ListTools { .. } if connected.contains(&id) => {
                Ok(HostReply::Tools(Vec::new()))
            }
            HostRequest::CallTool { .. } if connected.contains(&id) => Ok(HostReply::ToolResult(
                desk_agent::tooling::ToolOutcome::Success(json!({ "content": [] })),
            )),
            _ => Err(BridgeError::not_connected(id)),
        }
    }
}

#[tokio::test]
async fn list_tools_before_connect_fails_with_stub_host() {
    let client = McpServerClient::new("test-conn", Arc::new(StubHost::default()));
    let err = client.list_tools().await.unwrap_err();
    assert_eq!(err.to_string(), "Client with id 'test-conn' not connected");
}

#[tokio::test]
async fn list_tools_before_connect_fails_with_native_host() {
    let client = McpServerClient::new("test-conn", Arc::new(McpHost::new()));
    let err = client.list_tools().await.unwrap_err();
    assert!(matches!(err, BridgeError::NotConnected { ref connection_id } if connection_id == "test-conn"));
    assert_eq!(err.to_string(), "Client with id 'test-conn' not connected");
}

#[tokio::test]
async fn second_connect_for_same_id_is_rejected() {
    let host: Arc<dyn CommandDispatch> = Arc::new(StubHost::default());
    let first = McpServerClient::new("dup", host.clone());
    let second = McpServerClient::new("dup", host);

    first.connect("server", &[]).await.unwrap();
    let err = second.connect("server", &[]).await.unwrap_err();
    assert!(matches!(err, BridgeError::AlreadyConnected { .. }));

    first.disconnect().await.unwrap();
    let err = second.disconnect().await.unwrap_err();
    assert!(matches!(err, BridgeError::NotConnected { .. }));
}

#[tokio::test]
async fn native_host_reports_spawn_failures() {
    let client = McpServerClient::new("ghost", Arc::new(McpHost::new()));
    let err = client
        .connect("/definitely/not/a/real/mcp-server", &["--stdio".to_string()])
        .await
        .unwrap_err();
    assert!(matches!(err, BridgeError::Spawn { .. }));
    // Nothing was bound, so the id is still unknown.
    assert!(matches!(
        client.disconnect().await.unwrap_err(),
        BridgeError::NotConnected { .. }
    ));
}

#[tokio::test]
async fn discovery_reports_each_server_independently() {
    let servers = vec![
        ServerConfig {
            id: "broken".into(),
            command: "missing-binary".into(),
            args: Vec::new(),
        },
        ServerConfig {
            id: "healthy".into(),
            command: "server".into(),
            args: Vec::new(),
        },
    ];
    let host = Arc::new(StubHost::default());
    let log = LogSink::new().with_console(false).logger("MCPDiscovery");

    let report = discover_tools(&servers, host.clone(), &log).await;

    assert_eq!(report.len(), 2);
    assert!(matches!(report[0].result, Err(BridgeError::Spawn { .. })));
    assert_eq!(report[1].connection_id, "healthy");
    assert!(report[1].result.as_ref().is_ok_and(|tools| tools.is_empty()));
    // Discovery disconnects what it connected.
    assert!(host.connected.lock().await.is_empty());
}
