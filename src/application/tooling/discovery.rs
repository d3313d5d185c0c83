use super::client::McpServerClient;
use super::error::BridgeError;
use super::interface::{CommandDispatch, ToolDescriptor};
use crate::config::ServerConfig;
use desk_agent_log::Logger;
use std::sync::Arc;

/// Tools found on one configured server, or why they could not be listed.
#[derive(Debug)]
pub struct ServerDiscovery {
    pub connection_id: String,
    pub result: Result<Vec<ToolDescriptor>, BridgeError>,
}

/// Connects to each server in turn, lists its tools and disconnects again.
/// A failing server is reported and does not stop the others.
pub async fn discover_tools(
    servers: &[ServerConfig],
    dispatch: Arc<dyn CommandDispatch>,
    log: &Logger,
) -> Vec<ServerDiscovery> {
    let mut report = Vec::with_capacity(servers.len());
    for server in servers {
        let client = McpServerClient::new(server.id.clone(), dispatch.clone());
        let result = discover_one(&client, server, log).await;
        if let Err(err) = &result {
            log.error(format!("Error with MCP server {}: {err}", server.id));
        }
        report.push(ServerDiscovery {
            connection_id: server.id.clone(),
            result,
        });
    }
    report
}

async fn discover_one(
    client: &McpServerClient,
    server: &ServerConfig,
    log: &Logger,
) -> Result<Vec<ToolDescriptor>, BridgeError> {
    client.connect(&server.command, &server.args).await?;
    log.info(format!("Connected to MCP server: {}", server.id));

    let listed = client.list_tools().await;
    // Disconnect even when listing failed so the process is not leaked.
    let disconnected = client.disconnect().await;

    let tools = listed?;
    log.info(format!(
        "Available tools for {}: {}",
        server.id,
        tools
            .iter()
            .map(|tool| tool.name.as_str())
            .collect::<Vec<_>>()
            .join(", ")
    ));
    disconnected?;
    log.info(format!("Disconnected from MCP server: {}", server.id));
    Ok(tools)
}
