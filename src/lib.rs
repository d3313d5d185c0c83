pub mod application;
pub mod cli;
pub mod config;
pub mod constants;
pub mod domain;
pub mod infrastructure;

pub use application::{agent, chat, conversation, tooling};
pub use cli::{Cli, Command};
pub use config::{ConfigSources, ConfigStore, ServerConfig};
pub use desk_agent_log::{LogLevel, LogRecord, LogSink, Logger, init_tracing};
pub use domain::types;
pub use infrastructure::model;

use agent::{Agent, AgentSettings, RemoteTools};
use constants::APP_IDENTIFIER;
use model::OpenAiModelFactory;
use std::error::Error;
use std::sync::Arc;
use tooling::{McpHost, discover_tools};
use tracing::{debug, info};

pub async fn run(cli: Cli) -> Result<(), Box<dyn Error>> {
    init_tracing(cli.quiet);
    let sink = LogSink::new().with_console(!cli.quiet);
    info!("Starting desk-agent");
    debug!(dev = cli.dev, command = ?cli.command, "CLI arguments parsed");

    let config = Arc::new(ConfigStore::new(
        ConfigSources::platform(APP_IDENTIFIER, cli.dev),
        &sink,
    ));
    let host = Arc::new(McpHost::new());

    let outcome = match cli.command.clone().unwrap_or_default() {
        Command::Discover => discover(&config, host.clone(), &sink).await,
        Command::Chat {
            remote_tools,
            no_stream,
        } => chat_session(&config, host.clone(), &sink, remote_tools, !no_stream).await,
    };

    host.shutdown().await;
    info!("desk-agent finished");
    outcome
}

async fn discover(
    config: &ConfigStore,
    host: Arc<McpHost>,
    sink: &LogSink,
) -> Result<(), Box<dyn Error>> {
    let log = sink.logger("MCPDiscovery");
    let servers = config.mcp_servers().await;
    if servers.is_empty() {
        log.warn("No MCP servers configured under 'mcpServers'");
        return Ok(());
    }

    for entry in discover_tools(&servers, host, &log).await {
        match entry.result {
            Ok(tools) => {
                println!("{} ({} tools)", entry.connection_id, tools.len());
                for tool in tools {
                    println!(
                        "  {}: {}",
                        tool.name,
                        tool.description.unwrap_or_default()
                    );
                }
            }
            Err(err) => println!("{} (error: {err})", entry.connection_id),
        }
    }
    Ok(())
}

async fn chat_session(
    config: &Arc<ConfigStore>,
    host: Arc<McpHost>,
    sink: &LogSink,
    remote_tools: bool,
    stream: bool,
) -> Result<(), Box<dyn Error>> {
    let settings = AgentSettings::default().with_remote_tools(remote_tools);
    let factory = Arc::new(OpenAiModelFactory::new(Arc::clone(config)));
    let mut agent = Agent::new(settings, factory, sink);

    let remote = if remote_tools {
        let servers = config.mcp_servers().await;
        let remote = Arc::new(RemoteTools::new(servers, host, sink.logger("MCPClient")));
        agent = agent.with_remote_tools(Arc::clone(&remote));
        Some(remote)
    } else {
        None
    };

    let result = chat::run(Arc::new(agent), stream).await;
    if let Some(remote) = remote {
        remote.shutdown().await;
    }
    result?;
    Ok(())
}
