use super::errors::ToolError;
use crate::application::tooling::{CommandDispatch, McpServerClient, ToolDescriptor};
use crate::config::ServerConfig;
use crate::infrastructure::model::ToolSpec;
use async_trait::async_trait;
use desk_agent_log::Logger;
use serde::Deserialize;
use serde_json::{Value, json};
use std::fmt;
use std::sync::Arc;
use tokio::sync::{Mutex as AsyncMutex, OnceCell};
use tracing::{debug, info};

/// A callable the model may select by name.
#[async_trait]
pub trait Tool: Send + Sync {
    fn name(&self) -> &str;

    fn spec(&self) -> ToolSpec;

    /// Runs the tool and returns text for the model.
    async fn call(&self, arguments: Value) -> Result<String, ToolError>;
}

/// Canned weather lookup. It does not query any forecast service.
#[derive(Debug, Default, Clone, Copy)]
pub struct WeatherTool;

#[derive(Deserialize)]
struct WeatherArgs {
    query: String,
}

impl WeatherTool {
    pub const NAME: &'static str = "weather";

    pub fn forecast(query: &str) -> &'static str {
        let query = query.to_lowercase();
        if query.contains("hki") || query.contains("helsinki") {
            "It's 15 degrees and cloudy."
        } else {
            "It's 20 degrees and sunny."
        }
    }
}

#[async_trait]
impl Tool for WeatherTool {
    fn name(&self) -> &str {
        Self::NAME
    }

    fn spec(&self) -> ToolSpec {
        ToolSpec {
            name: Self::NAME.to_string(),
            description: "Call to get the current weather for a location.".to_string(),
            parameters: json!({
                "type": "object",
                "properties": {
                    "query": {
                        "type": "string",
                        "description": "The location to get the weather for."
                    }
                },
                "required": ["query"]
            }),
        }
    }

    async fn call(&self, arguments: Value) -> Result<String, ToolError> {
        let args: WeatherArgs =
            serde_json::from_value(arguments).map_err(|err| ToolError::InvalidArguments {
                tool: Self::NAME.to_string(),
                reason: err.to_string(),
            })?;
        Ok(Self::forecast(&args.query).to_string())
    }
}

/// Tools offered to the model for one invocation.
#[derive(Clone, Default)]
pub struct ToolSet {
    tools: Vec<Arc<dyn Tool>>,
}

impl ToolSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// The tools that are always available.
    pub fn builtin() -> Self {
        let mut set = Self::new();
        set.push(Arc::new(WeatherTool));
        set
    }

    pub fn push(&mut self, tool: Arc<dyn Tool>) {
        self.tools.push(tool);
    }

    pub fn extend(&mut self, tools: impl IntoIterator<Item = Arc<dyn Tool>>) {
        self.tools.extend(tools);
    }

    pub fn get(&self, name: &str) -> Option<&Arc<dyn Tool>> {
        self.tools.iter().find(|tool| tool.name() == name)
    }

    pub fn names(&self) -> Vec<String> {
        self.tools.iter().map(|tool| tool.name().to_string()).collect()
    }

    pub fn specs(&self) -> Vec<ToolSpec> {
        self.tools.iter().map(|tool| tool.spec()).collect()
    }

    pub fn len(&self) -> usize {
        self.tools.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tools.is_empty()
    }
}

impl fmt::Debug for ToolSet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_list().entries(self.names()).finish()
    }
}

/// Outcome of assembling the tool set for an invocation.
#[derive(Debug)]
pub enum ToolSetResult {
    Full(ToolSet),
    /// Remote discovery failed; only the built-in tools are offered.
    Degraded { tools: ToolSet, reason: String },
}

impl ToolSetResult {
    pub fn tools(&self) -> &ToolSet {
        match self {
            ToolSetResult::Full(tools) | ToolSetResult::Degraded { tools, .. } => tools,
        }
    }

    pub fn into_tools(self) -> ToolSet {
        match self {
            ToolSetResult::Full(tools) | ToolSetResult::Degraded { tools, .. } => tools,
        }
    }

    pub fn is_degraded(&self) -> bool {
        matches!(self, ToolSetResult::Degraded { .. })
    }
}

/// Name under which a server tool is offered to the model.
pub fn remote_tool_name(connection_id: &str, tool: &str) -> String {
    let sanitize = |value: &str| -> String {
        value
            .chars()
            .map(|ch| {
                if ch.is_ascii_alphanumeric() || ch == '_' || ch == '-' {
                    ch
                } else {
                    '_'
                }
            })
            .collect()
    };
    format!("mcp__{}__{}", sanitize(connection_id), sanitize(tool))
}

/// A tool living on an MCP server, forwarded through the bridge.
pub struct RemoteTool {
    exposed_name: String,
    descriptor: ToolDescriptor,
    client: McpServerClient,
}

impl RemoteTool {
    pub fn new(client: McpServerClient, descriptor: ToolDescriptor) -> Self {
        Self {
            exposed_name: remote_tool_name(client.connection_id(), &descriptor.name),
            descriptor,
            client,
        }
    }

    pub fn descriptor(&self) -> &ToolDescriptor {
        &self.descriptor
    }
}

#[async_trait]
impl Tool for RemoteTool {
    fn name(&self) -> &str {
        &self.exposed_name
    }

    fn spec(&self) -> ToolSpec {
        ToolSpec {
            name: self.exposed_name.clone(),
            description: self.descriptor.description.clone().unwrap_or_else(|| {
                format!(
                    "Tool '{}' on MCP server '{}'",
                    self.descriptor.name,
                    self.client.connection_id()
                )
            }),
            parameters: self.descriptor.input_schema.clone(),
        }
    }

    async fn call(&self, arguments: Value) -> Result<String, ToolError> {
        let args = match arguments {
            Value::Null => None,
            Value::Object(map) => Some(map),
            other => {
                return Err(ToolError::InvalidArguments {
                    tool: self.exposed_name.clone(),
                    reason: format!("expected a JSON object, got {other}"),
                });
            }
        };

        debug!(tool = %self.exposed_name, connection = self.client.connection_id(), "Dispatching tool via MCP");
        let outcome = self
            .client
            .call_tool(&self.descriptor.name, args)
            .await
            .map_err(|source| ToolError::Bridge {
                tool: self.exposed_name.clone(),
                source,
            })?;
        info!(tool = %self.exposed_name, success = outcome.is_success(), "Tool executed");
        Ok(outcome.into_text())
    }
}

struct Discovered {
    clients: Vec<McpServerClient>,
    result: Result<Vec<Arc<dyn Tool>>, String>,
}

/// Tools of every configured MCP server. Servers are connected on first use
/// and stay connected until [`RemoteTools::shutdown`].
pub struct RemoteTools {
    servers: Vec<ServerConfig>,
    dispatch: Arc<dyn CommandDispatch>,
    discovered: OnceCell<Discovered>,
    shutdown: AsyncMutex<bool>,
    log: Logger,
}

impl RemoteTools {
    pub fn new(servers: Vec<ServerConfig>, dispatch: Arc<dyn CommandDispatch>, log: Logger) -> Self {
        Self {
            servers,
            dispatch,
            discovered: OnceCell::new(),
            shutdown: AsyncMutex::new(false),
            log,
        }
    }

    pub fn servers(&self) -> &[ServerConfig] {
        &self.servers
    }

    /// Remote tools, or the reason discovery failed. Discovery runs once.
    pub async fn tools(&self) -> Result<Vec<Arc<dyn Tool>>, String> {
        let discovered = self.discovered.get_or_init(|| self.discover()).await;
        discovered.result.clone()
    }

    async fn discover(&self) -> Discovered {
        let mut clients = Vec::with_capacity(self.servers.len());
        let mut tools: Vec<Arc<dyn Tool>> = Vec::new();
        let mut failures = Vec::new();

        for server in &self.servers {
            let client = McpServerClient::new(server.id.clone(), self.dispatch.clone());
            if let Err(err) = client.connect(&server.command, &server.args).await {
                failures.push(format!("{}: {err}", server.id));
                continue;
            }
            clients.push(client.clone());

            match client.list_tools().await {
                Ok(descriptors) => {
                    self.log.info(format!(
                        "Loaded {} MCP tools from {}",
                        descriptors.len(),
                        server.id
                    ));
                    tools.extend(descriptors.into_iter().map(|descriptor| {
                        Arc::new(RemoteTool::new(client.clone(), descriptor)) as Arc<dyn Tool>
                    }));
                }
                Err(err) => failures.push(format!("{}: {err}", server.id)),
            }
        }

        let result = if failures.is_empty() {
            Ok(tools)
        } else {
            let reason = failures.join("; ");
            self.log.error(format!("Failed to load MCP tools: {reason}"));
            Err(reason)
        };
        Discovered { clients, result }
    }

    /// Disconnects every server connected during discovery.
    pub async fn shutdown(&self) {
        let mut done = self.shutdown.lock().await;
        if *done {
            return;
        }
        *done = true;

        let Some(discovered) = self.discovered.get() else {
            return;
        };
        for client in &discovered.clients {
            if let Err(err) = client.disconnect().await {
                self.log.warn(format!(
                    "Failed to disconnect MCP server {}: {err}",
                    client.connection_id()
                ));
            }
        }
        self.log.info("Closed MCP clients.");
    }
}

/// Built-in tools plus, when given, the remote ones.
pub async fn assemble_tool_set(remote: Option<&RemoteTools>) -> ToolSetResult {
    let mut tools = ToolSet::builtin();
    let Some(remote) = remote else {
        return ToolSetResult::Full(tools);
    };

    match remote.tools().await {
        Ok(found) => {
            tools.extend(found);
            ToolSetResult::Full(tools)
        }
        Err(reason) => ToolSetResult::Degraded { tools, reason },
    }
}

