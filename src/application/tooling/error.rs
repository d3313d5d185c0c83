use thiserror::Error;

#[derive(Debug, Error)]
pub enum BridgeError {
    #[error("Client with id '{connection_id}' not connected")]
    NotConnected { connection_id: String },
    #[error("Client with id '{connection_id}' already connected")]
    AlreadyConnected { connection_id: String },
    #[error("failed to spawn MCP server '{connection_id}': {source}")]
    Spawn {
        connection_id: String,
        #[source]
        source: std::io::Error,
    },
    #[error("MCP server '{connection_id}' transport error: {message}")]
    Transport {
        connection_id: String,
        message: String,
    },
    #[error("MCP server '{connection_id}' returned invalid JSON: {source}")]
    InvalidJson {
        connection_id: String,
        #[source]
        source: serde_json::Error,
    },
    #[error("MCP server '{connection_id}' returned JSON-RPC error {code}: {message}")]
    Rpc {
        connection_id: String,
        code: i64,
        message: String,
    },
    #[error("MCP server '{connection_id}' terminated unexpectedly")]
    Terminated { connection_id: String },
    #[error("MCP server '{connection_id}' request cancelled")]
    Cancelled { connection_id: String },
    #[error("host returned an unexpected reply to '{command}'")]
    UnexpectedReply { command: &'static str },
}

impl BridgeError {
    pub fn not_connected(connection_id: impl Into<String>) -> Self {
        Self::NotConnected {
            connection_id: connection_id.into(),
        }
    }
}
