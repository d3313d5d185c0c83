use std::io;
use std::path::PathBuf;
use thiserror::Error;

/// Errors raised while reading the config document.
///
/// The store logs these and falls back; they never reach callers of
/// [`ConfigStore::get`](super::ConfigStore::get).
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config from {path:?}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("failed to parse config from {path:?}: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },

    #[error("config at {path:?} is not a JSON object")]
    NotAnObject { path: PathBuf },

    #[error("'mcpServers' must be a JSON object")]
    ServersNotAnObject,

    #[error("invalid MCP server entry '{id}': {source}")]
    InvalidServer {
        id: String,
        #[source]
        source: serde_json::Error,
    },
}
