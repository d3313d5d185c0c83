mod error;
mod server;
mod store;

pub use error::ConfigError;
pub use server::ServerConfig;
pub use store::{ensure_env_loaded, ConfigFileReader, ConfigMap, ConfigSources, ConfigStore, FsConfigReader};

/// Provider API key
pub const API_KEY: &str = "apiKey";
/// Model name override
pub const MODEL_KEY: &str = "model";
/// OpenAI-compatible endpoint override
pub const BASE_URL_KEY: &str = "baseUrl";
/// Connection id → `{ command, args }` map of MCP servers
pub const MCP_SERVERS_KEY: &str = "mcpServers";
