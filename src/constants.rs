//! Application constants
//!
//! Single source of truth for paths and identifiers.

/// Directory name under the platform config directory
pub const APP_IDENTIFIER: &str = "com.desk-agent.app";

/// Development-mode config file, resolved against the working directory
pub const DEV_CONFIG_PATH: &str = "./dev.appconfig.json";

/// Config file name inside the platform config directory
pub const CONFIG_FILE_NAME: &str = "appconfig.json";

/// Environment variable consulted when the config has no API key
pub const API_KEY_ENV: &str = "OPENAI_API_KEY";

/// Default OpenAI-compatible endpoint
pub const DEFAULT_BASE_URL: &str = "https://api.openai.com";

/// MCP protocol revision announced during the handshake
pub const MCP_PROTOCOL_VERSION: &str = "2025-06-18";
