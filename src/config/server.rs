use super::error::ConfigError;
use serde::Deserialize;
use serde_json::Value;

/// One entry of the `mcpServers` config object.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServerConfig {
    /// Key of the entry; doubles as the bridge connection id.
    pub id: String,
    pub command: String,
    pub args: Vec<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub(crate) struct RawServer {
    command: String,
    #[serde(default)]
    args: Vec<String>,
}

impl ServerConfig {
    pub(crate) fn from_raw(id: impl Into<String>, raw: RawServer) -> Self {
        let expand = |s: &str| -> String {
            shellexpand::full(s)
                .map(|cow| cow.into_owned())
                .unwrap_or_else(|_| s.to_string())
        };

        Self {
            id: id.into(),
            command: expand(&raw.command),
            args: raw.args.iter().map(|arg| expand(arg)).collect(),
        }
    }
}

/// Parses every entry of an `mcpServers` value. Valid entries are returned
/// sorted by id; invalid ones are reported separately.
pub(crate) fn parse_servers(value: &Value) -> Result<(Vec<ServerConfig>, Vec<ConfigError>), ConfigError> {
    let entries = value.as_object().ok_or(ConfigError::ServersNotAnObject)?;

    let mut servers = Vec::with_capacity(entries.len());
    let mut rejected = Vec::new();
    for (id, entry) in entries {
        match serde_json::from_value::<RawServer>(entry.clone()) {
            Ok(raw) => servers.push(ServerConfig::from_raw(id.clone(), raw)),
            Err(source) => rejected.push(ConfigError::InvalidServer {
                id: id.clone(),
                source,
            }),
        }
    }
    servers.sort_by(|a, b| a.id.cmp(&b.id));
    Ok((servers, rejected))
}
