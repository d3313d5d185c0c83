use super::error::ConfigError;
use super::server::{ServerConfig, parse_servers};
use super::{API_KEY, BASE_URL_KEY, MCP_SERVERS_KEY, MODEL_KEY};
use crate::constants::{API_KEY_ENV, CONFIG_FILE_NAME, DEV_CONFIG_PATH};
use async_trait::async_trait;
use desk_agent_log::{LogSink, Logger};
use serde::de::DeserializeOwned;
use serde_json::{Map, Value};
use std::fmt;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Once};
use tokio::sync::OnceCell;

/// Flat key/value document backing the store.
pub type ConfigMap = Map<String, Value>;

static ENV_LOADER: Once = Once::new();

/// Loads `.env` into the process environment once.
pub fn ensure_env_loaded() {
    ENV_LOADER.call_once(|| {
        let _ = dotenvy::dotenv();
    });
}

/// File access used by [`ConfigStore`].
#[async_trait]
pub trait ConfigFileReader: Send + Sync {
    async fn read_to_string(&self, path: &Path) -> io::Result<String>;
}

#[derive(Debug, Default, Clone, Copy)]
pub struct FsConfigReader;

#[async_trait]
impl ConfigFileReader for FsConfigReader {
    async fn read_to_string(&self, path: &Path) -> io::Result<String> {
        tokio::fs::read_to_string(path).await
    }
}

/// Where the store looks for its document.
#[derive(Debug, Clone)]
pub struct ConfigSources {
    pub dev_mode: bool,
    pub dev_path: PathBuf,
    /// Directory holding `appconfig.json`, already scoped to the app id.
    pub config_dir: Option<PathBuf>,
}

impl ConfigSources {
    /// Resolves the platform config directory for `app_id`.
    pub fn platform(app_id: &str, dev_mode: bool) -> Self {
        Self {
            dev_mode,
            dev_path: PathBuf::from(DEV_CONFIG_PATH),
            config_dir: dirs::config_dir().map(|dir| dir.join(app_id)),
        }
    }

    pub fn app_config_path(&self) -> Option<PathBuf> {
        self.config_dir
            .as_ref()
            .map(|dir| dir.join(CONFIG_FILE_NAME))
    }

    /// Candidate files in the order they are tried.
    fn candidates(&self) -> Vec<PathBuf> {
        let mut paths = Vec::with_capacity(2);
        if self.dev_mode {
            paths.push(self.dev_path.clone());
        }
        if let Some(path) = self.app_config_path() {
            paths.push(path);
        }
        paths
    }
}

/// Lazily loaded, read-only application configuration.
pub struct ConfigStore {
    sources: ConfigSources,
    reader: Arc<dyn ConfigFileReader>,
    cache: OnceCell<ConfigMap>,
    log: Logger,
}

impl ConfigStore {
    pub fn new(sources: ConfigSources, sink: &LogSink) -> Self {
        Self::with_reader(sources, Arc::new(FsConfigReader), sink)
    }

    pub fn with_reader(
        sources: ConfigSources,
        reader: Arc<dyn ConfigFileReader>,
        sink: &LogSink,
    ) -> Self {
        Self {
            sources,
            reader,
            cache: OnceCell::new(),
            log: sink.logger("AppConfig"),
        }
    }

    pub fn sources(&self) -> &ConfigSources {
        &self.sources
    }

    /// Loads the document if it has not been loaded yet. Concurrent callers
    /// share a single load.
    pub async fn load(&self) -> &ConfigMap {
        self.cache.get_or_init(|| self.load_uncached()).await
    }

    async fn load_uncached(&self) -> ConfigMap {
        for path in self.sources.candidates() {
            match self.read_document(&path).await {
                Ok(map) => {
                    self.log
                        .debug(format!("Loaded config from {}", path.display()));
                    return map;
                }
                Err(err) => self.log.debug(err.to_string()),
            }
        }
        self.log.debug("No config file found, using empty config");
        ConfigMap::new()
    }

    async fn read_document(&self, path: &Path) -> Result<ConfigMap, ConfigError> {
        let content =
            self.reader
                .read_to_string(path)
                .await
                .map_err(|source| ConfigError::Io {
                    path: path.to_path_buf(),
                    source,
                })?;

        let value: Value = serde_json::from_str(&content).map_err(|source| ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        })?;

        match value {
            Value::Object(map) => Ok(map),
            _ => Err(ConfigError::NotAnObject {
                path: path.to_path_buf(),
            }),
        }
    }

    pub async fn get_value(&self, key: &str) -> Option<Value> {
        self.load().await.get(key).cloned()
    }

    /// Returns the value for `key`, or `default` when it is absent or does not
    /// deserialize into `T`.
    pub async fn get<T: DeserializeOwned>(&self, key: &str, default: T) -> T {
        match self.load().await.get(key) {
            Some(value) => match serde_json::from_value(value.clone()) {
                Ok(parsed) => parsed,
                Err(err) => {
                    self.log
                        .debug(format!("Config key '{key}' has unexpected type: {err}"));
                    default
                }
            },
            None => default,
        }
    }

    pub async fn get_all(&self) -> ConfigMap {
        self.load().await.clone()
    }

    /// `apiKey` from the document, falling back to `OPENAI_API_KEY`.
    pub async fn api_key(&self) -> Option<String> {
        if let Some(key) = self.non_empty_string(API_KEY).await {
            return Some(key);
        }
        ensure_env_loaded();
        std::env::var(API_KEY_ENV)
            .ok()
            .filter(|key| !key.trim().is_empty())
    }

    pub async fn model(&self) -> Option<String> {
        self.non_empty_string(MODEL_KEY).await
    }

    pub async fn base_url(&self) -> Option<String> {
        self.non_empty_string(BASE_URL_KEY).await
    }

    /// Configured MCP servers sorted by id. Malformed entries are skipped.
    pub async fn mcp_servers(&self) -> Vec<ServerConfig> {
        let Some(value) = self.load().await.get(MCP_SERVERS_KEY) else {
            return Vec::new();
        };

        match parse_servers(value) {
            Ok((servers, rejected)) => {
                for err in rejected {
                    self.log.warn(format!("Skipping MCP server: {err}"));
                }
                servers
            }
            Err(err) => {
                self.log.warn(err.to_string());
                Vec::new()
            }
        }
    }

    async fn non_empty_string(&self, key: &str) -> Option<String> {
        self.get::<Option<String>>(key, None)
            .await
            .filter(|value| !value.trim().is_empty())
    }
}

impl fmt::Debug for ConfigStore {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ConfigStore")
            .field("sources", &self.sources)
            .field("loaded", &self.cache.initialized())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use std::collections::HashMap;
    use std::sync::Mutex;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[derive(Default)]
    struct CountingReader {
        files: Mutex<HashMap<PathBuf, String>>,
        reads: AtomicUsize,
    }

    impl CountingReader {
        fn with_file(self, path: &str, content: &str) -> Self {
            self.files
                .lock()
                .unwrap()
                .insert(PathBuf::from(path), content.to_string());
            self
        }

        fn reads(&self) -> usize {
            self.reads.load(Ordering::SeqCst)
        }
    }

    #[async_trait]
    impl ConfigFileReader for CountingReader {
        async fn read_to_string(&self, path: &Path) -> io::Result<String> {
            self.reads.fetch_add(1, Ordering::SeqCst);
            self.files
                .lock()
                .unwrap()
                .get(path)
                .cloned()
                .ok_or_else(|| io::Error::new(io::ErrorKind::NotFound, "missing"))
        }
    }

    fn sources(dev_mode: bool) -> ConfigSources {
        ConfigSources {
            dev_mode,
            dev_path: PathBuf::from("/dev/appconfig.json"),
            config_dir: Some(PathBuf::from("/cfg/com.desk-agent.app")),
        }
    }

    fn store(dev_mode: bool, reader: Arc<CountingReader>) -> ConfigStore {
        let sink = LogSink::new().with_console(false);
        ConfigStore::with_reader(sources(dev_mode), reader, &sink)
    }

    #[tokio::test]
    async fn dev_file_wins_in_dev_mode() {
        let reader = Arc::new(
            CountingReader::default()
                .with_file("/dev/appconfig.json", r#"{"model": "dev-model"}"#)
                .with_file(
                    "/cfg/com.desk-agent.app/appconfig.json",
                    r#"{"model": "user-model"}"#,
                ),
        );
        let store = store(true, reader);
        assert_eq!(store.model().await.as_deref(), Some("dev-model"));
    }

    #[tokio::test]
    async fn dev_file_is_ignored_outside_dev_mode() {
        let reader = Arc::new(
            CountingReader::default()
                .with_file("/dev/appconfig.json", r#"{"model": "dev-model"}"#)
                .with_file(
                    "/cfg/com.desk-agent.app/appconfig.json",
                    r#"{"model": "user-model"}"#,
                ),
        );
        let store = store(false, reader.clone());
        assert_eq!(store.model().await.as_deref(), Some("user-model"));
        assert_eq!(reader.reads(), 1);
    }

    #[tokio::test]
    async fn invalid_dev_file_falls_back_to_platform_file() {
        let reader = Arc::new(
            CountingReader::default()
                .with_file("/dev/appconfig.json", "{ not json")
                .with_file("/cfg/com.desk-agent.app/appconfig.json", r#"{"k": 1}"#),
        );
        let store = store(true, reader);
        assert_eq!(store.get("k", 0).await, 1);
    }

    #[tokio::test]
    async fn non_object_document_is_rejected() {
        let reader = Arc::new(
            CountingReader::default().with_file("/cfg/com.desk-agent.app/appconfig.json", "[1,2]"),
        );
        let store = store(false, reader);
        assert!(store.get_all().await.is_empty());
    }

    #[tokio::test]
    async fn missing_files_yield_defaults() {
        let reader = Arc::new(CountingReader::default());
        let store = store(true, reader);
        assert_eq!(store.get("answer", 42).await, 42);
        assert_eq!(store.get_value("answer").await, None);
        assert!(store.get_all().await.is_empty());
    }

    #[tokio::test]
    async fn load_reads_files_only_once() {
        let reader = Arc::new(
            CountingReader::default()
                .with_file("/dev/appconfig.json", r#"{"apiKey": "sk-test"}"#),
        );
        let store = store(true, reader.clone());

        store.load().await;
        store.load().await;
        let _ = store.get_value("apiKey").await;

        assert_eq!(reader.reads(), 1);
    }

    #[tokio::test]
    async fn concurrent_first_calls_share_one_load() {
        let reader = Arc::new(
            CountingReader::default()
                .with_file("/cfg/com.desk-agent.app/appconfig.json", r#"{"a": true}"#),
        );
        let store = Arc::new(store(false, reader.clone()));

        let handles: Vec<_> = (0..8)
            .map(|_| {
                let store = store.clone();
                tokio::spawn(async move { store.get("a", false).await })
            })
            .collect();
        for handle in handles {
            assert!(handle.await.unwrap());
        }
        assert_eq!(reader.reads(), 1);
    }

    #[tokio::test]
    async fn wrong_type_falls_back_to_default() {
        let reader = Arc::new(
            CountingReader::default()
                .with_file("/cfg/com.desk-agent.app/appconfig.json", r#"{"n": "seven"}"#),
        );
        let store = store(false, reader);
        assert_eq!(store.get("n", 7u32).await, 7);
    }

    #[tokio::test]
    async fn config_api_key_takes_precedence() {
        let reader = Arc::new(
            CountingReader::default()
                .with_file("/cfg/com.desk-agent.app/appconfig.json", r#"{"apiKey": "sk-file"}"#),
        );
        let store = store(false, reader);
        assert_eq!(store.api_key().await.as_deref(), Some("sk-file"));
    }

    #[tokio::test]
    async fn mcp_servers_skip_malformed_entries() {
        let doc = json!({
            "mcpServers": {
                "bmi": { "command": "docker", "args": ["run", "-i", "--rm", "bmi-server"] },
                "bad": 17
            }
        });
        let reader = Arc::new(
            CountingReader::default()
                .with_file("/cfg/com.desk-agent.app/appconfig.json", &doc.to_string()),
        );
        let store = store(false, reader);

        let servers = store.mcp_servers().await;
        assert_eq!(servers.len(), 1);
        assert_eq!(servers[0].id, "bmi");
        assert_eq!(servers[0].command, "docker");
    }

    #[test]
    fn platform_sources_scope_directory_to_app_id() {
        let sources = ConfigSources::platform("com.example.app", true);
        assert!(sources.dev_mode);
        assert_eq!(sources.dev_path, PathBuf::from(DEV_CONFIG_PATH));
        if let Some(path) = sources.app_config_path() {
            assert!(path.ends_with("com.example.app/appconfig.json"));
        }
    }
}
