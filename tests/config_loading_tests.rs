// Config loading tests - reading appconfig.json from disk
//
// Exercises the file-backed store against real files in a temp directory.

use desk_agent::config::{ConfigSources, ConfigStore, ServerConfig};
use desk_agent::LogSink;
use serde_json::json;
use std::fs;
use std::path::{Path, PathBuf};
use tempfile::tempdir;

fn write_config(dir: &Path, name: &str, content: &str) -> PathBuf {
    let path = dir.join(name);
    fs::write(&path, content).expect("Failed to write config");
    path
}

fn store(dev_mode: bool, dev_path: PathBuf, config_dir: Option<PathBuf>) -> ConfigStore {
    let sink = LogSink::new().with_console(false);
    ConfigStore::new(
        ConfigSources {
            dev_mode,
            dev_path,
            config_dir,
        },
        &sink,
    )
}

#[tokio::test]
async fn loads_platform_config_file() {
    let dir = tempdir().expect("tempdir");
    write_config(
        dir.path(),
        "appconfig.json",
        r#"{ "apiKey": "sk-from-file", "model": "gpt-4o", "retries": 3 }"#,
    );

    let store = store(false, dir.path().join("missing.json"), Some(dir.path().to_path_buf()));
    assert_eq!(store.api_key().await.as_deref(), Some("sk-from-file"));
    assert_eq!(store.model().await.as_deref(), Some("gpt-4o"));
    assert_eq!(store.get("retries", 0u32).await, 3);
    assert_eq!(store.get_all().await.len(), 3);
}

#[tokio::test]
async fn dev_file_is_preferred_in_dev_mode() {
    let dir = tempdir().expect("tempdir");
    let dev = write_config(dir.path(), "dev.appconfig.json", r#"{ "model": "dev" }"#);
    write_config(dir.path(), "appconfig.json", r#"{ "model": "prod" }"#);

    let store = store(true, dev, Some(dir.path().to_path_buf()));
    assert_eq!(store.model().await.as_deref(), Some("dev"));
}

#[tokio::test]
async fn broken_dev_file_falls_back_to_platform_file() {
    let dir = tempdir().expect("tempdir");
    let dev = write_config(dir.path(), "dev.appconfig.json", "{ trailing comma, }");
    write_config(dir.path(), "appconfig.json", r#"{ "model": "prod" }"#);

    let store = store(true, dev, Some(dir.path().to_path_buf()));
    assert_eq!(store.model().await.as_deref(), Some("prod"));
}

#[tokio::test]
async fn missing_files_leave_an_empty_config() {
    let dir = tempdir().expect("tempdir");
    let store = store(
        true,
        dir.path().join("nope.json"),
        Some(dir.path().join("also-missing")),
    );

    assert!(store.get_all().await.is_empty());
    assert_eq!(store.get("anything", "fallback".to_string()).await, "fallback");
    assert!(store.mcp_servers().await.is_empty());
}

#[tokio::test]
async fn config_is_read_once() {
    let dir = tempdir().expect("tempdir");
    let path = write_config(dir.path(), "appconfig.json", r#"{ "model": "first" }"#);

    let store = store(false, dir.path().join("unused.json"), Some(dir.path().to_path_buf()));
    assert_eq!(store.model().await.as_deref(), Some("first"));

    fs::write(&path, r#"{ "model": "second" }"#).expect("rewrite config");
    assert_eq!(store.model().await.as_deref(), Some("first"));
}

#[tokio::test]
async fn parses_mcp_servers() {
    let dir = tempdir().expect("tempdir");
    let doc = json!({
        "mcpServers": {
            "mcp-server-fetch": { "command": "uvx", "args": ["mcp-server-fetch"] },
            "bmi": {
                "command": "docker",
                "args": ["run", "-i", "--rm", "ghcr.io/oscarrenalias/mcp-server-bmi:latest"]
            },
            "no-args": { "command": "local-server" }
        }
    });
    write_config(dir.path(), "appconfig.json", &doc.to_string());

    let store = store(false, dir.path().join("unused.json"), Some(dir.path().to_path_buf()));
    let servers = store.mcp_servers().await;

    assert_eq!(
        servers,
        vec![
            ServerConfig {
                id: "bmi".into(),
                command: "docker".into(),
                args: vec![
                    "run".into(),
                    "-i".into(),
                    "--rm".into(),
                    "ghcr.io/oscarrenalias/mcp-server-bmi:latest".into()
                ],
            },
            ServerConfig {
                id: "mcp-server-fetch".into(),
                command: "uvx".into(),
                args: vec!["mcp-server-fetch".into()],
            },
            ServerConfig {
                id: "no-args".into(),
                command: "local-server".into(),
                args: Vec::new(),
            },
        ]
    );
}
