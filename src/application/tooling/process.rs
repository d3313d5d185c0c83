use super::error::BridgeError;
use super::interface::{ToolDescriptor, ToolOutcome};
use crate::constants::MCP_PROTOCOL_VERSION;
use serde::Deserialize;
use serde_json::{Map as JsonMap, Value, json};
use std::collections::HashMap;
use std::process::Stdio;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader, BufWriter};
use tokio::process::{Child, ChildStdin, ChildStdout, Command};
use tokio::sync::{Mutex as AsyncMutex, oneshot};
use tracing::{debug, warn};

type Responder = oneshot::Sender<Result<Value, BridgeError>>;

/// A running MCP server speaking newline-delimited JSON-RPC over stdio.
#[derive(Clone)]
pub struct McpProcess {
    inner: Arc<McpProcessInner>,
}

struct McpProcessInner {
    connection_id: String,
    child: AsyncMutex<Option<Child>>,
    writer: AsyncMutex<Option<BufWriter<ChildStdin>>>,
    pending: AsyncMutex<HashMap<String, Responder>>,
    id_counter: AtomicU64,
}

impl McpProcess {
    /// Spawns `command args` and completes the MCP handshake. The process is
    /// killed again when the handshake fails.
    pub async fn start(
        connection_id: &str,
        command: &str,
        args: &[String],
    ) -> Result<Self, BridgeError> {
        let inner = Arc::new(McpProcessInner {
            connection_id: connection_id.to_string(),
            child: AsyncMutex::new(None),
            writer: AsyncMutex::new(None),
            pending: AsyncMutex::new(HashMap::new()),
            id_counter: AtomicU64::new(1),
        });
        inner.spawn(command, args).await?;

        if let Err(err) = inner.initialize_sequence().await {
            inner.reset().await;
            return Err(err);
        }
        Ok(Self { inner })
    }

    pub fn connection_id(&self) -> &str {
        &self.inner.connection_id
    }

    /// Fetches the current tool catalogue from the server.
    pub async fn list_tools(&self) -> Result<Vec<ToolDescriptor>, BridgeError> {
        let result = self.inner.send_request("tools/list", json!({})).await?;
        Ok(result
            .get("tools")
            .and_then(Value::as_array)
            .map(|array| array.iter().filter_map(ToolDescriptor::from_listing).collect())
            .unwrap_or_default())
    }

    pub async fn call_tool(
        &self,
        name: &str,
        arguments: Option<JsonMap<String, Value>>,
    ) -> Result<ToolOutcome, BridgeError> {
        let params = json!({
            "name": name,
            "arguments": Value::Object(arguments.unwrap_or_default()),
        });
        let result = self.inner.send_request("tools/call", params).await?;
        Ok(ToolOutcome::from_call_result(result))
    }

    /// Kills the server and fails every in-flight request.
    pub async fn shutdown(&self) {
        self.inner.reset().await;
    }
}

impl McpProcessInner {
    async fn spawn(self: &Arc<Self>, command: &str, args: &[String]) -> Result<(), BridgeError> {
        let mut child = Command::new(command)
            .args(args)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::inherit())
            .kill_on_drop(true)
            .spawn()
            .map_err(|source| BridgeError::Spawn {
                connection_id: self.connection_id.clone(),
                source,
            })?;

        let stdin = child
            .stdin
            .take()
            .ok_or_else(|| self.transport_error("failed to capture server stdin"))?;
        let stdout = child
            .stdout
            .take()
            .ok_or_else(|| self.transport_error("failed to capture server stdout"))?;

        *self.writer.lock().await = Some(BufWriter::new(stdin));
        *self.child.lock().await = Some(child);

        let reader_self = Arc::clone(self);
        tokio::spawn(async move {
            reader_self.reader_loop(stdout).await;
        });
        Ok(())
    }

    async fn initialize_sequence(&self) -> Result<(), BridgeError> {
        let params = json!({
            "protocolVersion": MCP_PROTOCOL_VERSION,
            "clientInfo": {
                "name": env!("CARGO_PKG_NAME"),
                "version": env!("CARGO_PKG_VERSION"),
            },
            "capabilities": {}
        });
        self.send_request("initialize", params).await?;
        self.send_notification("notifications/initialized", json!({}))
            .await?;
        debug!(connection = %self.connection_id, "MCP handshake complete");
        Ok(())
    }

    async fn reader_loop(self: Arc<Self>, stdout: ChildStdout) {
        let mut segments = BufReader::new(stdout).split(b'\n');
        loop {
            let bytes = match segments.next_segment().await {
                Ok(Some(bytes)) => bytes,
                Ok(None) => break,
                Err(err) => {
                    warn!(connection = %self.connection_id, %err, "failed to read from MCP server");
                    break;
                }
            };
            // Servers sometimes log binary junk; it fails JSON parsing below.
            let raw = String::from_utf8_lossy(&bytes);
            let trimmed = raw.trim();
            if trimmed.is_empty() {
                continue;
            }
            if trimmed.starts_with('\u{1b}') {
                debug!(
                    connection = %self.connection_id,
                    line = trimmed,
                    "skipping ANSI log line from MCP server"
                );
                continue;
            }
            match serde_json::from_str::<Value>(trimmed) {
                Ok(value) => {
                    if let Err(err) = self.process_inbound_message(value).await {
                        warn!(
                            connection = %self.connection_id,
                            %err,
                            "failed to process message from MCP server"
                        );
                    }
                }
                Err(source) => {
                    debug!(
                        connection = %self.connection_id,
                        line = trimmed,
                        %source,
                        "ignoring non-JSON line from MCP server"
                    );
                }
            }
        }

        self.reset().await;
    }

    async fn process_inbound_message(&self, value: Value) -> Result<(), BridgeError> {
        match (value.get("id").cloned(), value.get("method").is_some()) {
            (Some(id), true) => self.handle_server_request(id, value).await,
            (Some(id), false) => {
                self.handle_response(id, value).await;
                Ok(())
            }
            (None, true) => {
                let method = value.get("method").and_then(Value::as_str).unwrap_or_default();
                debug!(connection = %self.connection_id, method, "received notification from server");
                Ok(())
            }
            (None, false) => Ok(()),
        }
    }

    async fn handle_response(&self, id: Value, value: Value) {
        let Some(key) = response_key(&id) else {
            return;
        };

        let responder = self.pending.lock().await.remove(&key);
        let Some(sender) = responder else {
            debug!(
                connection = %self.connection_id,
                response_id = key,
                "received response for unknown request"
            );
            return;
        };

        let reply = match value.get("error") {
            Some(error) => Err(BridgeError::Rpc {
                connection_id: self.connection_id.clone(),
                code: error.get("code").and_then(Value::as_i64).unwrap_or(-32000),
                message: error
                    .get("message")
                    .and_then(Value::as_str)
                    .unwrap_or("unknown error")
                    .to_string(),
            }),
            None => Ok(value.get("result").cloned().unwrap_or(Value::Null)),
        };
        let _ = sender.send(reply);
    }

    async fn handle_server_request(&self, id: Value, value: Value) -> Result<(), BridgeError> {
        let method = value
            .get("method")
            .and_then(Value::as_str)
            .unwrap_or_default();
        match method {
            "ping" => self.send_response(id, json!({})).await,
            "elicitation/create" => {
                let params = value.get("params").cloned().unwrap_or(Value::Null);
                self.send_response(id, elicitation_ack(params)).await
            }
            other => {
                warn!(
                    connection = %self.connection_id,
                    method = other,
                    "server sent unsupported request"
                );
                let error = json!({
                    "code": -32601,
                    "message": format!("client does not implement method '{other}'"),
                });
                self.send_error(id, error).await
            }
        }
    }

    async fn send_request(&self, method: &str, params: Value) -> Result<Value, BridgeError> {
        let id = self.next_id();
        let (tx, rx) = oneshot::channel();
        self.pending.lock().await.insert(id.clone(), tx);

        let payload = json!({
            "jsonrpc": "2.0",
            "id": id,
            "method": method,
            "params": params
        });
        if let Err(err) = self.write_message(&payload).await {
            self.pending.lock().await.remove(&id);
            return Err(err);
        }

        match rx.await {
            Ok(reply) => reply,
            Err(_) => Err(BridgeError::Cancelled {
                connection_id: self.connection_id.clone(),
            }),
        }
    }

    async fn send_notification(&self, method: &str, params: Value) -> Result<(), BridgeError> {
        let payload = json!({
            "jsonrpc": "2.0",
            "method": method,
            "params": params
        });
        self.write_message(&payload).await
    }

    async fn send_response(&self, id: Value, result: Value) -> Result<(), BridgeError> {
        let payload = json!({ "jsonrpc": "2.0", "id": id, "result": result });
        self.write_message(&payload).await
    }

    async fn send_error(&self, id: Value, error: Value) -> Result<(), BridgeError> {
        let payload = json!({ "jsonrpc": "2.0", "id": id, "error": error });
        self.write_message(&payload).await
    }

    async fn write_message(&self, message: &Value) -> Result<(), BridgeError> {
        let mut encoded =
            serde_json::to_string(message).map_err(|source| BridgeError::InvalidJson {
                connection_id: self.connection_id.clone(),
                source,
            })?;
        encoded.push('\n');

        let mut writer = self.writer.lock().await;
        let stream = writer.as_mut().ok_or_else(|| BridgeError::Terminated {
            connection_id: self.connection_id.clone(),
        })?;
        stream
            .write_all(encoded.as_bytes())
            .await
            .map_err(|source| self.transport_error(source.to_string()))?;
        stream
            .flush()
            .await
            .map_err(|source| self.transport_error(source.to_string()))?;
        Ok(())
    }

    async fn reset(&self) {
        self.writer.lock().await.take();

        let child = self.child.lock().await.take();
        if let Some(mut child) = child {
            if let Err(err) = child.kill().await {
                debug!(
                    connection = %self.connection_id,
                    %err,
                    "failed to kill MCP server process (may have already exited)"
                );
            }
        }

        self.fail_all_pending().await;
    }

    async fn fail_all_pending(&self) {
        let mut pending = self.pending.lock().await;
        for (_, sender) in pending.drain() {
            let _ = sender.send(Err(BridgeError::Terminated {
                connection_id: self.connection_id.clone(),
            }));
        }
    }

    fn next_id(&self) -> String {
        let id = self.id_counter.fetch_add(1, Ordering::SeqCst);
        format!("req-{id}")
    }

    fn transport_error(&self, message: impl Into<String>) -> BridgeError {
        BridgeError::Transport {
            connection_id: self.connection_id.clone(),
            message: message.into(),
        }
    }
}

fn response_key(id: &Value) -> Option<String> {
    match id {
        Value::String(value) => Some(value.clone()),
        Value::Number(num) => Some(num.to_string()),
        _ => None,
    }
}

#[derive(Debug, Deserialize, Default)]
struct ElicitationCreateParams {
    #[serde(default)]
    message: Option<String>,
}

fn elicitation_ack(params: Value) -> Value {
    let parsed: ElicitationCreateParams = serde_json::from_value(params).unwrap_or_default();

    let mut content = JsonMap::new();
    if let Some(message) = parsed.message.as_deref().map(str::trim) {
        if !message.is_empty() {
            content.insert("message".to_string(), Value::String(message.to_string()));
        }
    }
    json!({ "action": "accept", "content": content })
}

/// Builds an `sh -c` MCP server that answers `initialize`, swallows
/// `notifications/initialized` and then runs `body`. Client request ids are
/// `req-1` (initialize), `req-2`, `req-3` and so on.
#[cfg(all(test, unix))]
pub(super) fn scripted_server(body: &str) -> (String, Vec<String>) {
    const HANDSHAKE: &str = r#"read -r line
echo '{"jsonrpc":"2.0","id":"req-1","result":{"protocolVersion":"2025-06-18","capabilities":{"tools":{}},"serverInfo":{"name":"scripted","version":"0"}}}'
read -r line
"#;
    ("sh".to_string(), vec!["-c".to_string(), format!("{HANDSHAKE}{body}")])
}
