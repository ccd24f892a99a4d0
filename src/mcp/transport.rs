use std::collections::HashMap;
use std::process::Stdio;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use serde_json::Value;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::process::{Child, ChildStdin, Command};
use tokio::sync::{oneshot, Mutex};
use tokio::task::JoinHandle;

use crate::mcp::types::{JsonRpcNotification, JsonRpcRequest, JsonRpcResponse, McpError};

type PendingMap = Arc<Mutex<HashMap<String, oneshot::Sender<JsonRpcResponse>>>>;

/// Newline-delimited JSON-RPC over the stdio of a child process.
pub struct StdioTransport {
    child: Mutex<Child>,
    stdin: Mutex<ChildStdin>,
    pending: PendingMap,
    next_id: AtomicU64,
    timeout: Duration,
    reader: Mutex<Option<JoinHandle<()>>>,
}

impl StdioTransport {
    pub async fn spawn(
        command: &str,
        args: &[String],
        timeout: Duration,
    ) -> Result<Self, McpError> {
        tracing::info!(command = %command, args = ?args, "spawning MCP server");
        let mut child = Command::new(command)
            .args(args)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(|source| McpError::Spawn {
                command: command.to_string(),
                source,
            })?;
        let stdin = child
            .stdin
            .take()
            .ok_or_else(|| McpError::Protocol("failed to capture stdin".to_string()))?;
        let stdout = child
            .stdout
            .take()
            .ok_or_else(|| McpError::Protocol("failed to capture stdout".to_string()))?;

        if let Some(stderr) = child.stderr.take() {
            tokio::spawn(async move {
                let mut lines = BufReader::new(stderr).lines();
                while let Ok(Some(line)) = lines.next_line().await {
                    let line = line.trim();
                    if !line.is_empty() {
                        tracing::debug!(stderr = %line, "MCP server stderr");
                    }
                }
            });
        }

        let pending: PendingMap = Arc::new(Mutex::new(HashMap::new()));
        let routed = Arc::clone(&pending);
        let reader = tokio::spawn(async move {
            let mut lines = BufReader::new(stdout).lines();
            loop {
                match lines.next_line().await {
                    Ok(Some(line)) => {
                        let line = line.trim();
                        if line.is_empty() {
                            continue;
                        }
                        match serde_json::from_str::<JsonRpcResponse>(line) {
                            Ok(resp) => {
                                let key = resp.id.to_string();
                                match routed.lock().await.remove(&key) {
                                    Some(tx) => {
                                        let _ = tx.send(resp);
                                    }
                                    None => {
                                        tracing::warn!(id = %key, "response for unknown request id")
                                    }
                                }
                            }
                            Err(e) => {
                                tracing::trace!(error = %e, line = %line, "ignoring non-response line")
                            }
                        }
                    }
                    Ok(None) => {
                        tracing::debug!("MCP server stdout closed");
                        break;
                    }
                    Err(e) => {
                        tracing::warn!(error = %e, "error reading MCP server stdout");
                        break;
                    }
                }
            }
            // dropping the senders wakes every waiter with a closed-channel error
            routed.lock().await.clear();
        });

        Ok(Self {
            child: Mutex::new(child),
            stdin: Mutex::new(stdin),
            pending,
            next_id: AtomicU64::new(1),
            timeout,
            reader: Mutex::new(Some(reader)),
        })
    }

    pub async fn request(&self, method: &str, params: Option<Value>) -> Result<Value, McpError> {
        self.request_with_timeout(method, params, self.timeout).await
    }

    /// Like `request`, with a one-off deadline in place of the transport default.
    pub async fn request_with_timeout(
        &self,
        method: &str,
        params: Option<Value>,
        timeout: Duration,
    ) -> Result<Value, McpError> {
        let id = self.next_id.fetch_add(1, Ordering::SeqCst);
        let req = JsonRpcRequest::new(id, method, params);
        let key = req.id.to_string();
        let (tx, rx) = oneshot::channel();
        self.pending.lock().await.insert(key.clone(), tx);

        let mut payload = serde_json::to_string(&req)?;
        payload.push('\n');
        tracing::trace!(method = %method, id, "client -> MCP server");
        if let Err(e) = self.write(payload.as_bytes()).await {
            self.pending.lock().await.remove(&key);
            return Err(e);
        }

        let resp = match tokio::time::timeout(timeout, rx).await {
            Ok(Ok(resp)) => resp,
            Ok(Err(_)) => {
                return Err(McpError::Closed {
                    method: method.to_string(),
                })
            }
            Err(_) => {
                self.pending.lock().await.remove(&key);
                return Err(McpError::Timeout {
                    method: method.to_string(),
                    timeout_ms: timeout.as_millis() as u64,
                });
            }
        };
        if let Some(err) = resp.error {
            return Err(McpError::Rpc {
                method: method.to_string(),
                code: err.code,
                message: err.message,
            });
        }
        Ok(resp.result.unwrap_or(Value::Null))
    }

    pub async fn notify(&self, method: &str, params: Option<Value>) -> Result<(), McpError> {
        let notif = JsonRpcNotification {
            jsonrpc: "2.0".to_string(),
            method: method.to_string(),
            params,
        };
        let mut payload = serde_json::to_string(&notif)?;
        payload.push('\n');
        self.write(payload.as_bytes()).await
    }

    pub async fn kill(&self) {
        if let Some(handle) = self.reader.lock().await.take() {
            handle.abort();
        }
        let _ = self.child.lock().await.kill().await;
    }

    async fn write(&self, bytes: &[u8]) -> Result<(), McpError> {
        let mut stdin = self.stdin.lock().await;
        stdin.write_all(bytes).await?;
        stdin.flush().await?;
        Ok(())
    }
}
