//! Stdio transport
//!
//! Spawns the server as a child process and exchanges newline-delimited
//! JSON-RPC over its stdin/stdout. The child's stderr is passed through so
//! server logs stay visible while probing.

use super::jsonrpc::{
    reply_to_server_request, McpRequest, McpResponse, PendingRequests, RequestIds,
};
use super::{ClientError, Result, RpcTransport};
use async_trait::async_trait;
use parking_lot::Mutex;
use serde_json::Value as JsonValue;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::process::{Child, Command};
use tokio::sync::mpsc;
use tracing::{debug, warn};

pub struct StdioTransport {
    outgoing: mpsc::UnboundedSender<String>,
    ids: RequestIds,
    pending: PendingRequests,
    child: Mutex<Option<Child>>,
}

impl StdioTransport {
    /// Spawn `command[0]` with the remaining elements as arguments
    pub fn spawn(command: &[String]) -> Result<Self> {
        let (program, args) = command
            .split_first()
            .ok_or_else(|| ClientError::ConnectionFailed("Command list is empty".to_string()))?;

        debug!("Spawning stdio server: {:?}", command);
        let mut child = Command::new(program)
            .args(args)
            .stdin(std::process::Stdio::piped())
            .stdout(std::process::Stdio::piped())
            .stderr(std::process::Stdio::inherit())
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| {
                ClientError::ConnectionFailed(format!("Failed to spawn {}: {}", program, e))
            })?;

        let mut stdin = child
            .stdin
            .take()
            .ok_or_else(|| ClientError::ConnectionFailed("Failed to get stdin".to_string()))?;
        let stdout = child
            .stdout
            .take()
            .ok_or_else(|| ClientError::ConnectionFailed("Failed to get stdout".to_string()))?;

        let pending = PendingRequests::default();
        let (outgoing, mut outgoing_rx) = mpsc::unbounded_channel::<String>();

        // Writer: one JSON document per line
        let writer_pending = pending.clone();
        tokio::spawn(async move {
            while let Some(line) = outgoing_rx.recv().await {
                let written = async {
                    stdin.write_all(line.as_bytes()).await?;
                    stdin.write_all(b"\n").await?;
                    stdin.flush().await
                }
                .await;

                if let Err(e) = written {
                    warn!("Failed to write to server stdin: {}", e);
                    writer_pending.fail_all("Server stdin closed");
                    break;
                }
            }
            debug!("Stdin writer finished");
        });

        // Reader: route responses, answer server requests
        let reader_pending = pending.clone();
        let replies = outgoing.clone();
        tokio::spawn(async move {
            let mut lines = BufReader::new(stdout).lines();

            while let Ok(Some(line)) = lines.next_line().await {
                if line.trim().is_empty() {
                    continue;
                }

                match serde_json::from_str::<McpResponse>(&line) {
                    Ok(message) => {
                        if let Some(reply) = reply_to_server_request(&message) {
                            let _ = replies.send(reply.to_string());
                        } else {
                            reader_pending.route(message);
                        }
                    }
                    Err(e) => warn!("Failed to parse server output: {}", e),
                }
            }

            debug!("Stdout reader finished");
            reader_pending.fail_all("Server process exited");
        });

        Ok(StdioTransport {
            outgoing,
            ids: RequestIds::new(),
            pending,
            child: Mutex::new(Some(child)),
        })
    }

    fn send(&self, message: &McpRequest) -> Result<()> {
        let line = serde_json::to_string(message)
            .map_err(|e| ClientError::Protocol(format!("Failed to serialize request: {}", e)))?;
        self.outgoing
            .send(line)
            .map_err(|_| ClientError::ConnectionFailed("Server stdin closed".to_string()))
    }
}

#[async_trait]
impl RpcTransport for StdioTransport {
    async fn request(&self, method: &str, params: Option<JsonValue>) -> Result<JsonValue> {
        let id = self.ids.next();
        let (_guard, response_rx) = self.pending.register(id);

        debug!("-> {} ({})", method, id);
        self.send(&McpRequest::request(id, method, params))?;

        response_rx.await.map_err(|_| {
            ClientError::ConnectionFailed("Server exited before responding".to_string())
        })?
    }

    async fn notify(&self, method: &str, params: Option<JsonValue>) -> Result<()> {
        self.send(&McpRequest::notification(method, params))
    }

    async fn close(&self) {
        let child = self.child.lock().take();
        if let Some(mut child) = child {
            if let Err(e) = child.start_kill() {
                debug!("Failed to stop server process: {}", e);
            }
        }
    }
}
