//! JSON-RPC 2.0 framing shared by all transports

use super::{ClientError, Result};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tokio::sync::oneshot;
use tracing::debug;

/// Outgoing request or notification (notifications carry no id)
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct McpRequest {
    pub jsonrpc: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub id: Option<u64>,
    pub method: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub params: Option<JsonValue>,
}

impl McpRequest {
    pub fn request(id: u64, method: &str, params: Option<JsonValue>) -> Self {
        McpRequest {
            jsonrpc: "2.0".to_string(),
            id: Some(id),
            method: method.to_string(),
            params,
        }
    }

    pub fn notification(method: &str, params: Option<JsonValue>) -> Self {
        McpRequest {
            jsonrpc: "2.0".to_string(),
            id: None,
            method: method.to_string(),
            params,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RpcErrorObject {
    #[serde(default)]
    pub code: i64,
    #[serde(default)]
    pub message: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<JsonValue>,
}

/// Incoming message. Server-initiated requests and notifications also parse
/// into this shape; they are recognised by a missing `result`/`error`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct McpResponse {
    #[serde(default)]
    pub jsonrpc: String,
    #[serde(default)]
    pub id: JsonValue,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub method: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub result: Option<JsonValue>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<RpcErrorObject>,
}

impl McpResponse {
    /// Numeric id of a response, if this message is one
    pub fn response_id(&self) -> Option<u64> {
        if self.method.is_some() {
            return None;
        }
        match &self.id {
            JsonValue::Number(n) => n.as_u64(),
            JsonValue::String(s) => s.parse().ok(),
            _ => None,
        }
    }

    pub fn into_result(self) -> Result<JsonValue> {
        if let Some(error) = self.error {
            let mut message = format!("MCP error {}: {}", error.code, error.message);
            if let Some(data) = error.data {
                message.push_str(&format!(" ({})", data));
            }
            return Err(ClientError::RequestFailed(message));
        }
        self.result
            .ok_or_else(|| ClientError::Protocol("Response has no result or error".to_string()))
    }
}

/// Monotonic request id source, one per transport
#[derive(Debug)]
pub struct RequestIds(AtomicU64);

impl RequestIds {
    pub fn new() -> Self {
        RequestIds(AtomicU64::new(1))
    }

    pub fn next(&self) -> u64 {
        self.0.fetch_add(1, Ordering::Relaxed)
    }
}

impl Default for RequestIds {
    fn default() -> Self {
        Self::new()
    }
}

/// Answer a request the server sent to us.
///
/// We advertise `roots` and `sampling`, so `roots/list` gets an empty list and
/// `ping` an empty result; anything else is refused. Returns `None` for
/// messages that are not server requests.
pub fn reply_to_server_request(message: &McpResponse) -> Option<JsonValue> {
    let method = message.method.as_deref()?;
    if message.id.is_null() {
        // notification, nothing to answer
        return None;
    }

    let reply = match method {
        "ping" => serde_json::json!({"jsonrpc": "2.0", "id": message.id, "result": {}}),
        "roots/list" => {
            serde_json::json!({"jsonrpc": "2.0", "id": message.id, "result": {"roots": []}})
        }
        other => serde_json::json!({
            "jsonrpc": "2.0",
            "id": message.id,
            "error": {
                "code": -32601,
                "message": format!("Method not supported by client: {}", other)
            }
        }),
    };
    Some(reply)
}

type ResponseSender = oneshot::Sender<Result<JsonValue>>;

/// Requests waiting for a response, keyed by id
#[derive(Clone, Default)]
pub struct PendingRequests {
    inner: Arc<Mutex<HashMap<u64, ResponseSender>>>,
}

impl PendingRequests {
    /// Track a request. The entry is dropped with the guard, so an abandoned
    /// call (e.g. timed out) does not leak.
    pub fn register(&self, id: u64) -> (PendingGuard, oneshot::Receiver<Result<JsonValue>>) {
        let (tx, rx) = oneshot::channel();
        self.inner.lock().insert(id, tx);
        let guard = PendingGuard {
            id,
            inner: self.inner.clone(),
        };
        (guard, rx)
    }

    /// Deliver a response to its waiting request. Returns false when nobody waits.
    pub fn route(&self, message: McpResponse) -> bool {
        let Some(id) = message.response_id() else {
            debug!("Ignoring server message {:?}", message.method);
            return false;
        };

        let sender = self.inner.lock().remove(&id);
        match sender {
            Some(sender) => {
                let _ = sender.send(message.into_result());
                true
            }
            None => {
                debug!("No pending request for response id {}", id);
                false
            }
        }
    }

    /// Fail every waiting request, e.g. when the stream closes
    pub fn fail_all(&self, reason: &str) {
        let drained: Vec<_> = self.inner.lock().drain().collect();
        for (_, sender) in drained {
            let _ = sender.send(Err(ClientError::ConnectionFailed(reason.to_string())));
        }
    }

    pub fn len(&self) -> usize {
        self.inner.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

pub struct PendingGuard {
    id: u64,
    inner: Arc<Mutex<HashMap<u64, ResponseSender>>>,
}

impl Drop for PendingGuard {
    fn drop(&mut self) {
        self.inner.lock().remove(&self.id);
    }
}
