//! MCP protocol client
//!
//! Talks to an MCP server over one of three transports:
//! - sse: legacy HTTP+SSE (long-lived event stream plus POST endpoint)
//! - http: Streamable HTTP (one POST per message, optional session id)
//! - stdio: subprocess communication over newline-delimited JSON
//!
//! [`ProtocolClient`] is the seam the rest of the crate depends on; [`McpClient`]
//! is the real implementation on top of an [`RpcTransport`].

pub mod http;
pub mod jsonrpc;
pub mod sse;
pub mod stdio;

use crate::core::{
    InitializeResult, InvocationRequest, InvocationResult, PromptDescriptor, ResourceDescriptor,
    ResourceTemplateDescriptor, ServerCapabilities, ToolDescriptor,
};
use async_trait::async_trait;
use parking_lot::RwLock;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;
use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;
use std::time::Duration;
use thiserror::Error;
use tracing::{debug, info, warn};

/// Protocol version sent in the initialize request
pub const PROTOCOL_VERSION: &str = "2024-11-05";

/// Client name sent in the initialize request
pub const CLIENT_NAME: &str = "mcprobe";

/// Extra time the HTTP layer waits beyond the per-call timeout
pub const HTTP_TIMEOUT_SLACK: Duration = Duration::from_secs(30);

#[derive(Error, Debug)]
pub enum ClientError {
    #[error("Connection failed: {0}")]
    ConnectionFailed(String),

    #[error("Request failed: {0}")]
    RequestFailed(String),

    #[error("HTTP {status}: {body}")]
    Http { status: u16, body: String },

    #[error("Protocol error: {0}")]
    Protocol(String),

    #[error("Request timeout: {0}")]
    Timeout(String),

    #[error("Client not initialized: call initialize first")]
    NotInitialized,
}

pub type Result<T> = std::result::Result<T, ClientError>;

/// Transport type for the server connection
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TransportKind {
    #[default]
    Sse,
    Http,
    Stdio,
}

impl FromStr for TransportKind {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "sse" => Ok(TransportKind::Sse),
            "http" | "streamable-http" => Ok(TransportKind::Http),
            "stdio" => Ok(TransportKind::Stdio),
            _ => Err(format!(
                "Unsupported transport type '{}'. Use 'sse', 'http' or 'stdio'",
                s
            )),
        }
    }
}

impl fmt::Display for TransportKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TransportKind::Sse => write!(f, "sse"),
            TransportKind::Http => write!(f, "http"),
            TransportKind::Stdio => write!(f, "stdio"),
        }
    }
}

/// Everything needed to open a connection
#[derive(Debug, Clone)]
pub struct ClientConfig {
    pub transport: TransportKind,
    pub url: Option<String>,
    pub command: Option<Vec<String>>,
    pub headers: BTreeMap<String, String>,
    pub call_timeout: Duration,
}

impl ClientConfig {
    /// Timeout for individual HTTP requests
    pub fn http_timeout(&self) -> Duration {
        self.call_timeout + HTTP_TIMEOUT_SLACK
    }

    fn require_url(&self) -> Result<&str> {
        self.url
            .as_deref()
            .filter(|u| !u.is_empty())
            .ok_or_else(|| ClientError::ConnectionFailed("No URL specified".to_string()))
    }
}

/// Message-level transport: sends JSON-RPC and returns the `result` value
#[async_trait]
pub trait RpcTransport: Send + Sync {
    async fn request(&self, method: &str, params: Option<JsonValue>) -> Result<JsonValue>;

    async fn notify(&self, method: &str, params: Option<JsonValue>) -> Result<()>;

    /// Called once the protocol version has been negotiated
    fn set_protocol_version(&self, _version: &str) {}

    /// Where messages are posted, when the transport discovers it at runtime
    fn message_endpoint(&self) -> Option<String> {
        None
    }

    async fn close(&self) {}
}

/// Remote capabilities consumed by the rest of the crate.
///
/// Every method is a fallible remote operation; callers apply their own
/// timeout scopes around them.
#[async_trait]
pub trait ProtocolClient: Send + Sync {
    async fn initialize(&self) -> Result<InitializeResult>;

    /// Capabilities cached by [`ProtocolClient::initialize`]; empty before it
    fn server_capabilities(&self) -> ServerCapabilities;

    async fn list_tools(&self) -> Result<Vec<ToolDescriptor>>;

    async fn list_resources(&self) -> Result<Vec<ResourceDescriptor>>;

    async fn list_resource_templates(&self) -> Result<Vec<ResourceTemplateDescriptor>>;

    async fn list_prompts(&self) -> Result<Vec<PromptDescriptor>>;

    async fn call_tool(&self, request: &InvocationRequest) -> Result<InvocationResult>;

    async fn close(&self) {}
}

/// Open a transport for the given configuration.
///
/// For `sse` this waits for the server's `endpoint` event, so callers should
/// bound it with the connection timeout.
pub async fn connect(config: &ClientConfig) -> Result<McpClient> {
    let transport: Box<dyn RpcTransport> = match config.transport {
        TransportKind::Http => {
            let url = config.require_url()?;
            Box::new(http::HttpTransport::new(
                url,
                &config.headers,
                config.http_timeout(),
            )?)
        }
        TransportKind::Sse => {
            let url = config.require_url()?;
            let transport =
                sse::SseTransport::connect(url, &config.headers, config.http_timeout()).await?;
            Box::new(transport)
        }
        TransportKind::Stdio => {
            let command = config.command.as_deref().ok_or_else(|| {
                ClientError::ConnectionFailed("No command specified".to_string())
            })?;
            Box::new(stdio::StdioTransport::spawn(command)?)
        }
    };

    info!("Opened {} transport", config.transport);
    Ok(McpClient::new(transport))
}

/// MCP session over any [`RpcTransport`]
pub struct McpClient {
    transport: Box<dyn RpcTransport>,
    session: RwLock<Option<InitializeResult>>,
}

impl McpClient {
    pub fn new(transport: Box<dyn RpcTransport>) -> Self {
        McpClient {
            transport,
            session: RwLock::new(None),
        }
    }

    /// POST endpoint announced by an SSE server
    pub fn message_endpoint(&self) -> Option<String> {
        self.transport.message_endpoint()
    }

    /// Client side of the initialize handshake
    pub fn initialize_params() -> JsonValue {
        serde_json::json!({
            "protocolVersion": PROTOCOL_VERSION,
            "capabilities": {
                "roots": { "listChanged": true },
                "sampling": {}
            },
            "clientInfo": {
                "name": CLIENT_NAME,
                "version": env!("CARGO_PKG_VERSION")
            }
        })
    }

    fn ensure_initialized(&self) -> Result<()> {
        if self.session.read().is_none() {
            return Err(ClientError::NotInitialized);
        }
        Ok(())
    }

    /// Fetch every page of a list method and return the raw items
    async fn list_all(&self, method: &str, key: &str) -> Result<Vec<JsonValue>> {
        self.ensure_initialized()?;

        let mut items = Vec::new();
        let mut cursor: Option<String> = None;
        loop {
            let params = cursor.as_ref().map(|c| serde_json::json!({ "cursor": c }));
            let page = self.transport.request(method, params).await?;

            let page_items = page.get(key).and_then(|v| v.as_array()).ok_or_else(|| {
                ClientError::Protocol(format!("Invalid {} response: missing '{}'", method, key))
            })?;
            items.extend(page_items.iter().cloned());

            match page.get("nextCursor").and_then(|c| c.as_str()) {
                Some(next) if !next.is_empty() && cursor.as_deref() != Some(next) => {
                    debug!("{}: following cursor {}", method, next);
                    cursor = Some(next.to_string());
                }
                _ => break,
            }
        }

        debug!("{} returned {} items", method, items.len());
        Ok(items)
    }

    async fn list_typed<T: DeserializeOwned>(&self, method: &str, key: &str) -> Result<Vec<T>> {
        let raw = self.list_all(method, key).await?;
        let mut parsed = Vec::with_capacity(raw.len());
        for item in raw {
            match serde_json::from_value::<T>(item.clone()) {
                Ok(value) => parsed.push(value),
                Err(e) => warn!("Skipping malformed {} entry {}: {}", method, item, e),
            }
        }
        Ok(parsed)
    }
}

#[async_trait]
impl ProtocolClient for McpClient {
    async fn initialize(&self) -> Result<InitializeResult> {
        let response = self
            .transport
            .request("initialize", Some(Self::initialize_params()))
            .await?;

        let result: InitializeResult = serde_json::from_value(response).map_err(|e| {
            ClientError::Protocol(format!("Invalid initialize response: {}", e))
        })?;

        if !result.protocol_version.is_empty() {
            self.transport.set_protocol_version(&result.protocol_version);
        }

        self.transport
            .notify("notifications/initialized", None)
            .await?;

        info!(
            "Initialized session with {} (protocol {})",
            result.server_info, result.protocol_version
        );
        *self.session.write() = Some(result.clone());
        Ok(result)
    }

    fn server_capabilities(&self) -> ServerCapabilities {
        self.session
            .read()
            .as_ref()
            .map(|s| s.capabilities.clone())
            .unwrap_or_default()
    }

    async fn list_tools(&self) -> Result<Vec<ToolDescriptor>> {
        let raw = self.list_all("tools/list", "tools").await?;

        let mut tools = Vec::with_capacity(raw.len());
        for tool_value in raw {
            let name = tool_value
                .get("name")
                .and_then(|v| v.as_str())
                .ok_or_else(|| ClientError::Protocol("Tool missing name".to_string()))?
                .to_string();

            let description = tool_value
                .get("description")
                .and_then(|v| v.as_str())
                .unwrap_or_default()
                .to_string();

            let input_schema = tool_value
                .get("inputSchema")
                .cloned()
                .unwrap_or_else(|| serde_json::json!({"type": "object"}));

            tools.push(ToolDescriptor::new(name, description, input_schema));
        }

        Ok(tools)
    }

    async fn list_resources(&self) -> Result<Vec<ResourceDescriptor>> {
        self.list_typed("resources/list", "resources").await
    }

    async fn list_resource_templates(&self) -> Result<Vec<ResourceTemplateDescriptor>> {
        self.list_typed("resources/templates/list", "resourceTemplates")
            .await
    }

    async fn list_prompts(&self) -> Result<Vec<PromptDescriptor>> {
        self.list_typed("prompts/list", "prompts").await
    }

    async fn call_tool(&self, request: &InvocationRequest) -> Result<InvocationResult> {
        self.ensure_initialized()?;

        debug!("Calling tool {}", request.tool_name);
        let response = self
            .transport
            .request("tools/call", Some(request.to_params()))
            .await?;

        InvocationResult::from_value(&response).map_err(|e| ClientError::Protocol(e.to_string()))
    }

    async fn close(&self) {
        self.transport.close().await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use parking_lot::Mutex;
    use serde_json::json;
    use std::collections::VecDeque;

    /// Replays canned results and records what was sent
    struct ReplayTransport {
        replies: Mutex<VecDeque<JsonValue>>,
        sent: Mutex<Vec<(String, Option<JsonValue>)>>,
    }

    impl ReplayTransport {
        fn new(replies: Vec<JsonValue>) -> Self {
            ReplayTransport {
                replies: Mutex::new(replies.into()),
                sent: Mutex::new(Vec::new()),
            }
        }
    }

    #[async_trait]
    impl RpcTransport for std::sync::Arc<ReplayTransport> {
        async fn request(&self, method: &str, params: Option<JsonValue>) -> Result<JsonValue> {
            self.sent.lock().push((method.to_string(), params));
            self.replies
                .lock()
                .pop_front()
                .ok_or_else(|| ClientError::Protocol("no reply queued".to_string()))
        }

        async fn notify(&self, method: &str, params: Option<JsonValue>) -> Result<()> {
            self.sent.lock().push((method.to_string(), params));
            Ok(())
        }
    }

    fn init_reply() -> JsonValue {
        json!({
            "protocolVersion": "2024-11-05",
            "capabilities": {"tools": {"listChanged": true}},
            "serverInfo": {"name": "demo", "version": "1.2.3"}
        })
    }

    #[tokio::test]
    async fn test_requires_initialize() {
        let transport = std::sync::Arc::new(ReplayTransport::new(vec![]));
        let client = McpClient::new(Box::new(transport));
        assert!(matches!(
            client.list_tools().await,
            Err(ClientError::NotInitialized)
        ));
        assert!(!client.server_capabilities().supports_tools());
    }

    #[tokio::test]
    async fn test_initialize_then_paginated_tools() {
        let transport = std::sync::Arc::new(ReplayTransport::new(vec![
            init_reply(),
            json!({"tools": [{"name": "a"}], "nextCursor": "p2"}),
            json!({"tools": [{"name": "b", "description": "second"}]}),
        ]));
        let client = McpClient::new(Box::new(transport.clone()));

        let info = client.initialize().await.unwrap();
        assert_eq!(info.server_info.name, "demo");
        assert!(client.server_capabilities().supports_tools());

        let tools = client.list_tools().await.unwrap();
        let names: Vec<_> = tools.iter().map(|t| t.name.as_str()).collect();
        assert_eq!(names, vec!["a", "b"]);
        assert_eq!(tools[1].description, "second");

        let sent = transport.sent.lock();
        assert_eq!(sent[1].0, "notifications/initialized");
        assert_eq!(sent[3].1, Some(json!({"cursor": "p2"})));
    }

    #[tokio::test]
    async fn test_malformed_resources_are_skipped() {
        let transport = std::sync::Arc::new(ReplayTransport::new(vec![
            init_reply(),
            json!({"resources": [{"uri": "file:///a"}, {"name": "no uri"}]}),
        ]));
        let client = McpClient::new(Box::new(transport));
        client.initialize().await.unwrap();

        let resources = client.list_resources().await.unwrap();
        assert_eq!(resources.len(), 1);
        assert_eq!(resources[0].uri, "file:///a");
    }

    #[test]
    fn test_transport_kind_from_str() {
        assert_eq!("SSE".parse::<TransportKind>().unwrap(), TransportKind::Sse);
        assert_eq!("http".parse::<TransportKind>().unwrap(), TransportKind::Http);
        assert_eq!(
            "stdio".parse::<TransportKind>().unwrap(),
            TransportKind::Stdio
        );
        assert!("carrier-pigeon".parse::<TransportKind>().is_err());
    }
}
