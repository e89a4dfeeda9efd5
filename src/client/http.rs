//! Streamable HTTP transport
//!
//! Every JSON-RPC message is POSTed to the server URL. The server answers
//! either with a JSON body or with an event stream carrying the response.
//! A session id handed out by the server is echoed on every later request.

use super::jsonrpc::{reply_to_server_request, McpRequest, McpResponse, RequestIds};
use super::sse::SseParser;
use super::{ClientError, Result, RpcTransport};
use async_trait::async_trait;
use futures::StreamExt;
use parking_lot::Mutex;
use reqwest::header::{HeaderMap, HeaderName, HeaderValue, ACCEPT, CONTENT_TYPE};
use reqwest::StatusCode;
use serde_json::Value as JsonValue;
use std::collections::BTreeMap;
use std::time::Duration;
use tracing::{debug, warn};

pub const SESSION_HEADER: &str = "mcp-session-id";
pub const PROTOCOL_VERSION_HEADER: &str = "mcp-protocol-version";

/// Convert user-supplied headers into a reqwest header map
pub(crate) fn header_map(headers: &BTreeMap<String, String>) -> Result<HeaderMap> {
    let mut map = HeaderMap::new();
    for (name, value) in headers {
        let header_name = HeaderName::from_bytes(name.as_bytes()).map_err(|e| {
            ClientError::ConnectionFailed(format!("Invalid header name '{}': {}", name, e))
        })?;
        let header_value = HeaderValue::from_str(value).map_err(|e| {
            ClientError::ConnectionFailed(format!("Invalid value for header '{}': {}", name, e))
        })?;
        map.insert(header_name, header_value);
    }
    Ok(map)
}

/// Turn a non-success response into an error that keeps the server's text
pub(crate) async fn status_error(response: reqwest::Response) -> ClientError {
    let status = response.status().as_u16();
    let body = response.text().await.unwrap_or_default();
    ClientError::Http {
        status,
        body: body.trim().to_string(),
    }
}

pub struct HttpTransport {
    client: reqwest::Client,
    url: String,
    ids: RequestIds,
    session_id: Mutex<Option<String>>,
    protocol_version: Mutex<Option<String>>,
}

impl HttpTransport {
    pub fn new(url: &str, headers: &BTreeMap<String, String>, timeout: Duration) -> Result<Self> {
        let client = reqwest::Client::builder()
            .default_headers(header_map(headers)?)
            .timeout(timeout)
            .build()
            .map_err(|e| ClientError::ConnectionFailed(format!("HTTP client: {}", e)))?;

        Ok(HttpTransport {
            client,
            url: url.to_string(),
            ids: RequestIds::new(),
            session_id: Mutex::new(None),
            protocol_version: Mutex::new(None),
        })
    }

    pub fn session_id(&self) -> Option<String> {
        self.session_id.lock().clone()
    }

    fn session_headers(&self) -> HeaderMap {
        let mut headers = HeaderMap::new();
        if let Some(session) = self.session_id.lock().as_deref() {
            if let Ok(value) = HeaderValue::from_str(session) {
                headers.insert(SESSION_HEADER, value);
            }
        }
        if let Some(version) = self.protocol_version.lock().as_deref() {
            if let Ok(value) = HeaderValue::from_str(version) {
                headers.insert(PROTOCOL_VERSION_HEADER, value);
            }
        }
        headers
    }

    async fn post(&self, body: &JsonValue) -> Result<reqwest::Response> {
        let response = self
            .client
            .post(&self.url)
            .headers(self.session_headers())
            .header(ACCEPT, "application/json, text/event-stream")
            .json(body)
            .send()
            .await
            .map_err(|e| {
                if e.is_timeout() {
                    ClientError::Timeout(format!("HTTP request timed out: {}", e))
                } else {
                    ClientError::RequestFailed(format!("HTTP request failed: {}", e))
                }
            })?;

        if let Some(session) = response
            .headers()
            .get(SESSION_HEADER)
            .and_then(|v| v.to_str().ok())
        {
            let mut current = self.session_id.lock();
            if current.as_deref() != Some(session) {
                debug!("Server assigned session {}", session);
                *current = Some(session.to_string());
            }
        }

        if !response.status().is_success() {
            return Err(status_error(response).await);
        }
        Ok(response)
    }

    /// Read an event-stream response until the message answering `id` arrives
    async fn read_event_stream(&self, response: reqwest::Response, id: u64) -> Result<JsonValue> {
        let mut stream = response.bytes_stream();
        let mut parser = SseParser::new();

        while let Some(chunk) = stream.next().await {
            let chunk = chunk.map_err(|e| {
                ClientError::RequestFailed(format!("Failed to read event stream: {}", e))
            })?;

            for event in parser.push(&chunk) {
                if event.data.trim().is_empty() {
                    continue;
                }
                let message: McpResponse = match serde_json::from_str(&event.data) {
                    Ok(message) => message,
                    Err(e) => {
                        warn!("Skipping unparseable event: {}", e);
                        continue;
                    }
                };

                if message.response_id() == Some(id) {
                    return message.into_result();
                }
                if let Some(reply) = reply_to_server_request(&message) {
                    self.post(&reply).await?;
                } else {
                    debug!("Ignoring interleaved message {:?}", message.method);
                }
            }
        }

        // a final event may lack its terminating blank line
        if let Some(event) = parser.finish() {
            if let Ok(message) = serde_json::from_str::<McpResponse>(&event.data) {
                if message.response_id() == Some(id) {
                    return message.into_result();
                }
            }
        }

        Err(ClientError::Protocol(
            "Event stream ended before the response arrived".to_string(),
        ))
    }
}

#[async_trait]
impl RpcTransport for HttpTransport {
    async fn request(&self, method: &str, params: Option<JsonValue>) -> Result<JsonValue> {
        let id = self.ids.next();
        let body = serde_json::to_value(McpRequest::request(id, method, params))
            .map_err(|e| ClientError::Protocol(format!("Failed to serialize request: {}", e)))?;

        debug!("POST {} ({})", method, id);
        let response = self.post(&body).await?;

        let content_type = response
            .headers()
            .get(CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .unwrap_or_default()
            .to_lowercase();

        if content_type.starts_with("text/event-stream") {
            return self.read_event_stream(response, id).await;
        }

        let message: McpResponse = response.json().await.map_err(|e| {
            ClientError::Protocol(format!("Failed to parse response: {}", e))
        })?;
        message.into_result()
    }

    async fn notify(&self, method: &str, params: Option<JsonValue>) -> Result<()> {
        let body = serde_json::to_value(McpRequest::notification(method, params))
            .map_err(|e| ClientError::Protocol(format!("Failed to serialize request: {}", e)))?;

        let response = self.post(&body).await?;
        if response.status() != StatusCode::ACCEPTED {
            debug!("Notification {} answered with {}", method, response.status());
        }
        Ok(())
    }

    fn set_protocol_version(&self, version: &str) {
        *self.protocol_version.lock() = Some(version.to_string());
    }

    async fn close(&self) {
        let Some(session) = self.session_id() else {
            return;
        };

        // Servers that do not support explicit termination answer 405
        match self
            .client
            .delete(&self.url)
            .header(SESSION_HEADER, session.as_str())
            .send()
            .await
        {
            Ok(response) => debug!("Session {} closed ({})", session, response.status()),
            Err(e) => debug!("Failed to close session {}: {}", session, e),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_header_map() {
        let mut headers = BTreeMap::new();
        headers.insert("Authorization".to_string(), "Bearer abc".to_string());
        headers.insert("X-Trace".to_string(), "1".to_string());

        let map = header_map(&headers).unwrap();
        assert_eq!(map.get("authorization").unwrap(), "Bearer abc");
        assert_eq!(map.get("x-trace").unwrap(), "1");
    }

    #[test]
    fn test_invalid_header_name_is_rejected() {
        let mut headers = BTreeMap::new();
        headers.insert("bad header".to_string(), "x".to_string());
        assert!(matches!(
            header_map(&headers),
            Err(ClientError::ConnectionFailed(_))
        ));
    }

    #[test]
    fn test_session_headers_follow_state() {
        let transport =
            HttpTransport::new("http://localhost:1/mcp", &BTreeMap::new(), Duration::from_secs(5))
                .unwrap();
        assert!(transport.session_headers().is_empty());

        *transport.session_id.lock() = Some("abc".to_string());
        transport.set_protocol_version("2024-11-05");
        let headers = transport.session_headers();
        assert_eq!(headers.get(SESSION_HEADER).unwrap(), "abc");
        assert_eq!(headers.get(PROTOCOL_VERSION_HEADER).unwrap(), "2024-11-05");
    }
}
