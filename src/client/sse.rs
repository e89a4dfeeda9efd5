//! HTTP+SSE transport
//!
//! The client opens a long-lived `GET` event stream. The server's first
//! `endpoint` event names the URL messages must be POSTed to; responses come
//! back on the stream as `message` events and are routed to the waiting
//! request by id.

use super::http::{header_map, status_error};
use super::jsonrpc::{
    reply_to_server_request, McpRequest, McpResponse, PendingRequests, RequestIds,
};
use super::{ClientError, Result, RpcTransport};
use async_trait::async_trait;
use bytes::BytesMut;
use futures::StreamExt;
use reqwest::header::ACCEPT;
use reqwest::Url;
use serde_json::Value as JsonValue;
use std::collections::BTreeMap;
use std::time::Duration;
use tokio::sync::oneshot;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

/// One dispatched server-sent event
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct SseEvent {
    pub event: Option<String>,
    pub data: String,
    pub id: Option<String>,
}

impl SseEvent {
    /// Event type, `message` when the server did not name one
    pub fn event_type(&self) -> &str {
        self.event.as_deref().unwrap_or("message")
    }
}

/// Incremental `text/event-stream` decoder.
///
/// Chunks may split lines (and UTF-8 sequences) anywhere; complete events are
/// returned as soon as their terminating blank line arrives.
#[derive(Debug, Default)]
pub struct SseParser {
    buffer: BytesMut,
    event: Option<String>,
    data: Vec<String>,
    id: Option<String>,
}

impl SseParser {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, chunk: &[u8]) -> Vec<SseEvent> {
        self.buffer.extend_from_slice(chunk);

        let mut events = Vec::new();
        while let Some(pos) = self.buffer.iter().position(|b| *b == b'\n') {
            let line = self.buffer.split_to(pos + 1);
            let line = String::from_utf8_lossy(&line);
            let line = line.trim_end_matches(['\n', '\r']);
            if let Some(event) = self.process_line(line) {
                events.push(event);
            }
        }
        events
    }

    /// Flush an event left open when the stream ends without a blank line
    pub fn finish(&mut self) -> Option<SseEvent> {
        if !self.buffer.is_empty() {
            let rest = self.buffer.split();
            let line = String::from_utf8_lossy(&rest).trim_end_matches('\r').to_string();
            if let Some(event) = self.process_line(&line) {
                return Some(event);
            }
        }
        self.dispatch()
    }

    fn process_line(&mut self, line: &str) -> Option<SseEvent> {
        if line.is_empty() {
            return self.dispatch();
        }
        if line.starts_with(':') {
            return None;
        }

        let (field, value) = match line.split_once(':') {
            Some((field, value)) => (field, value.strip_prefix(' ').unwrap_or(value)),
            None => (line, ""),
        };

        match field {
            "event" => self.event = Some(value.to_string()),
            "data" => self.data.push(value.to_string()),
            "id" => self.id = Some(value.to_string()),
            // retry and unknown fields
            _ => {}
        }
        None
    }

    fn dispatch(&mut self) -> Option<SseEvent> {
        if self.data.is_empty() && self.event.is_none() {
            self.id = None;
            return None;
        }
        let event = SseEvent {
            event: self.event.take(),
            data: self.data.join("\n"),
            id: self.id.take(),
        };
        self.data.clear();
        Some(event)
    }
}

pub struct SseTransport {
    client: reqwest::Client,
    endpoint: Url,
    ids: RequestIds,
    pending: PendingRequests,
    shutdown: CancellationToken,
}

impl SseTransport {
    /// Open the event stream and wait for the `endpoint` event.
    ///
    /// The stream itself is never subject to a timeout; `timeout` bounds
    /// each POST.
    pub async fn connect(
        url: &str,
        headers: &BTreeMap<String, String>,
        timeout: Duration,
    ) -> Result<Self> {
        let default_headers = header_map(headers)?;

        let stream_client = reqwest::Client::builder()
            .default_headers(default_headers.clone())
            .build()
            .map_err(|e| ClientError::ConnectionFailed(format!("HTTP client: {}", e)))?;
        let client = reqwest::Client::builder()
            .default_headers(default_headers)
            .timeout(timeout)
            .build()
            .map_err(|e| ClientError::ConnectionFailed(format!("HTTP client: {}", e)))?;

        debug!("Opening event stream {}", url);
        let response = stream_client
            .get(url)
            .header(ACCEPT, "text/event-stream")
            .send()
            .await
            .map_err(|e| ClientError::ConnectionFailed(format!("{}: {}", url, e)))?;

        if !response.status().is_success() {
            return Err(status_error(response).await);
        }

        let base = response.url().clone();
        let pending = PendingRequests::default();
        let shutdown = CancellationToken::new();
        let (endpoint_tx, endpoint_rx) = oneshot::channel();

        tokio::spawn(listen(
            response,
            base,
            client.clone(),
            endpoint_tx,
            pending.clone(),
            shutdown.clone(),
        ));

        let endpoint = match endpoint_rx.await {
            Ok(endpoint) => endpoint,
            Err(_) => {
                shutdown.cancel();
                return Err(ClientError::ConnectionFailed(
                    "Event stream closed before the endpoint event".to_string(),
                ));
            }
        };
        info!("Message endpoint: {}", endpoint);

        Ok(SseTransport {
            client,
            endpoint,
            ids: RequestIds::new(),
            pending,
            shutdown,
        })
    }

    async fn post(&self, body: &JsonValue) -> Result<()> {
        post_message(&self.client, &self.endpoint, body).await
    }
}

async fn post_message(client: &reqwest::Client, endpoint: &Url, body: &JsonValue) -> Result<()> {
    let response = client
        .post(endpoint.clone())
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

    if !response.status().is_success() {
        return Err(status_error(response).await);
    }
    Ok(())
}

/// Read the event stream until it closes or the transport shuts down
async fn listen(
    response: reqwest::Response,
    base: Url,
    client: reqwest::Client,
    endpoint_tx: oneshot::Sender<Url>,
    pending: PendingRequests,
    shutdown: CancellationToken,
) {
    let mut endpoint_tx = Some(endpoint_tx);
    let mut endpoint: Option<Url> = None;
    let mut stream = response.bytes_stream();
    let mut parser = SseParser::new();

    loop {
        let chunk = tokio::select! {
            _ = shutdown.cancelled() => break,
            chunk = stream.next() => chunk,
        };

        let bytes = match chunk {
            Some(Ok(bytes)) => bytes,
            Some(Err(e)) => {
                warn!("Event stream error: {}", e);
                break;
            }
            None => break,
        };

        for event in parser.push(&bytes) {
            match event.event_type() {
                "endpoint" => match base.join(event.data.trim()) {
                    Ok(url) => {
                        endpoint = Some(url.clone());
                        if let Some(tx) = endpoint_tx.take() {
                            let _ = tx.send(url);
                        }
                    }
                    Err(e) => warn!("Invalid endpoint '{}': {}", event.data, e),
                },
                "message" => {
                    let message: McpResponse = match serde_json::from_str(&event.data) {
                        Ok(message) => message,
                        Err(e) => {
                            warn!("Skipping unparseable message event: {}", e);
                            continue;
                        }
                    };

                    if let Some(reply) = reply_to_server_request(&message) {
                        if let Some(url) = &endpoint {
                            if let Err(e) = post_message(&client, url, &reply).await {
                                warn!("Failed to answer server request: {}", e);
                            }
                        }
                    } else {
                        pending.route(message);
                    }
                }
                other => debug!("Ignoring '{}' event", other),
            }
        }
    }

    debug!("Event stream listener finished");
    pending.fail_all("Event stream closed");
}

#[async_trait]
impl RpcTransport for SseTransport {
    async fn request(&self, method: &str, params: Option<JsonValue>) -> Result<JsonValue> {
        let id = self.ids.next();
        let body = serde_json::to_value(McpRequest::request(id, method, params))
            .map_err(|e| ClientError::Protocol(format!("Failed to serialize request: {}", e)))?;

        let (_guard, response_rx) = self.pending.register(id);
        debug!("POST {} ({})", method, id);
        self.post(&body).await?;

        response_rx.await.map_err(|_| {
            ClientError::ConnectionFailed("Event stream closed before the response".to_string())
        })?
    }

    async fn notify(&self, method: &str, params: Option<JsonValue>) -> Result<()> {
        let body = serde_json::to_value(McpRequest::notification(method, params))
            .map_err(|e| ClientError::Protocol(format!("Failed to serialize request: {}", e)))?;
        self.post(&body).await
    }

    fn message_endpoint(&self) -> Option<String> {
        Some(self.endpoint.to_string())
    }

    async fn close(&self) {
        self.shutdown.cancel();
    }
}

impl Drop for SseTransport {
    fn drop(&mut self) {
        self.shutdown.cancel();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_endpoint_and_message() {
        let mut parser = SseParser::new();
        let events = parser.push(
            b"event: endpoint\ndata: /messages?sessionId=1\n\nevent: message\ndata: {\"id\":1}\n\n",
        );
        assert_eq!(events.len(), 2);
        assert_eq!(events[0].event_type(), "endpoint");
        assert_eq!(events[0].data, "/messages?sessionId=1");
        assert_eq!(events[1].event_type(), "message");
        assert_eq!(events[1].data, "{\"id\":1}");
    }

    #[test]
    fn test_split_chunks_and_crlf() {
        let mut parser = SseParser::new();
        assert!(parser.push(b"data: hel").is_empty());
        assert!(parser.push(b"lo\r\ndata: world\r\n").is_empty());
        let events = parser.push(b"\r\n");
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].data, "hello\nworld");
        assert_eq!(events[0].event_type(), "message");
    }

    #[test]
    fn test_comments_and_unknown_fields_are_ignored() {
        let mut parser = SseParser::new();
        let events = parser.push(b": keep-alive\nretry: 100\nid: 7\ndata: x\n\n\n");
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].id.as_deref(), Some("7"));
    }

    #[test]
    fn test_finish_flushes_open_event() {
        let mut parser = SseParser::new();
        assert!(parser.push(b"data: tail").is_empty());
        let event = parser.finish().unwrap();
        assert_eq!(event.data, "tail");
        assert!(parser.finish().is_none());
    }

    #[test]
    fn test_endpoint_resolution() {
        let base = Url::parse("http://localhost:8080/sse").unwrap();
        let url = base.join("/messages?sessionId=abc").unwrap();
        assert_eq!(url.as_str(), "http://localhost:8080/messages?sessionId=abc");
    }
}
