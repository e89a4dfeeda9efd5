//! In-memory MCP server stand-in shared by the integration tests

#![allow(dead_code)]

use async_trait::async_trait;
use mcprobe::client::{ClientError, ProtocolClient, Result};
use mcprobe::core::{
    ContentItem, Implementation, InitializeResult, InvocationRequest, InvocationResult,
    ListChangedCapability, PromptArgument, PromptDescriptor, ResourceDescriptor,
    ResourceTemplateDescriptor, ResourcesCapability, ServerCapabilities, ToolDescriptor,
};
use parking_lot::Mutex;
use serde_json::{json, Value as JsonValue};
use std::time::Duration;

pub fn echo_tool() -> ToolDescriptor {
    ToolDescriptor::new(
        "echo",
        "Echo a message back",
        json!({
            "type": "object",
            "properties": {
                "message": {"type": "string", "description": "Message to echo"}
            },
            "required": ["message"]
        }),
    )
}

pub fn calculate_tool() -> ToolDescriptor {
    ToolDescriptor::new(
        "calculate",
        "Basic arithmetic",
        json!({
            "type": "object",
            "properties": {
                "a": {"type": "number"},
                "b": {"type": "number"},
                "op": {"type": "string", "enum": ["add", "sub"]}
            },
            "required": ["a", "b"]
        }),
    )
}

pub fn slow_tool() -> ToolDescriptor {
    ToolDescriptor::new("slow", "Never answers in time", json!({"type": "object"}))
}

pub fn stale_session_tool() -> ToolDescriptor {
    ToolDescriptor::new("stale", "Fails with an expired session", json!({}))
}

pub fn refusing_tool() -> ToolDescriptor {
    ToolDescriptor::new("refuse", "Always reports isError", json!({}))
}

pub fn all_capabilities() -> ServerCapabilities {
    ServerCapabilities {
        tools: Some(ListChangedCapability::default()),
        resources: Some(ResourcesCapability::default()),
        prompts: Some(ListChangedCapability::default()),
        ..Default::default()
    }
}

/// Scripted server: records every call and answers by tool name
pub struct FakeClient {
    pub capabilities: ServerCapabilities,
    pub tools: Vec<ToolDescriptor>,
    pub fail_tools: bool,
    pub fail_resources: bool,
    pub calls: Mutex<Vec<InvocationRequest>>,
}

impl FakeClient {
    pub fn new(tools: Vec<ToolDescriptor>) -> Self {
        FakeClient {
            capabilities: all_capabilities(),
            tools,
            fail_tools: false,
            fail_resources: false,
            calls: Mutex::new(Vec::new()),
        }
    }

    pub fn with_capabilities(mut self, capabilities: ServerCapabilities) -> Self {
        self.capabilities = capabilities;
        self
    }

    pub fn recorded(&self) -> Vec<InvocationRequest> {
        self.calls.lock().clone()
    }
}

fn number(value: Option<&JsonValue>) -> f64 {
    value.and_then(|v| v.as_f64()).unwrap_or(0.0)
}

#[async_trait]
impl ProtocolClient for FakeClient {
    async fn initialize(&self) -> Result<InitializeResult> {
        Ok(InitializeResult {
            protocol_version: "2024-11-05".to_string(),
            capabilities: self.capabilities.clone(),
            server_info: Implementation {
                name: "fake".to_string(),
                version: "1.0.0".to_string(),
            },
            instructions: None,
        })
    }

    fn server_capabilities(&self) -> ServerCapabilities {
        self.capabilities.clone()
    }

    async fn list_tools(&self) -> Result<Vec<ToolDescriptor>> {
        if self.fail_tools {
            return Err(ClientError::RequestFailed(
                "MCP error -32603: internal error".to_string(),
            ));
        }
        Ok(self.tools.clone())
    }

    async fn list_resources(&self) -> Result<Vec<ResourceDescriptor>> {
        if self.fail_resources {
            return Err(ClientError::RequestFailed(
                "MCP error -32601: Method not found".to_string(),
            ));
        }
        Ok(vec![ResourceDescriptor {
            uri: "file:///notes.txt".to_string(),
            name: "notes".to_string(),
            description: String::new(),
            mime_type: "text/plain".to_string(),
        }])
    }

    async fn list_resource_templates(&self) -> Result<Vec<ResourceTemplateDescriptor>> {
        Ok(Vec::new())
    }

    async fn list_prompts(&self) -> Result<Vec<PromptDescriptor>> {
        Ok(vec![PromptDescriptor {
            name: "summarize".to_string(),
            description: "Summarize a document".to_string(),
            arguments: vec![PromptArgument {
                name: "text".to_string(),
                description: String::new(),
                required: true,
            }],
        }])
    }

    async fn call_tool(&self, request: &InvocationRequest) -> Result<InvocationResult> {
        self.calls.lock().push(request.clone());

        match request.tool_name.as_str() {
            "echo" => {
                let message = request
                    .arguments
                    .get("message")
                    .and_then(|m| m.as_str())
                    .unwrap_or_default();
                Ok(InvocationResult::success(vec![ContentItem::Text(
                    format!("Echo: {}", message),
                )]))
            }
            "calculate" => {
                let a = number(request.arguments.get("a"));
                let b = number(request.arguments.get("b"));
                let total = match request.arguments.get("op").and_then(|o| o.as_str()) {
                    Some("sub") => a - b,
                    _ => a + b,
                };
                Ok(InvocationResult::success(vec![ContentItem::Text(
                    format!("Result: {}", total),
                )]))
            }
            "slow" => {
                tokio::time::sleep(Duration::from_secs(600)).await;
                Ok(InvocationResult::success(Vec::new()))
            }
            "stale" => Err(ClientError::Http {
                status: 404,
                body: "Invalid session ID".to_string(),
            }),
            "refuse" => Ok(InvocationResult::failure(vec![ContentItem::Text(
                "refused".to_string(),
            )])),
            other => Err(ClientError::RequestFailed(format!(
                "MCP error -32602: Tool {} not found",
                other
            ))),
        }
    }
}
