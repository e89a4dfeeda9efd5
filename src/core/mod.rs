//! Core types for mcprobe
//!
//! This module defines the data model shared by every stage of a tool call:
//! - Tool descriptors as advertised by the server
//! - Parameter sets and invocation requests
//! - Invocation results and their content items
//! - Server metadata returned by the MCP handshake and listing methods
//!
//! Schema interpretation lives in [`schema`], failure classification in [`classify`].

pub mod classify;
pub mod schema;

use schema::SchemaNode;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value as JsonValue};
use std::fmt;
use thiserror::Error;

/// Error types for core operations
#[derive(Error, Debug)]
pub enum CoreError {
    #[error("Invalid payload: {0}")]
    InvalidPayload(String),
}

pub type Result<T> = std::result::Result<T, CoreError>;

/// Coerced tool arguments, keyed by property name in insertion order
pub type ParameterSet = Map<String, JsonValue>;

/// A remotely invokable tool as listed by the server
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolDescriptor {
    pub name: String,

    #[serde(default)]
    pub description: String,

    #[serde(rename = "inputSchema", default)]
    pub input_schema: JsonValue,
}

impl ToolDescriptor {
    pub fn new(
        name: impl Into<String>,
        description: impl Into<String>,
        input_schema: JsonValue,
    ) -> Self {
        ToolDescriptor {
            name: name.into(),
            description: description.into(),
            input_schema,
        }
    }

    /// Interpret the raw input contract. Never fails; see [`SchemaNode::interpret`].
    pub fn schema(&self) -> SchemaNode {
        SchemaNode::interpret(&self.input_schema)
    }
}

/// A single `tools/call` attempt
#[derive(Debug, Clone, PartialEq)]
pub struct InvocationRequest {
    pub tool_name: String,
    pub arguments: ParameterSet,
}

impl InvocationRequest {
    pub fn new(tool_name: impl Into<String>, arguments: ParameterSet) -> Self {
        InvocationRequest {
            tool_name: tool_name.into(),
            arguments,
        }
    }

    /// JSON-RPC params for `tools/call`
    pub fn to_params(&self) -> JsonValue {
        serde_json::json!({
            "name": self.tool_name,
            "arguments": JsonValue::Object(self.arguments.clone()),
        })
    }
}

/// One item of a tool result.
///
/// The set of content kinds is open on the wire, so anything we do not
/// recognise is kept as [`ContentItem::Unknown`] with its original tag.
#[derive(Debug, Clone, PartialEq)]
pub enum ContentItem {
    Text(String),
    Image { mime_type: String },
    Audio { mime_type: String },
    Resource { uri: String, mime_type: Option<String> },
    Unknown { type_tag: String },
}

impl ContentItem {
    /// Parse one entry of a result's `content` array
    pub fn from_value(value: &JsonValue) -> Self {
        let type_tag = value
            .get("type")
            .and_then(|t| t.as_str())
            .unwrap_or("")
            .to_string();
        let mime_type = || {
            value
                .get("mimeType")
                .and_then(|m| m.as_str())
                .unwrap_or("unknown")
                .to_string()
        };

        match type_tag.as_str() {
            "text" => match value.get("text").and_then(|t| t.as_str()) {
                Some(text) => ContentItem::Text(text.to_string()),
                None => ContentItem::Unknown { type_tag },
            },
            "image" => ContentItem::Image {
                mime_type: mime_type(),
            },
            "audio" => ContentItem::Audio {
                mime_type: mime_type(),
            },
            "resource" => {
                let resource = value.get("resource");
                match resource.and_then(|r| r.get("uri")).and_then(|u| u.as_str()) {
                    Some(uri) => ContentItem::Resource {
                        uri: uri.to_string(),
                        mime_type: resource
                            .and_then(|r| r.get("mimeType"))
                            .and_then(|m| m.as_str())
                            .map(String::from),
                    },
                    None => ContentItem::Unknown { type_tag },
                }
            }
            "" => ContentItem::Unknown {
                type_tag: "(missing)".to_string(),
            },
            _ => ContentItem::Unknown { type_tag },
        }
    }

    pub fn type_tag(&self) -> &str {
        match self {
            ContentItem::Text(_) => "text",
            ContentItem::Image { .. } => "image",
            ContentItem::Audio { .. } => "audio",
            ContentItem::Resource { .. } => "resource",
            ContentItem::Unknown { type_tag } => type_tag,
        }
    }
}

/// Outcome of a `tools/call` that reached the server
#[derive(Debug, Clone, PartialEq)]
pub struct InvocationResult {
    pub succeeded: bool,
    pub content: Vec<ContentItem>,
    pub structured_content: Option<JsonValue>,
}

impl InvocationResult {
    pub fn success(content: Vec<ContentItem>) -> Self {
        InvocationResult {
            succeeded: true,
            content,
            structured_content: None,
        }
    }

    pub fn failure(content: Vec<ContentItem>) -> Self {
        InvocationResult {
            succeeded: false,
            content,
            structured_content: None,
        }
    }

    /// Parse a `tools/call` result object.
    ///
    /// A missing `content` array is treated as empty; only a non-object
    /// result is rejected.
    pub fn from_value(value: &JsonValue) -> Result<Self> {
        let obj = value.as_object().ok_or_else(|| {
            CoreError::InvalidPayload(format!("tools/call result is not an object: {}", value))
        })?;

        let content = obj
            .get("content")
            .and_then(|c| c.as_array())
            .map(|items| items.iter().map(ContentItem::from_value).collect())
            .unwrap_or_default();

        let is_error = obj
            .get("isError")
            .and_then(|e| e.as_bool())
            .unwrap_or(false);

        Ok(InvocationResult {
            succeeded: !is_error,
            content,
            structured_content: obj
                .get("structuredContent")
                .filter(|v| !v.is_null())
                .cloned(),
        })
    }
}

/// Name and version of an MCP implementation
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Implementation {
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub version: String,
}

impl fmt::Display for Implementation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} v{}", self.name, self.version)
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ListChangedCapability {
    #[serde(default)]
    pub list_changed: bool,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ResourcesCapability {
    #[serde(default)]
    pub subscribe: bool,
    #[serde(default)]
    pub list_changed: bool,
}

/// Capability flags advertised by the server during initialization
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ServerCapabilities {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub logging: Option<JsonValue>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub prompts: Option<ListChangedCapability>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub resources: Option<ResourcesCapability>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tools: Option<ListChangedCapability>,
    #[serde(default, skip_serializing_if = "Map::is_empty")]
    pub experimental: Map<String, JsonValue>,
}

impl ServerCapabilities {
    pub fn supports_tools(&self) -> bool {
        self.tools.is_some()
    }

    pub fn supports_resources(&self) -> bool {
        self.resources.is_some()
    }

    pub fn supports_prompts(&self) -> bool {
        self.prompts.is_some()
    }
}

/// Result of the `initialize` handshake
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InitializeResult {
    #[serde(default)]
    pub protocol_version: String,
    #[serde(default)]
    pub capabilities: ServerCapabilities,
    #[serde(default)]
    pub server_info: Implementation,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub instructions: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ResourceDescriptor {
    pub uri: String,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub mime_type: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ResourceTemplateDescriptor {
    #[serde(default)]
    pub uri_template: String,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub mime_type: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PromptArgument {
    pub name: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub required: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PromptDescriptor {
    pub name: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub arguments: Vec<PromptArgument>,
}

/// Short JSON kind name for display ("string", "number", ...)
pub fn json_kind(value: &JsonValue) -> &'static str {
    match value {
        JsonValue::Null => "null",
        JsonValue::Bool(_) => "boolean",
        JsonValue::Number(n) if n.is_i64() || n.is_u64() => "integer",
        JsonValue::Number(_) => "number",
        JsonValue::String(_) => "string",
        JsonValue::Array(_) => "array",
        JsonValue::Object(_) => "object",
    }
}
