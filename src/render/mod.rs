//! Operator-facing output
//!
//! Everything the operator reads on stdout goes through here, written to an
//! explicit sink so it can be captured in tests:
//! - connection banner and initialization report
//! - tool, resource, template and prompt listings
//! - request echo, tool results and classified failures
//! - interactive help

use crate::client::TransportKind;
use crate::core::classify::ClassifiedError;
use crate::core::schema::SchemaNode;
use crate::core::{
    json_kind, ContentItem, InitializeResult, InvocationResult, ParameterSet, PromptDescriptor,
    ResourceDescriptor, ResourceTemplateDescriptor, ServerCapabilities, ToolDescriptor,
};
use std::collections::BTreeMap;
use std::io::{self, Write};
use std::time::Duration;

/// What the banner says about the connection
#[derive(Debug, Clone)]
pub struct ConnectionSummary<'a> {
    /// Server URL, or the command line for stdio
    pub target: &'a str,
    pub transport: TransportKind,
    pub timeout: Duration,
    pub call_timeout: Duration,
    pub headers: &'a BTreeMap<String, String>,
}

pub fn banner(
    out: &mut dyn Write,
    summary: &ConnectionSummary<'_>,
    verbose: bool,
) -> io::Result<()> {
    writeln!(out, "=== MCP Server Probe ===")?;
    match summary.transport {
        TransportKind::Stdio => writeln!(out, "Server command: {}", summary.target)?,
        _ => writeln!(out, "Server URL: {}", summary.target)?,
    }
    writeln!(out, "Transport: {}", summary.transport)?;
    writeln!(out, "Timeout: {:?}", summary.timeout)?;
    writeln!(out, "Call timeout: {:?}", summary.call_timeout)?;
    if verbose && !summary.headers.is_empty() {
        // values may carry credentials
        let names: Vec<&str> = summary.headers.keys().map(String::as_str).collect();
        writeln!(out, "Headers: {}", names.join(", "))?;
    }
    writeln!(out)
}

/// Report of the initialize handshake
pub fn init_report(
    out: &mut dyn Write,
    protocol_version_sent: &str,
    client_name: &str,
    result: &InitializeResult,
    verbose: bool,
) -> io::Result<()> {
    if verbose {
        writeln!(
            out,
            "Sent initialization request with protocol version: {}",
            protocol_version_sent
        )?;
        writeln!(
            out,
            "Client info: {} v{}",
            client_name,
            env!("CARGO_PKG_VERSION")
        )?;
    }
    writeln!(out, "Initialization completed successfully")?;
    writeln!(out, "Server info: {}", result.server_info)?;
    writeln!(out, "Protocol version: {}", result.protocol_version)?;

    if verbose {
        if let Some(instructions) = result.instructions.as_deref().filter(|i| !i.is_empty()) {
            writeln!(out, "Instructions: {}", instructions)?;
        }
        writeln!(out)?;
        capabilities(out, &result.capabilities)?;
    }
    Ok(())
}

pub fn capabilities(out: &mut dyn Write, caps: &ServerCapabilities) -> io::Result<()> {
    writeln!(out, "Server capabilities received:")?;
    if caps.logging.is_some() {
        writeln!(out, "  - Logging: supported")?;
    }
    if let Some(prompts) = &caps.prompts {
        writeln!(
            out,
            "  - Prompts: supported (list_changed: {})",
            prompts.list_changed
        )?;
    }
    if let Some(resources) = &caps.resources {
        writeln!(
            out,
            "  - Resources: supported (subscribe: {}, list_changed: {})",
            resources.subscribe, resources.list_changed
        )?;
    }
    if let Some(tools) = &caps.tools {
        writeln!(
            out,
            "  - Tools: supported (list_changed: {})",
            tools.list_changed
        )?;
    }
    if !caps.experimental.is_empty() {
        let keys: Vec<&str> = caps.experimental.keys().map(String::as_str).collect();
        writeln!(out, "  - Experimental capabilities: {}", keys.join(", "))?;
    }
    Ok(())
}

/// Numbered tool listing for list-only and discovery modes
pub fn tool_list(out: &mut dyn Write, tools: &[ToolDescriptor], verbose: bool) -> io::Result<()> {
    if tools.is_empty() {
        return writeln!(out, "  (No tools available)");
    }

    writeln!(out, "Found {} tools:", tools.len())?;
    writeln!(out)?;
    for (i, tool) in tools.iter().enumerate() {
        writeln!(out, "  {}. {}", i + 1, tool.name)?;
        if verbose {
            if !tool.description.is_empty() {
                writeln!(out, "     Description: {}", tool.description)?;
            }
            writeln!(out, "     Input Schema:")?;
            schema_summary(out, &tool.schema(), "       ")?;
            writeln!(out)?;
        }
    }
    Ok(())
}

/// Compact catalogue shown by the interactive `list` command
pub fn tool_catalogue(out: &mut dyn Write, tools: &[ToolDescriptor]) -> io::Result<()> {
    writeln!(out)?;
    writeln!(out, "Available tools ({}):", tools.len())?;
    for (i, tool) in tools.iter().enumerate() {
        if tool.description.is_empty() {
            writeln!(out, "  {}. {}", i + 1, tool.name)?;
        } else {
            writeln!(out, "  {}. {} - {}", i + 1, tool.name, tool.description)?;
        }
    }
    Ok(())
}

pub fn schema_summary(out: &mut dyn Write, schema: &SchemaNode, indent: &str) -> io::Result<()> {
    writeln!(out, "{}Type: {}", indent, schema.schema_type)?;
    if schema.required.is_empty() {
        writeln!(out, "{}Required: (none)", indent)?;
    } else {
        writeln!(out, "{}Required: {}", indent, schema.required.join(", "))?;
    }

    if schema.properties.is_empty() {
        writeln!(out, "{}Properties: (none)", indent)?;
    } else {
        writeln!(out, "{}Properties:", indent)?;
        for property in &schema.properties {
            let marker = if schema.is_required(&property.name) {
                " [required]"
            } else {
                ""
            };
            match &property.description {
                Some(description) => writeln!(
                    out,
                    "{}  - {} ({}){}: {}",
                    indent, property.name, property.property_type, marker, description
                )?,
                None => writeln!(
                    out,
                    "{}  - {} ({}){}",
                    indent, property.name, property.property_type, marker
                )?,
            }
            if let Some(values) = &property.enum_values {
                let rendered: Vec<String> = values.iter().map(|v| v.to_string()).collect();
                writeln!(out, "{}      enum: {}", indent, rendered.join(", "))?;
            }
            if let Some(default) = &property.default {
                writeln!(out, "{}      default: {}", indent, default)?;
            }
        }
    }

    if !schema.definitions.is_empty() {
        writeln!(out, "{}Definitions: {}", indent, schema.definitions.join(", "))?;
    }
    Ok(())
}

pub fn resource_list(
    out: &mut dyn Write,
    resources: &[ResourceDescriptor],
    verbose: bool,
) -> io::Result<()> {
    if resources.is_empty() {
        return writeln!(out, "  (No resources available)");
    }

    writeln!(out, "Found {} resources:", resources.len())?;
    writeln!(out)?;
    for (i, resource) in resources.iter().enumerate() {
        writeln!(out, "  {}. {}", i + 1, resource.uri)?;
        if verbose {
            detail(out, "Name", &resource.name)?;
            detail(out, "Description", &resource.description)?;
            detail(out, "MIME Type", &resource.mime_type)?;
        }
    }
    Ok(())
}

pub fn resource_template_list(
    out: &mut dyn Write,
    templates: &[ResourceTemplateDescriptor],
    verbose: bool,
) -> io::Result<()> {
    if templates.is_empty() {
        return writeln!(out, "  (No resource templates available)");
    }

    writeln!(out, "Found {} resource templates:", templates.len())?;
    writeln!(out)?;
    for (i, template) in templates.iter().enumerate() {
        writeln!(out, "  {}. {}", i + 1, template.uri_template)?;
        if verbose {
            detail(out, "Name", &template.name)?;
            detail(out, "Description", &template.description)?;
            detail(out, "MIME Type", &template.mime_type)?;
        }
    }
    Ok(())
}

pub fn prompt_list(
    out: &mut dyn Write,
    prompts: &[PromptDescriptor],
    verbose: bool,
) -> io::Result<()> {
    if prompts.is_empty() {
        return writeln!(out, "  (No prompts available)");
    }

    writeln!(out, "Found {} prompts:", prompts.len())?;
    writeln!(out)?;
    for (i, prompt) in prompts.iter().enumerate() {
        writeln!(out, "  {}. {}", i + 1, prompt.name)?;
        if !verbose {
            continue;
        }
        detail(out, "Description", &prompt.description)?;
        if !prompt.arguments.is_empty() {
            writeln!(out, "     Arguments:")?;
            for arg in &prompt.arguments {
                let mut line = format!("       - {}", arg.name);
                if !arg.description.is_empty() {
                    line.push_str(&format!(": {}", arg.description));
                }
                if arg.required {
                    line.push_str(" (required)");
                }
                writeln!(out, "{}", line)?;
            }
        }
    }
    Ok(())
}

fn detail(out: &mut dyn Write, label: &str, value: &str) -> io::Result<()> {
    if value.is_empty() {
        return Ok(());
    }
    writeln!(out, "     {}: {}", label, value)
}

/// Echo of the call about to be sent
pub fn request_echo(out: &mut dyn Write, tool: &str, params: &ParameterSet) -> io::Result<()> {
    writeln!(out)?;
    writeln!(out, "=== Sending Tool Call ===")?;
    writeln!(out, "Tool: {}", tool)?;
    if params.is_empty() {
        writeln!(out, "Parameters: (none)")?;
    } else {
        writeln!(out, "Parameters:")?;
        for (key, value) in params {
            writeln!(out, "  {}: {} ({})", key, value, json_kind(value))?;
        }
    }
    writeln!(out)
}

/// One line (or one text block) per content item
pub fn content_item(out: &mut dyn Write, item: &ContentItem) -> io::Result<()> {
    match item {
        ContentItem::Text(text) => writeln!(out, "{}", text),
        ContentItem::Image { mime_type } => writeln!(out, "Image (MIME: {})", mime_type),
        ContentItem::Audio { mime_type } => writeln!(out, "Audio (MIME: {})", mime_type),
        ContentItem::Resource { uri, mime_type } => match mime_type {
            Some(mime) => writeln!(out, "Resource: {} (MIME: {})", uri, mime),
            None => writeln!(out, "Resource: {}", uri),
        },
        ContentItem::Unknown { type_tag } => {
            writeln!(out, "Unrecognized content type: {}", type_tag)
        }
    }
}

pub fn invocation_result(
    out: &mut dyn Write,
    result: &InvocationResult,
    verbose: bool,
) -> io::Result<()> {
    writeln!(out)?;
    writeln!(out, "=== Tool Call Result ===")?;
    if result.succeeded {
        writeln!(out, "Tool call succeeded:")?;
    } else {
        writeln!(out, "Tool call failed:")?;
    }

    if result.content.is_empty() {
        writeln!(out, "(no content)")?;
    }
    let numbered = result.content.len() > 1;
    for (i, item) in result.content.iter().enumerate() {
        if numbered {
            writeln!(out)?;
            writeln!(out, "Content {}:", i + 1)?;
        }
        content_item(out, item)?;
    }

    if verbose {
        if let Some(structured) = &result.structured_content {
            let pretty = serde_json::to_string_pretty(structured)
                .unwrap_or_else(|_| structured.to_string());
            writeln!(out)?;
            writeln!(out, "Structured content:")?;
            writeln!(out, "{}", pretty)?;
        }
    }
    Ok(())
}

/// Failure header, category remediation, then the original message
pub fn classified_error(
    out: &mut dyn Write,
    header: &str,
    error: &ClassifiedError,
) -> io::Result<()> {
    writeln!(out, "❌ {}", header)?;
    writeln!(out, "   Category: {}", error.category)?;
    for line in error.remediation() {
        writeln!(out, "   {}", line)?;
    }
    writeln!(out, "   Error: {}", error.original_message)
}

pub fn interactive_help(out: &mut dyn Write) -> io::Result<()> {
    writeln!(out)?;
    writeln!(out, "Available commands:")?;
    writeln!(out, "  list, ls, l     - List available tools")?;
    writeln!(out, "  call, c         - Call a tool (guided selection)")?;
    writeln!(out, "  call 3, c 3     - Call tool number 3 directly")?;
    writeln!(out, "  call <name>     - Call a tool by name")?;
    writeln!(out, "  3               - Call tool number 3 directly")?;
    writeln!(out, "  help, h, ?      - Show this help")?;
    writeln!(out, "  exit, quit, q   - Exit interactive mode")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::classify::classify;
    use serde_json::json;

    fn render<F>(f: F) -> String
    where
        F: FnOnce(&mut dyn Write) -> io::Result<()>,
    {
        let mut buf = Vec::new();
        f(&mut buf).unwrap();
        String::from_utf8(buf).unwrap()
    }

    #[test]
    fn test_every_content_item_renders_one_line() {
        let result = InvocationResult::success(vec![
            ContentItem::Text("hello".to_string()),
            ContentItem::Image {
                mime_type: "image/png".to_string(),
            },
            ContentItem::Audio {
                mime_type: "audio/wav".to_string(),
            },
            ContentItem::Unknown {
                type_tag: "hologram".to_string(),
            },
        ]);
        let text = render(|out| invocation_result(out, &result, false));

        assert!(text.contains("Tool call succeeded:"));
        assert!(text.contains("Content 4:"));
        assert!(text.contains("hello\n"));
        assert!(text.contains("Image (MIME: image/png)\n"));
        assert!(text.contains("Audio (MIME: audio/wav)\n"));
        assert!(text.contains("Unrecognized content type: hologram\n"));
    }

    #[test]
    fn test_single_item_is_not_numbered() {
        let result = InvocationResult::failure(vec![ContentItem::Text("boom".to_string())]);
        let text = render(|out| invocation_result(out, &result, false));
        assert!(text.contains("Tool call failed:"));
        assert!(!text.contains("Content 1:"));
    }

    #[test]
    fn test_structured_content_only_when_verbose() {
        let mut result = InvocationResult::success(vec![]);
        result.structured_content = Some(json!({"sum": 8}));

        assert!(!render(|out| invocation_result(out, &result, false)).contains("\"sum\""));
        assert!(render(|out| invocation_result(out, &result, true)).contains("\"sum\": 8"));
    }

    #[test]
    fn test_classified_error_layout() {
        let error = classify("tool 'x' not found");
        let text = render(|out| classified_error(out, "Failed to call tool 'x':", &error));
        let lines: Vec<&str> = text.lines().collect();
        assert_eq!(lines[0], "❌ Failed to call tool 'x':");
        assert!(lines[2].contains("--list-only"));
        assert_eq!(lines.last(), Some(&"   Error: tool 'x' not found"));
    }

    #[test]
    fn test_request_echo_shows_kinds() {
        let mut params = ParameterSet::new();
        params.insert("x".to_string(), json!(5));
        params.insert("operation".to_string(), json!("add"));
        let text = render(|out| request_echo(out, "calculate", &params));
        assert!(text.contains("  x: 5 (integer)"));
        assert!(text.contains("  operation: \"add\" (string)"));

        let empty = render(|out| request_echo(out, "ping", &ParameterSet::new()));
        assert!(empty.contains("Parameters: (none)"));
    }

    #[test]
    fn test_schema_summary() {
        let tool = ToolDescriptor::new(
            "echo",
            "Echo text",
            json!({
                "type": "object",
                "properties": {"message": {"type": "string", "description": "text"}},
                "required": ["message"]
            }),
        );
        let text = render(|out| tool_list(out, &[tool], true));
        assert!(text.contains("  1. echo"));
        assert!(text.contains("Required: message"));
        assert!(text.contains("- message (string) [required]: text"));
    }
}
