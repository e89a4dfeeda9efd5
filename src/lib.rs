//! mcprobe - schema-driven MCP tool invocation client
//!
//! A diagnostic client that connects to one MCP server and lets an operator:
//! - discover its tools, resources and prompts
//! - call a tool directly with JSON arguments
//! - call tools interactively, with arguments collected field by field
//!   from each tool's input schema
//!
//! Failures are classified into a small set of categories, each with
//! remediation hints.

pub mod client;
pub mod collect;
pub mod config;
pub mod core;
pub mod dispatch;
pub mod execution;
pub mod render;
pub mod repl;
