//! Mode dispatch
//!
//! Exactly one mode runs per process. When several intents are given the
//! precedence is list-only, then direct call, then interactive, with
//! discovery as the default.

use crate::client::ProtocolClient;
use crate::collect::input::InputSource;
use crate::collect::{parse_direct, CollectError};
use crate::core::ParameterSet;
use crate::execution::{bounded, Executor, InvocationError};
use crate::render;
use crate::repl::{Repl, ReplError};
use std::io::{self, Write};
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tracing::{debug, info};

#[derive(Error, Debug)]
pub enum DispatchError {
    #[error("Listing failed: {0}")]
    Listing(String),

    #[error(transparent)]
    Invocation(#[from] InvocationError),

    #[error("Tool '{0}' returned an error result")]
    ToolReportedError(String),

    #[error(transparent)]
    Parameters(#[from] CollectError),

    #[error(transparent)]
    Interactive(#[from] ReplError),

    #[error("Output error: {0}")]
    Io(#[from] io::Error),
}

pub type Result<T> = std::result::Result<T, DispatchError>;

/// The two timeout scopes, kept apart on purpose
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Timeouts {
    /// Handshake and listings
    pub connection: Duration,
    /// One tool invocation
    pub call: Duration,
}

impl Default for Timeouts {
    fn default() -> Self {
        Timeouts {
            connection: Duration::from_secs(30),
            call: Duration::from_secs(300),
        }
    }
}

/// What the operator asked for on the command line
#[derive(Debug, Clone, Default)]
pub struct Intents {
    pub list_only: bool,
    pub call: Option<String>,
    pub params: String,
    pub interactive: bool,
}

#[derive(Debug, Clone, PartialEq)]
pub enum Mode {
    ListOnly,
    DirectCall { tool: String, params: ParameterSet },
    Interactive,
    Discovery,
}

impl Mode {
    /// Pick the single mode to run.
    ///
    /// Direct-call parameters are parsed here, before anything touches the
    /// network, so malformed JSON fails fast.
    pub fn select(intents: &Intents) -> Result<Mode> {
        if intents.list_only {
            return Ok(Mode::ListOnly);
        }
        if let Some(tool) = intents.call.as_deref().filter(|t| !t.is_empty()) {
            let params = parse_direct(&intents.params)?;
            return Ok(Mode::DirectCall {
                tool: tool.to_string(),
                params,
            });
        }
        if intents.interactive {
            return Ok(Mode::Interactive);
        }
        Ok(Mode::Discovery)
    }

    /// [`Mode::select`], with a parameter failure printed as a classified error
    pub fn select_or_report(intents: &Intents, out: &mut dyn Write) -> Result<Mode> {
        match Mode::select(intents) {
            Err(DispatchError::Parameters(e)) => {
                render::classified_error(out, "Invalid --params:", &e.classified())?;
                Err(DispatchError::Parameters(e))
            }
            other => other,
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            Mode::ListOnly => "list-only",
            Mode::DirectCall { .. } => "direct-call",
            Mode::Interactive => "interactive",
            Mode::Discovery => "discovery",
        }
    }
}

pub struct Dispatcher {
    client: Arc<dyn ProtocolClient>,
    timeouts: Timeouts,
    verbose: bool,
}

impl Dispatcher {
    pub fn new(client: Arc<dyn ProtocolClient>, timeouts: Timeouts, verbose: bool) -> Self {
        Dispatcher {
            client,
            timeouts,
            verbose,
        }
    }

    pub async fn run(
        &self,
        mode: Mode,
        input: &mut dyn InputSource,
        out: &mut dyn Write,
    ) -> Result<()> {
        info!("Running {} mode", mode.name());
        match mode {
            Mode::ListOnly => self.run_list_only(out).await,
            Mode::DirectCall { tool, params } => self.run_direct_call(&tool, params, out).await,
            Mode::Interactive => self.run_interactive(input, out).await,
            Mode::Discovery => self.run_discovery(out).await,
        }
    }

    async fn run_list_only(&self, out: &mut dyn Write) -> Result<()> {
        writeln!(out)?;
        writeln!(out, "--- Available Tools ---")?;
        if !self.client.server_capabilities().supports_tools() {
            writeln!(out, "Tools capability not supported by server")?;
            return Ok(());
        }

        match bounded(
            self.timeouts.connection,
            "Listing tools",
            self.client.list_tools(),
        )
        .await
        {
            Ok(tools) => {
                render::tool_list(out, &tools, self.verbose)?;
                Ok(())
            }
            Err(error) => {
                render::classified_error(out, "Failed to list tools:", &error)?;
                Err(DispatchError::Listing(error.original_message))
            }
        }
    }

    async fn run_direct_call(
        &self,
        tool: &str,
        params: ParameterSet,
        out: &mut dyn Write,
    ) -> Result<()> {
        if self.verbose {
            render::request_echo(out, tool, &params)?;
        }
        writeln!(out, "Calling tool '{}'...", tool)?;

        // the executor opens its own call-timeout scope
        let executor = Executor::new(self.client.clone(), self.timeouts.call);
        match executor.invoke(tool, params).await {
            Ok(result) => {
                render::invocation_result(out, &result, self.verbose)?;
                if result.succeeded {
                    Ok(())
                } else {
                    Err(DispatchError::ToolReportedError(tool.to_string()))
                }
            }
            Err(e) => {
                writeln!(out)?;
                render::classified_error(
                    out,
                    &format!("Failed to call tool '{}':", tool),
                    &e.classify(),
                )?;
                Err(DispatchError::Invocation(e))
            }
        }
    }

    async fn run_interactive(
        &self,
        input: &mut dyn InputSource,
        out: &mut dyn Write,
    ) -> Result<()> {
        let mut repl = Repl::new(
            self.client.clone(),
            self.timeouts.call,
            self.timeouts.connection,
            self.verbose,
        );
        repl.run(input, out).await?;
        Ok(())
    }

    /// One enumeration pass; a failing section is reported and skipped
    async fn run_discovery(&self, out: &mut dyn Write) -> Result<()> {
        let caps = self.client.server_capabilities();
        let limit = self.timeouts.connection;

        writeln!(out)?;
        writeln!(out, "--- Tools Capability ---")?;
        if caps.supports_tools() {
            writeln!(out, "Requesting list of available tools...")?;
            match bounded(limit, "Listing tools", self.client.list_tools()).await {
                Ok(tools) => render::tool_list(out, &tools, self.verbose)?,
                Err(error) => writeln!(out, "Warning: Tools test failed: {}", error)?,
            }
        } else {
            writeln!(out, "Tools capability not supported by server")?;
        }

        writeln!(out)?;
        writeln!(out, "--- Resources Capability ---")?;
        if caps.supports_resources() {
            writeln!(out, "Requesting list of available resources...")?;
            match bounded(limit, "Listing resources", self.client.list_resources()).await {
                Ok(resources) => render::resource_list(out, &resources, self.verbose)?,
                Err(error) => writeln!(out, "Warning: Resources test failed: {}", error)?,
            }

            writeln!(out, "Requesting list of available resource templates...")?;
            let templates = bounded(
                limit,
                "Listing resource templates",
                self.client.list_resource_templates(),
            )
            .await;
            match templates {
                Ok(templates) => render::resource_template_list(out, &templates, self.verbose)?,
                Err(error) => writeln!(
                    out,
                    "Warning: Failed to list resource templates: {}",
                    error
                )?,
            }
        } else {
            writeln!(out, "Resources capability not supported by server")?;
        }

        writeln!(out)?;
        writeln!(out, "--- Prompts Capability ---")?;
        if caps.supports_prompts() {
            writeln!(out, "Requesting list of available prompts...")?;
            match bounded(limit, "Listing prompts", self.client.list_prompts()).await {
                Ok(prompts) => render::prompt_list(out, &prompts, self.verbose)?,
                Err(error) => writeln!(out, "Warning: Prompts test failed: {}", error)?,
            }
        } else {
            writeln!(out, "Prompts capability not supported by server")?;
        }

        debug!("Discovery pass complete");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_precedence() {
        let all = Intents {
            list_only: true,
            call: Some("echo".to_string()),
            params: "not json".to_string(),
            interactive: true,
        };
        assert_eq!(Mode::select(&all).unwrap(), Mode::ListOnly);

        let call_and_interactive = Intents {
            call: Some("echo".to_string()),
            params: r#"{"message": "hi"}"#.to_string(),
            interactive: true,
            ..Default::default()
        };
        match Mode::select(&call_and_interactive).unwrap() {
            Mode::DirectCall { tool, params } => {
                assert_eq!(tool, "echo");
                assert_eq!(params.get("message"), Some(&json!("hi")));
            }
            other => panic!("unexpected mode {:?}", other),
        }

        let interactive = Intents {
            interactive: true,
            ..Default::default()
        };
        assert_eq!(Mode::select(&interactive).unwrap(), Mode::Interactive);
        assert_eq!(Mode::select(&Intents::default()).unwrap(), Mode::Discovery);
    }

    #[test]
    fn test_direct_call_params_validated_up_front() {
        let intents = Intents {
            call: Some("echo".to_string()),
            params: "{broken".to_string(),
            ..Default::default()
        };
        assert!(matches!(
            Mode::select(&intents),
            Err(DispatchError::Parameters(CollectError::InvalidJson { .. }))
        ));
    }
}
