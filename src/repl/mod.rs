//! Interactive tool calling
//!
//! A line-oriented command loop over one [`InputSource`]. Commands:
//! - `list`, `ls`, `l`: refresh and print the tool catalogue
//! - `call`, `c`: pick a tool, optionally `call <n>` / `call <name>`
//! - a bare number: same as `call <n>`
//! - `help`, `h`, `?` and `exit`, `quit`, `q`
//!
//! Failures inside the loop are reported inline; only end of input or
//! `exit` ends the session.

use crate::client::ProtocolClient;
use crate::collect::input::InputSource;
use crate::collect::{collect_guided, CollectError};
use crate::core::classify::ClassifiedError;
use crate::core::ToolDescriptor;
use crate::execution::{bounded, Executor};
use crate::render;
use std::io::{self, Write};
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tracing::{debug, info};

#[derive(Error, Debug)]
pub enum ReplError {
    #[error("Failed to list tools: {0}")]
    Catalogue(String),

    #[error("Output error: {0}")]
    Io(#[from] io::Error),
}

pub type Result<T> = std::result::Result<T, ReplError>;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReplState {
    Listening,
    AwaitingToolSelection,
    AwaitingParameterInput,
    Exiting,
}

/// How the operator named a tool
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Selection {
    /// 1-based position in the catalogue, as typed
    Index(i64),
    Name(String),
}

impl Selection {
    pub fn parse(token: &str) -> Self {
        match token.parse::<i64>() {
            Ok(n) => Selection::Index(n),
            Err(_) => Selection::Name(token.to_string()),
        }
    }

    /// Position in `tools`, or a one-line reason
    pub fn resolve(&self, tools: &[ToolDescriptor]) -> std::result::Result<usize, String> {
        match self {
            Selection::Index(n) => {
                if *n >= 1 && (*n as usize) <= tools.len() {
                    Ok(*n as usize - 1)
                } else {
                    Err(format!(
                        "Invalid tool number: {} (choose 1-{})",
                        n,
                        tools.len()
                    ))
                }
            }
            Selection::Name(name) => tools
                .iter()
                .position(|t| t.name == *name)
                .ok_or_else(|| format!("Unknown tool: {}", name)),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    Empty,
    List,
    Call(Option<Selection>),
    Help,
    Exit,
    Unknown(String),
}

impl Command {
    pub fn parse(line: &str) -> Self {
        let mut tokens = line.split_whitespace();
        let Some(first) = tokens.next() else {
            return Command::Empty;
        };

        match first.to_lowercase().as_str() {
            "list" | "ls" | "l" => Command::List,
            "call" | "c" => Command::Call(tokens.next().map(Selection::parse)),
            "help" | "h" | "?" => Command::Help,
            "exit" | "quit" | "q" => Command::Exit,
            _ => match first.parse::<i64>() {
                Ok(n) => Command::Call(Some(Selection::Index(n))),
                Err(_) => Command::Unknown(first.to_string()),
            },
        }
    }
}

pub struct Repl {
    client: Arc<dyn ProtocolClient>,
    executor: Executor,
    listing_timeout: Duration,
    verbose: bool,
    catalogue: Vec<ToolDescriptor>,
    state: ReplState,
}

impl Repl {
    pub fn new(
        client: Arc<dyn ProtocolClient>,
        call_timeout: Duration,
        listing_timeout: Duration,
        verbose: bool,
    ) -> Self {
        Repl {
            executor: Executor::new(client.clone(), call_timeout),
            client,
            listing_timeout,
            verbose,
            catalogue: Vec::new(),
            state: ReplState::Listening,
        }
    }

    pub fn state(&self) -> ReplState {
        self.state
    }

    pub fn catalogue(&self) -> &[ToolDescriptor] {
        &self.catalogue
    }

    /// Run the session until `exit` or end of input.
    ///
    /// Only a failure to fetch the initial catalogue is returned as an
    /// error; everything after that is reported inline.
    pub async fn run(&mut self, input: &mut dyn InputSource, out: &mut dyn Write) -> Result<()> {
        writeln!(out)?;
        writeln!(out, "=== Interactive Tool Calling Mode ===")?;
        writeln!(out, "Type 'help' for commands, 'exit' to quit")?;

        if !self.client.server_capabilities().supports_tools() {
            writeln!(out, "Tools capability not supported by server")?;
            return Ok(());
        }

        if let Err(error) = self.refresh_catalogue().await {
            render::classified_error(out, "Failed to list tools:", &error)?;
            return Err(ReplError::Catalogue(error.original_message));
        }
        if self.catalogue.is_empty() {
            writeln!(out, "No tools available on this server")?;
            return Ok(());
        }
        render::tool_catalogue(out, &self.catalogue)?;

        self.state = ReplState::Listening;
        while self.state != ReplState::Exiting {
            writeln!(out)?;
            let Some(line) = input.read_line("> ", out)? else {
                writeln!(out)?;
                self.state = ReplState::Exiting;
                break;
            };
            if !line.trim().is_empty() {
                input.add_history(line.trim());
            }
            self.handle_line(&line, input, out).await?;
        }

        writeln!(out, "Exiting interactive mode...")?;
        info!("Interactive session finished");
        Ok(())
    }

    /// Process one command line from the `Listening` state
    pub async fn handle_line(
        &mut self,
        line: &str,
        input: &mut dyn InputSource,
        out: &mut dyn Write,
    ) -> Result<()> {
        let command = Command::parse(line);
        debug!("Command: {:?}", command);

        match command {
            Command::Empty => {}
            Command::List => match self.refresh_catalogue().await {
                Ok(()) => render::tool_catalogue(out, &self.catalogue)?,
                Err(error) => render::classified_error(out, "Failed to list tools:", &error)?,
            },
            Command::Call(None) => self.select_and_call(input, out).await?,
            Command::Call(Some(selection)) => match selection.resolve(&self.catalogue) {
                Ok(index) => self.call_tool(index, input, out).await?,
                Err(reason) => writeln!(out, "{}", reason)?,
            },
            Command::Help => render::interactive_help(out)?,
            Command::Exit => self.state = ReplState::Exiting,
            Command::Unknown(token) => {
                writeln!(out, "Unknown command: {} (type 'help' for commands)", token)?
            }
        }
        Ok(())
    }

    async fn refresh_catalogue(&mut self) -> std::result::Result<(), ClassifiedError> {
        let tools =
            bounded(self.listing_timeout, "Listing tools", self.client.list_tools()).await?;
        debug!("Catalogue holds {} tools", tools.len());
        self.catalogue = tools;
        Ok(())
    }

    async fn select_and_call(
        &mut self,
        input: &mut dyn InputSource,
        out: &mut dyn Write,
    ) -> Result<()> {
        self.state = ReplState::AwaitingToolSelection;
        render::tool_catalogue(out, &self.catalogue)?;
        writeln!(out)?;
        let Some(line) = input.read_line("Enter tool number or name (or 'cancel'): ", out)? else {
            self.state = ReplState::Exiting;
            return Ok(());
        };

        let token = line.trim();
        if token.is_empty() || token.eq_ignore_ascii_case("cancel") {
            writeln!(out, "Cancelled")?;
            self.state = ReplState::Listening;
            return Ok(());
        }

        match Selection::parse(token).resolve(&self.catalogue) {
            Ok(index) => self.call_tool(index, input, out).await,
            Err(reason) => {
                writeln!(out, "{}", reason)?;
                self.state = ReplState::Listening;
                Ok(())
            }
        }
    }

    /// Collect, invoke and render one call, then return to `Listening`
    async fn call_tool(
        &mut self,
        index: usize,
        input: &mut dyn InputSource,
        out: &mut dyn Write,
    ) -> Result<()> {
        self.state = ReplState::AwaitingParameterInput;
        let tool = self.catalogue[index].clone();

        writeln!(out)?;
        writeln!(out, "Calling tool: {}", tool.name)?;
        if !tool.description.is_empty() {
            writeln!(out, "Description: {}", tool.description)?;
        }
        writeln!(out)?;

        let params = match collect_guided(&tool.schema(), input, out) {
            Ok(params) => params,
            Err(CollectError::Io(e)) => return Err(ReplError::Io(e)),
            Err(e) => {
                writeln!(out)?;
                render::classified_error(
                    out,
                    &format!("Parameter collection failed for '{}':", tool.name),
                    &e.classified(),
                )?;
                self.state = match e {
                    CollectError::InputClosed => ReplState::Exiting,
                    _ => ReplState::Listening,
                };
                return Ok(());
            }
        };

        if self.verbose {
            render::request_echo(out, &tool.name, &params)?;
        }

        match self.executor.invoke(&tool.name, params).await {
            Ok(result) => render::invocation_result(out, &result, self.verbose)?,
            Err(e) => {
                writeln!(out)?;
                render::classified_error(
                    out,
                    &format!("Failed to call tool '{}':", tool.name),
                    &e.classify(),
                )?;
            }
        }

        self.state = ReplState::Listening;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_command_parsing() {
        assert_eq!(Command::parse(""), Command::Empty);
        assert_eq!(Command::parse("   "), Command::Empty);
        assert_eq!(Command::parse("ls"), Command::List);
        assert_eq!(Command::parse("L"), Command::List);
        assert_eq!(Command::parse("call"), Command::Call(None));
        assert_eq!(
            Command::parse("c 3"),
            Command::Call(Some(Selection::Index(3)))
        );
        assert_eq!(Command::parse("3"), Command::Call(Some(Selection::Index(3))));
        assert_eq!(
            Command::parse("call echo"),
            Command::Call(Some(Selection::Name("echo".to_string())))
        );
        assert_eq!(Command::parse("?"), Command::Help);
        assert_eq!(Command::parse("QUIT"), Command::Exit);
        assert_eq!(
            Command::parse("echo"),
            Command::Unknown("echo".to_string())
        );
    }

    #[test]
    fn test_selection_bounds() {
        let tools = vec![
            ToolDescriptor::new("a", "", serde_json::json!({})),
            ToolDescriptor::new("b", "", serde_json::json!({})),
        ];
        assert_eq!(Selection::Index(2).resolve(&tools), Ok(1));
        assert_eq!(Selection::Name("a".to_string()).resolve(&tools), Ok(0));
        assert!(Selection::Index(0).resolve(&tools).is_err());
        assert!(Selection::Index(3).resolve(&tools).is_err());
        assert!(Selection::Index(-1).resolve(&tools).is_err());
        assert!(Selection::Name("zzz".to_string()).resolve(&tools).is_err());
    }
}
