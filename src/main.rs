//! mcprobe CLI
//!
//! Connects to one MCP server, reports the handshake, then runs exactly one
//! mode: list-only, direct call, interactive, or discovery (the default).

use anyhow::{anyhow, Context, Result};
use clap::Parser;
use mcprobe::client::{self, ClientError, ProtocolClient, CLIENT_NAME, PROTOCOL_VERSION};
use mcprobe::collect::input::{InputSession, InputSource, LineEditor};
use mcprobe::config::{default_history_path, FileConfig, Overrides, ProbeConfig};
use mcprobe::dispatch::{Dispatcher, Intents, Mode};
use mcprobe::execution::bounded;
use mcprobe::render::{self, ConnectionSummary};
use std::io::{self, IsTerminal, Write};
use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;
use tracing::{debug, error, info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[derive(Parser)]
#[command(name = "mcprobe")]
#[command(about = "Discover and invoke tools on an MCP server", long_about = None)]
#[command(version)]
struct Cli {
    /// Server URL (SSE endpoint or streamable HTTP endpoint)
    #[arg(short, long, env = "MCPROBE_URL")]
    url: Option<String>,

    /// Transport: sse, http or stdio
    #[arg(short, long, env = "MCPROBE_TRANSPORT")]
    transport: Option<String>,

    /// Server command line for the stdio transport
    #[arg(long)]
    command: Option<String>,

    /// Extra HTTP headers as "key1:value1,key2:value2"
    #[arg(long, env = "MCPROBE_HEADERS")]
    headers: Option<String>,

    /// Connection, initialization and listing timeout (e.g. 30s)
    #[arg(long, env = "MCPROBE_TIMEOUT")]
    timeout: Option<String>,

    /// Timeout for a single tool call (e.g. 300s, 5m)
    #[arg(long, env = "MCPROBE_CALL_TIMEOUT")]
    call_timeout: Option<String>,

    /// Verbose output (true/false)
    #[arg(short, long, action = clap::ArgAction::Set)]
    verbose: Option<bool>,

    /// Call this tool directly and exit
    #[arg(long)]
    call: Option<String>,

    /// JSON object of arguments for --call
    #[arg(long, default_value = "{}")]
    params: String,

    /// Only list the available tools
    #[arg(long)]
    list_only: bool,

    /// Interactive tool calling
    #[arg(short, long)]
    interactive: bool,

    /// Path to a YAML config file
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Log level for diagnostics on stderr
    #[arg(long, default_value = "warn")]
    log_level: String,
}

impl Cli {
    fn overrides(&self) -> Overrides {
        Overrides {
            url: self.url.clone(),
            transport: self.transport.clone(),
            command: self.command.clone(),
            headers: self.headers.clone(),
            timeout: self.timeout.clone(),
            call_timeout: self.call_timeout.clone(),
            verbose: self.verbose,
        }
    }

    fn intents(&self) -> Intents {
        Intents {
            list_only: self.list_only,
            call: self.call.clone(),
            params: self.params.clone(),
            interactive: self.interactive,
        }
    }
}

/// Initialize logging; diagnostics go to stderr, operator output to stdout
fn init_logging(level: &str) {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| format!("{}={}", env!("CARGO_CRATE_NAME"), level).into()),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(io::stderr))
        .init();
}

/// Line editing for interactive sessions on a terminal, plain stdin otherwise
fn operator_input(mode: &Mode) -> Box<dyn InputSource> {
    if !matches!(mode, Mode::Interactive) || !io::stdin().is_terminal() {
        return Box::new(InputSession::stdin());
    }
    match LineEditor::new(default_history_path()) {
        Ok(editor) => Box::new(editor),
        Err(e) => {
            warn!("Line editor unavailable, reading plain stdin: {}", e);
            Box::new(InputSession::stdin())
        }
    }
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();
    init_logging(&cli.log_level);

    match run(cli).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            error!("{:#}", e);
            eprintln!("Error: {:#}", e);
            ExitCode::FAILURE
        }
    }
}

async fn run(cli: Cli) -> Result<()> {
    let file = FileConfig::load(cli.config.as_deref())?;
    let config = ProbeConfig::resolve(file, &cli.overrides())?;
    debug!("Resolved configuration: {:?}", config.transport);

    let stdout = io::stdout();
    let mut out = stdout.lock();

    // bad --params must fail before anything touches the network
    let mode = Mode::select_or_report(&cli.intents(), &mut out)?;

    let target = config.target();
    render::banner(
        &mut out,
        &ConnectionSummary {
            target: &target,
            transport: config.transport,
            timeout: config.timeouts.connection,
            call_timeout: config.timeouts.call,
            headers: &config.headers,
        },
        config.verbose,
    )?;

    writeln!(out, "Connecting to MCP server...")?;
    out.flush()?;
    let client_config = config.client_config();
    let connected = bounded(config.timeouts.connection, "Connecting", async {
        let client = client::connect(&client_config).await?;
        let init = client.initialize().await?;
        Ok::<_, ClientError>((client, init))
    })
    .await;

    let (client, init) = match connected {
        Ok(connected) => connected,
        Err(error) => {
            render::classified_error(&mut out, "Failed to connect to MCP server:", &error)?;
            return Err(anyhow!("connection failed: {}", error.original_message));
        }
    };

    if let Some(endpoint) = client.message_endpoint() {
        writeln!(out, "SSE POST URL: {}", endpoint)?;
    }
    render::init_report(&mut out, PROTOCOL_VERSION, CLIENT_NAME, &init, config.verbose)?;
    info!("Connected to {}", init.server_info);

    let client: Arc<dyn ProtocolClient> = Arc::new(client);
    let dispatcher = Dispatcher::new(client.clone(), config.timeouts, config.verbose);
    let mut input = operator_input(&mode);
    let outcome = dispatcher.run(mode, input.as_mut(), &mut out).await;
    drop(input);

    client.close().await;
    writeln!(out, "\n=== Finished ===")?;
    out.flush()?;

    outcome.context("mcprobe run failed")
}
