//! Configuration for mcprobe
//!
//! Settings come from, in order of precedence:
//! - command-line flags (and their `MCPROBE_*` environment fallbacks)
//! - an optional YAML config file
//! - built-in defaults
//!
//! The default config file lives in the platform config directory, e.g.
//! `~/.config/mcprobe/config.yaml` on Linux.

use crate::client::{ClientConfig, TransportKind};
use crate::dispatch::Timeouts;
use directories::ProjectDirs;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::time::Duration;
use thiserror::Error;
use tracing::{debug, info};

const APP_QUALIFIER: &str = "dev";
const APP_ORGANIZATION: &str = "mcprobe";
const APP_NAME: &str = "mcprobe";

pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(30);
pub const DEFAULT_CALL_TIMEOUT: Duration = Duration::from_secs(300);

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Failed to read config file {path}: {source}")]
    Read {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("Invalid config file {path}: {source}")]
    Parse {
        path: PathBuf,
        source: serde_yaml::Error,
    },

    #[error("Invalid duration '{0}': use e.g. 500ms, 30s, 5m, 1h or a number of seconds")]
    InvalidDuration(String),

    #[error("{0}")]
    InvalidTransport(String),

    #[error("Server URL is required: use --url, MCPROBE_URL or 'url' in the config file")]
    MissingUrl,

    #[error("Server command is required for stdio: use --command or 'command' in the config file")]
    MissingCommand,
}

pub type Result<T> = std::result::Result<T, ConfigError>;

/// Stdio server command, either one line or pre-split arguments
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum CommandSpec {
    Line(String),
    Args(Vec<String>),
}

impl CommandSpec {
    pub fn into_args(self) -> Vec<String> {
        match self {
            CommandSpec::Line(line) => line.split_whitespace().map(String::from).collect(),
            CommandSpec::Args(args) => args,
        }
    }
}

/// Contents of the YAML config file. Every key is optional.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct FileConfig {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub transport: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub command: Option<CommandSpec>,

    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub headers: BTreeMap<String, String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timeout: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub call_timeout: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub verbose: Option<bool>,
}

impl FileConfig {
    /// Load a config file.
    ///
    /// An explicitly named file must exist; a missing default file just
    /// means "no file settings".
    pub fn load(explicit: Option<&Path>) -> Result<Self> {
        let (path, required) = match explicit {
            Some(path) => (path.to_path_buf(), true),
            None => match default_config_path() {
                Some(path) => (path, false),
                None => return Ok(FileConfig::default()),
            },
        };

        if !required && !path.exists() {
            debug!("No config file at {}, using defaults", path.display());
            return Ok(FileConfig::default());
        }

        info!("Loading config from: {}", path.display());
        let contents = std::fs::read_to_string(&path).map_err(|source| ConfigError::Read {
            path: path.clone(),
            source,
        })?;
        Self::from_yaml(&contents).map_err(|source| ConfigError::Parse { path, source })
    }

    pub fn from_yaml(contents: &str) -> std::result::Result<Self, serde_yaml::Error> {
        if contents.trim().is_empty() {
            return Ok(FileConfig::default());
        }
        serde_yaml::from_str(contents)
    }
}

/// Platform config file location, if the platform has one
pub fn default_config_path() -> Option<PathBuf> {
    ProjectDirs::from(APP_QUALIFIER, APP_ORGANIZATION, APP_NAME)
        .map(|dirs| dirs.config_dir().join("config.yaml"))
}

/// Interactive command history, kept in the platform data directory
pub fn default_history_path() -> Option<PathBuf> {
    ProjectDirs::from(APP_QUALIFIER, APP_ORGANIZATION, APP_NAME)
        .map(|dirs| dirs.data_dir().join("history.txt"))
}

/// Values given on the command line (or through their environment fallbacks)
#[derive(Debug, Clone, Default)]
pub struct Overrides {
    pub url: Option<String>,
    pub transport: Option<String>,
    pub command: Option<String>,
    pub headers: Option<String>,
    pub timeout: Option<String>,
    pub call_timeout: Option<String>,
    pub verbose: Option<bool>,
}

/// Fully resolved settings for one run
#[derive(Debug, Clone, PartialEq)]
pub struct ProbeConfig {
    pub transport: TransportKind,
    pub url: Option<String>,
    pub command: Option<Vec<String>>,
    pub headers: BTreeMap<String, String>,
    pub timeouts: Timeouts,
    pub verbose: bool,
}

impl ProbeConfig {
    /// Layer `overrides` on top of `file`, then check the result is usable
    pub fn resolve(file: FileConfig, overrides: &Overrides) -> Result<Self> {
        let transport = match overrides.transport.as_deref().or(file.transport.as_deref()) {
            Some(name) => name
                .parse::<TransportKind>()
                .map_err(ConfigError::InvalidTransport)?,
            None => TransportKind::default(),
        };

        let timeout = match overrides.timeout.as_deref().or(file.timeout.as_deref()) {
            Some(raw) => parse_duration(raw)?,
            None => DEFAULT_TIMEOUT,
        };
        let call_timeout = match overrides
            .call_timeout
            .as_deref()
            .or(file.call_timeout.as_deref())
        {
            Some(raw) => parse_duration(raw)?,
            None => DEFAULT_CALL_TIMEOUT,
        };

        let mut headers = file.headers;
        if let Some(raw) = overrides.headers.as_deref() {
            headers.extend(parse_headers(raw));
        }

        let url = overrides
            .url
            .clone()
            .or(file.url)
            .filter(|u| !u.trim().is_empty());

        let command = match overrides.command.as_deref() {
            Some(line) => Some(CommandSpec::Line(line.to_string()).into_args()),
            None => file.command.map(CommandSpec::into_args),
        }
        .filter(|args| !args.is_empty());

        match transport {
            TransportKind::Stdio if command.is_none() => return Err(ConfigError::MissingCommand),
            TransportKind::Sse | TransportKind::Http if url.is_none() => {
                return Err(ConfigError::MissingUrl)
            }
            _ => {}
        }

        Ok(ProbeConfig {
            transport,
            url,
            command,
            headers,
            timeouts: Timeouts {
                connection: timeout,
                call: call_timeout,
            },
            verbose: overrides.verbose.or(file.verbose).unwrap_or(true),
        })
    }

    pub fn client_config(&self) -> ClientConfig {
        ClientConfig {
            transport: self.transport,
            url: self.url.clone(),
            command: self.command.clone(),
            headers: self.headers.clone(),
            call_timeout: self.timeouts.call,
        }
    }

    /// URL, or the command line for stdio, for display
    pub fn target(&self) -> String {
        match (self.transport, &self.command, &self.url) {
            (TransportKind::Stdio, Some(command), _) => command.join(" "),
            (_, _, Some(url)) => url.clone(),
            _ => String::new(),
        }
    }
}

/// Parse `500ms`, `30s`, `1.5m`, `2h` or a bare number of seconds
pub fn parse_duration(raw: &str) -> Result<Duration> {
    let trimmed = raw.trim();
    let invalid = || ConfigError::InvalidDuration(raw.to_string());

    let (number, unit) = match trimmed.strip_suffix("ms") {
        Some(n) => (n, "ms"),
        None => match trimmed.char_indices().last() {
            Some((i, c)) if matches!(c, 's' | 'm' | 'h') => (&trimmed[..i], &trimmed[i..]),
            _ => (trimmed, "s"),
        },
    };

    let value: f64 = number.trim().parse().map_err(|_| invalid())?;
    if !value.is_finite() || value <= 0.0 {
        return Err(invalid());
    }
    let secs = match unit {
        "ms" => value / 1000.0,
        "m" => value * 60.0,
        "h" => value * 3600.0,
        _ => value,
    };
    Duration::try_from_secs_f64(secs).map_err(|_| invalid())
}

/// Parse `"k1:v1,k2:v2"`. Pairs are split on the first `:` and trimmed;
/// pairs without a `:` are ignored.
pub fn parse_headers(raw: &str) -> BTreeMap<String, String> {
    raw.split(',')
        .filter_map(|pair| pair.split_once(':'))
        .map(|(key, value)| (key.trim().to_string(), value.trim().to_string()))
        .filter(|(key, _)| !key.is_empty())
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_parse_duration() {
        assert_eq!(parse_duration("30s").unwrap(), Duration::from_secs(30));
        assert_eq!(parse_duration("500ms").unwrap(), Duration::from_millis(500));
        assert_eq!(parse_duration("5m").unwrap(), Duration::from_secs(300));
        assert_eq!(parse_duration("1h").unwrap(), Duration::from_secs(3600));
        assert_eq!(parse_duration("1.5s").unwrap(), Duration::from_millis(1500));
        assert_eq!(parse_duration("45").unwrap(), Duration::from_secs(45));

        for bad in ["", "fast", "-1s", "0", "10x", "NaNs"] {
            assert!(parse_duration(bad).is_err(), "{}", bad);
        }
    }

    #[test]
    fn test_parse_headers() {
        let headers = parse_headers("Authorization: Bearer a:b , X-Trace:1,broken,:empty");
        assert_eq!(headers.len(), 2);
        assert_eq!(headers["Authorization"], "Bearer a:b");
        assert_eq!(headers["X-Trace"], "1");
    }

    #[test]
    fn test_defaults() {
        let overrides = Overrides {
            url: Some("http://localhost:8080/sse".to_string()),
            ..Default::default()
        };
        let config = ProbeConfig::resolve(FileConfig::default(), &overrides).unwrap();
        assert_eq!(config.transport, TransportKind::Sse);
        assert_eq!(config.timeouts.connection, DEFAULT_TIMEOUT);
        assert_eq!(config.timeouts.call, DEFAULT_CALL_TIMEOUT);
        assert!(config.verbose);
        assert_eq!(
            config.client_config().http_timeout(),
            DEFAULT_CALL_TIMEOUT + Duration::from_secs(30)
        );
    }

    #[test]
    fn test_flags_win_over_file() {
        let file = FileConfig::from_yaml(
            r#"
url: http://file.example/mcp
transport: http
timeout: 10s
verbose: false
headers:
  Authorization: Bearer from-file
  X-Team: probes
"#,
        )
        .unwrap();
        let overrides = Overrides {
            url: Some("http://flag.example/mcp".to_string()),
            headers: Some("Authorization: Bearer from-flag".to_string()),
            call_timeout: Some("2m".to_string()),
            ..Default::default()
        };

        let config = ProbeConfig::resolve(file, &overrides).unwrap();
        assert_eq!(config.url.as_deref(), Some("http://flag.example/mcp"));
        assert_eq!(config.transport, TransportKind::Http);
        assert_eq!(config.timeouts.connection, Duration::from_secs(10));
        assert_eq!(config.timeouts.call, Duration::from_secs(120));
        assert!(!config.verbose);
        assert_eq!(config.headers["Authorization"], "Bearer from-flag");
        assert_eq!(config.headers["X-Team"], "probes");
    }

    #[test]
    fn test_missing_target() {
        assert!(matches!(
            ProbeConfig::resolve(FileConfig::default(), &Overrides::default()),
            Err(ConfigError::MissingUrl)
        ));

        let stdio = Overrides {
            transport: Some("stdio".to_string()),
            ..Default::default()
        };
        assert!(matches!(
            ProbeConfig::resolve(FileConfig::default(), &stdio),
            Err(ConfigError::MissingCommand)
        ));
    }

    #[test]
    fn test_stdio_command_from_file() {
        let file = FileConfig::from_yaml("transport: stdio\ncommand: [npx, -y, demo-server]\n")
            .unwrap();
        let config = ProbeConfig::resolve(file, &Overrides::default()).unwrap();
        assert_eq!(
            config.command,
            Some(vec![
                "npx".to_string(),
                "-y".to_string(),
                "demo-server".to_string()
            ])
        );
        assert_eq!(config.target(), "npx -y demo-server");
    }

    #[test]
    fn test_load_explicit_file() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("probe.yaml");
        std::fs::write(&path, "url: http://localhost:3000/mcp\ntransport: http\n").unwrap();

        let file = FileConfig::load(Some(&path)).unwrap();
        assert_eq!(file.url.as_deref(), Some("http://localhost:3000/mcp"));

        let missing = temp_dir.path().join("missing.yaml");
        assert!(matches!(
            FileConfig::load(Some(&missing)),
            Err(ConfigError::Read { .. })
        ));
    }

    #[test]
    fn test_invalid_transport() {
        let overrides = Overrides {
            url: Some("http://localhost".to_string()),
            transport: Some("websocket".to_string()),
            ..Default::default()
        };
        let err = ProbeConfig::resolve(FileConfig::default(), &overrides).unwrap_err();
        assert!(err.to_string().contains("Unsupported transport type 'websocket'"));
    }
}
