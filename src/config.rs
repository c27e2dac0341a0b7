//! Configuration module for the tcp-frames server.
//!
//! Supports both command-line arguments and TOML configuration file.
//! CLI arguments take precedence over config file values.

use crate::error::ConfigError;
use crate::runtime::{ServerContext, READ_BUFFER_SIZE};
use clap::{Parser, ValueEnum};
use serde::Deserialize;
use std::net::IpAddr;
use std::path::PathBuf;
use std::time::Duration;

/// Demo protocol served by the binary.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum ProtocolType {
    /// Raw echo, no framing
    Echo,
    /// CRLF-delimited commands
    Line,
}

/// Command-line arguments for the server
#[derive(Parser, Debug)]
#[command(name = "tcp-frames")]
#[command(version)]
#[command(about = "A thread-per-connection framed TCP server", long_about = None)]
pub struct CliArgs {
    /// Path to TOML configuration file
    #[arg(short, long)]
    pub config: Option<PathBuf>,

    /// Address to bind to (e.g., 0.0.0.0)
    #[arg(short, long)]
    pub bind: Option<String>,

    /// Base listen port
    #[arg(short, long)]
    pub port: Option<u16>,

    /// Number of consecutive ports to listen on
    #[arg(short = 'n', long)]
    pub port_count: Option<i64>,

    /// Default per-read timeout in seconds
    #[arg(short = 't', long)]
    pub read_timeout: Option<u64>,

    /// Upper bound on the accept loop's wait, in milliseconds
    #[arg(long)]
    pub poll_interval_ms: Option<u64>,

    /// Name sent to clients on connect
    #[arg(long)]
    pub app_name: Option<String>,

    /// Protocol served to clients
    #[arg(long, value_enum)]
    pub protocol: Option<ProtocolType>,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long, default_value = "info")]
    pub log_level: String,
}

/// TOML configuration file structure
#[derive(Debug, Deserialize, Default)]
pub struct TomlConfig {
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
}

/// Server-related configuration
#[derive(Debug, Deserialize)]
pub struct ServerConfig {
    #[serde(default = "default_bind")]
    pub bind: String,
    #[serde(default = "default_port")]
    pub port: u16,
    #[serde(default = "default_port_count")]
    pub port_count: i64,
    /// Seconds
    #[serde(default = "default_read_timeout")]
    pub read_timeout: u64,
    #[serde(default = "default_poll_interval_ms")]
    pub poll_interval_ms: u64,
    pub app_name: Option<String>,
    #[serde(default = "default_protocol")]
    pub protocol: ProtocolType,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind: default_bind(),
            port: default_port(),
            port_count: default_port_count(),
            read_timeout: default_read_timeout(),
            poll_interval_ms: default_poll_interval_ms(),
            app_name: None,
            protocol: default_protocol(),
        }
    }
}

/// Logging configuration
#[derive(Debug, Deserialize)]
pub struct LoggingConfig {
    /// Log level
    #[serde(default = "default_log_level")]
    pub level: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
        }
    }
}

fn default_bind() -> String {
    "0.0.0.0".to_string()
}

fn default_port() -> u16 {
    1066
}

fn default_port_count() -> i64 {
    1
}

fn default_read_timeout() -> u64 {
    40
}

fn default_poll_interval_ms() -> u64 {
    2000
}

fn default_protocol() -> ProtocolType {
    ProtocolType::Line
}

fn default_log_level() -> String {
    "info".to_string()
}

/// Final resolved configuration
#[derive(Debug, Clone)]
pub struct Config {
    pub bind: IpAddr,
    pub port: u16,
    pub port_count: u16,
    pub read_timeout: Duration,
    pub poll_interval: Duration,
    pub app_name: Option<String>,
    pub protocol: ProtocolType,
    pub log_level: String,
}

impl Config {
    /// Load configuration from CLI args and optional TOML file.
    /// CLI arguments take precedence over TOML file values.
    pub fn load() -> Result<Self, ConfigError> {
        let cli = CliArgs::parse();

        let toml_config = match cli.config {
            Some(ref config_path) => {
                let contents =
                    std::fs::read_to_string(config_path).map_err(|source| ConfigError::FileRead {
                        path: config_path.clone(),
                        source,
                    })?;
                toml::from_str(&contents).map_err(|source| ConfigError::TomlParse {
                    path: config_path.clone(),
                    source,
                })?
            }
            None => TomlConfig::default(),
        };

        Self::resolve(cli, toml_config)
    }

    /// Merge CLI args over TOML values and validate the result.
    pub fn resolve(cli: CliArgs, toml_config: TomlConfig) -> Result<Self, ConfigError> {
        let server = toml_config.server;

        let bind_str = cli.bind.unwrap_or(server.bind);
        let bind: IpAddr = bind_str
            .parse()
            .map_err(|_| ConfigError::Invalid(format!("bind address '{bind_str}'")))?;

        // Non-positive counts fall back to a single port
        let port_count = cli.port_count.unwrap_or(server.port_count).max(1);
        let port_count = u16::try_from(port_count)
            .map_err(|_| ConfigError::Invalid(format!("port count {port_count}")))?;

        let port = cli.port.unwrap_or(server.port);
        if u32::from(port) + u32::from(port_count) - 1 > u32::from(u16::MAX) {
            return Err(ConfigError::Invalid(format!(
                "port range {port}+{port_count} exceeds {}",
                u16::MAX
            )));
        }

        let read_timeout = cli.read_timeout.unwrap_or(server.read_timeout);
        if read_timeout == 0 {
            return Err(ConfigError::Invalid("read timeout must be positive".to_string()));
        }

        let poll_interval_ms = cli.poll_interval_ms.unwrap_or(server.poll_interval_ms);
        if poll_interval_ms == 0 {
            return Err(ConfigError::Invalid("poll interval must be positive".to_string()));
        }

        Ok(Config {
            bind,
            port,
            port_count,
            read_timeout: Duration::from_secs(read_timeout),
            poll_interval: Duration::from_millis(poll_interval_ms),
            app_name: cli.app_name.or(server.app_name),
            protocol: cli.protocol.unwrap_or(server.protocol),
            log_level: if cli.log_level != "info" {
                cli.log_level
            } else {
                toml_config.logging.level
            },
        })
    }

    /// Shared per-session context derived from this configuration.
    pub fn context(&self) -> ServerContext {
        ServerContext {
            app_name: self.app_name.clone(),
            read_timeout: self.read_timeout,
            read_buffer_size: READ_BUFFER_SIZE,
        }
    }
}
