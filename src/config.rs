//! Configuration module for tcp-inbox.
//!
//! Supports both command-line arguments and TOML configuration file.
//! CLI arguments take precedence over config file values.

use clap::{Parser, ValueEnum};
use serde::Deserialize;
use std::path::PathBuf;

/// Command-line arguments for the listener
#[derive(Parser, Debug, Default)]
#[command(name = "tcp-inbox")]
#[command(author = "tcp-inbox authors")]
#[command(version = "0.1.0")]
#[command(about = "A thread-per-connection TCP listener", long_about = None)]
pub struct CliArgs {
    /// Path to TOML configuration file
    #[arg(short, long)]
    pub config: Option<PathBuf>,

    /// Host to bind to (e.g., 0.0.0.0)
    #[arg(long)]
    pub host: Option<String>,

    /// Port to bind to
    #[arg(short, long)]
    pub port: Option<u16>,

    /// How received bytes are handled
    #[arg(long, value_enum)]
    pub protocol: Option<ProtocolType>,

    /// Capacity of the single read per connection, in bytes
    #[arg(short = 'b', long)]
    pub buffer_size: Option<usize>,

    /// Listen backlog
    #[arg(long)]
    pub backlog: Option<i32>,

    /// Maximum concurrent connections (0 = unbounded)
    #[arg(short = 'm', long)]
    pub max_connections: Option<usize>,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long)]
    pub log_level: Option<String>,
}

/// What a connection does with the bytes it reads.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize, ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum ProtocolType {
    /// Log the received text, send nothing back.
    Plain,
    /// Extract the request body and answer with a fixed 200 response.
    #[default]
    Http,
}

impl ProtocolType {
    /// Read capacity used when none is configured.
    pub fn default_buffer_size(self) -> usize {
        match self {
            ProtocolType::Plain => 1024,
            ProtocolType::Http => 4096,
        }
    }
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
    #[serde(default = "default_host")]
    pub host: String,
    #[serde(default = "default_port")]
    pub port: u16,
    #[serde(default)]
    pub protocol: ProtocolType,
    #[serde(default = "default_backlog")]
    pub backlog: i32,
    #[serde(default)]
    pub max_connections: usize,
    /// Falls back to the protocol's default when absent
    pub buffer_size: Option<usize>,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
            protocol: ProtocolType::default(),
            backlog: default_backlog(),
            max_connections: 0,
            buffer_size: None,
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

fn default_host() -> String {
    "0.0.0.0".to_string()
}

fn default_port() -> u16 {
    8080
}

fn default_backlog() -> i32 {
    5
}

fn default_log_level() -> String {
    "info".to_string()
}

/// Final resolved configuration
#[derive(Debug, Clone)]
pub struct Config {
    pub host: String,
    pub port: u16,
    pub protocol: ProtocolType,
    pub buffer_size: usize,
    pub backlog: i32,
    pub max_connections: usize,
    pub log_level: String,
}

impl Default for Config {
    fn default() -> Self {
        let protocol = ProtocolType::default();
        Self {
            host: default_host(),
            port: default_port(),
            protocol,
            buffer_size: protocol.default_buffer_size(),
            backlog: default_backlog(),
            max_connections: 0,
            log_level: default_log_level(),
        }
    }
}

impl Config {
    /// Load configuration from CLI args and optional TOML file.
    pub fn load() -> Result<Self, ConfigError> {
        Self::resolve(CliArgs::parse())
    }

    /// Merge parsed CLI args with the TOML file they point at, if any.
    pub fn resolve(cli: CliArgs) -> Result<Self, ConfigError> {
        let toml_config = if let Some(ref config_path) = cli.config {
            let contents = std::fs::read_to_string(config_path)
                .map_err(|e| ConfigError::FileRead(config_path.clone(), e))?;
            toml::from_str(&contents)
                .map_err(|e| ConfigError::TomlParse(config_path.clone(), e))?
        } else {
            TomlConfig::default()
        };

        Self::merge(cli, toml_config)
    }

    fn merge(cli: CliArgs, toml_config: TomlConfig) -> Result<Self, ConfigError> {
        let server = toml_config.server;
        let protocol = cli.protocol.unwrap_or(server.protocol);

        let buffer_size = cli
            .buffer_size
            .or(server.buffer_size)
            .unwrap_or_else(|| protocol.default_buffer_size());
        if buffer_size == 0 {
            return Err(ConfigError::InvalidBufferSize(buffer_size));
        }

        Ok(Config {
            host: cli.host.unwrap_or(server.host),
            port: cli.port.unwrap_or(server.port),
            protocol,
            buffer_size,
            backlog: cli.backlog.unwrap_or(server.backlog),
            max_connections: cli.max_connections.unwrap_or(server.max_connections),
            log_level: cli.log_level.unwrap_or(toml_config.logging.level),
        })
    }

    /// `host:port` as handed to the resolver.
    pub fn listen_address(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

/// Configuration loading errors
#[derive(Debug)]
pub enum ConfigError {
    FileRead(PathBuf, std::io::Error),
    TomlParse(PathBuf, toml::de::Error),
    InvalidBufferSize(usize),
}

impl std::fmt::Display for ConfigError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ConfigError::FileRead(path, e) => {
                write!(f, "Failed to read config file '{}': {}", path.display(), e)
            }
            ConfigError::TomlParse(path, e) => {
                write!(f, "Failed to parse config file '{}': {}", path.display(), e)
            }
            ConfigError::InvalidBufferSize(size) => {
                write!(f, "Invalid buffer size {size}: must be at least 1 byte")
            }
        }
    }
}

impl std::error::Error for ConfigError {}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = Config::resolve(CliArgs::default()).unwrap();
        assert_eq!(config.host, "0.0.0.0");
        assert_eq!(config.port, 8080);
        assert_eq!(config.backlog, 5);
        assert_eq!(config.protocol, ProtocolType::Http);
        assert_eq!(config.buffer_size, 4096);
        assert_eq!(config.max_connections, 0);
        assert_eq!(config.log_level, "info");
        assert_eq!(config.listen_address(), "0.0.0.0:8080");
    }

    #[test]
    fn test_plain_protocol_buffer_default() {
        let cli = CliArgs {
            protocol: Some(ProtocolType::Plain),
            ..Default::default()
        };
        let config = Config::resolve(cli).unwrap();
        assert_eq!(config.buffer_size, 1024);
    }

    #[test]
    fn test_toml_parsing() {
        let toml_str = r#"
            [server]
            host = "127.0.0.1"
            port = 9000
            protocol = "plain"
            backlog = 16
            max_connections = 64
            buffer_size = 2048

            [logging]
            level = "debug"
        "#;

        let config: TomlConfig = toml::from_str(toml_str).unwrap();
        assert_eq!(config.server.host, "127.0.0.1");
        assert_eq!(config.server.port, 9000);
        assert_eq!(config.server.protocol, ProtocolType::Plain);
        assert_eq!(config.server.backlog, 16);
        assert_eq!(config.server.max_connections, 64);
        assert_eq!(config.server.buffer_size, Some(2048));
        assert_eq!(config.logging.level, "debug");
    }

    #[test]
    fn test_cli_overrides_toml() {
        let toml_config: TomlConfig = toml::from_str(
            r#"
            [server]
            port = 9000
            protocol = "plain"
        "#,
        )
        .unwrap();
        let cli = CliArgs {
            port: Some(7000),
            protocol: Some(ProtocolType::Http),
            log_level: Some("trace".to_string()),
            ..Default::default()
        };

        let config = Config::merge(cli, toml_config).unwrap();
        assert_eq!(config.port, 7000);
        assert_eq!(config.protocol, ProtocolType::Http);
        assert_eq!(config.buffer_size, 4096);
        assert_eq!(config.host, "0.0.0.0");
        assert_eq!(config.log_level, "trace");
    }

    #[test]
    fn test_zero_buffer_rejected() {
        let cli = CliArgs {
            buffer_size: Some(0),
            ..Default::default()
        };
        assert!(matches!(
            Config::resolve(cli),
            Err(ConfigError::InvalidBufferSize(0))
        ));
    }

    #[test]
    fn test_unknown_protocol_rejected() {
        let result: Result<TomlConfig, _> = toml::from_str("[server]\nprotocol = \"smtp\"\n");
        assert!(result.is_err());
    }

    #[test]
    fn test_missing_file() {
        let cli = CliArgs {
            config: Some(PathBuf::from("/nonexistent/tcp-inbox.toml")),
            ..Default::default()
        };
        assert!(matches!(
            Config::resolve(cli),
            Err(ConfigError::FileRead(_, _))
        ));
    }
}
