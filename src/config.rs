//! Configuration module for the sandbox server.
//!
//! Supports both command-line arguments and TOML configuration file.
//! CLI arguments take precedence over config file values.

use clap::Parser;
use serde::Deserialize;
use std::path::PathBuf;
use tracing::warn;

/// Default number of threads, also used as the listen backlog
pub const DEFAULT_THREADS: usize = 5;

/// Default per-read buffer size in bytes
pub const DEFAULT_BUFFER_SIZE: usize = 1024;

/// Command-line arguments for the sandbox server
#[derive(Parser, Debug, Default)]
#[command(name = "sandbox-server")]
#[command(version)]
#[command(
    about = "Simple sandbox server: scans and quarantines local files on request",
    long_about = None
)]
pub struct CliArgs {
    /// Path to TOML configuration file
    #[arg(short, long)]
    pub config: Option<PathBuf>,

    /// Address to bind to
    #[arg(long)]
    pub host: Option<String>,

    /// Port to bind to
    #[arg(short, long)]
    pub port: Option<u16>,

    /// Number of logical threads (the number of simultaneous pending connections)
    #[arg(short, long, allow_negative_numbers = true)]
    pub threads: Option<i64>,

    /// Cap on concurrently running connection handlers (unbounded if unset)
    #[arg(long)]
    pub max_connections: Option<usize>,

    /// Size of the single read performed per message
    #[arg(long)]
    pub buffer_size: Option<usize>,

    /// Path where the quarantine files will be stored
    #[arg(short, long)]
    pub quarantine_dir: Option<PathBuf>,

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
    pub quarantine: QuarantineConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
}

/// Server-related configuration
#[derive(Debug, Deserialize)]
pub struct ServerConfig {
    /// Address to bind to
    #[serde(default = "default_host")]
    pub host: String,
    /// Port to bind to
    #[serde(default = "default_port")]
    pub port: u16,
    /// Number of logical threads
    #[serde(default = "default_threads")]
    pub threads: i64,
    /// Cap on concurrent handlers
    pub max_connections: Option<usize>,
    /// Per-read buffer size
    #[serde(default = "default_buffer_size")]
    pub buffer_size: usize,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
            threads: default_threads(),
            max_connections: None,
            buffer_size: default_buffer_size(),
        }
    }
}

/// Quarantine-related configuration
#[derive(Debug, Deserialize)]
pub struct QuarantineConfig {
    /// Directory receiving quarantined files
    #[serde(default = "default_quarantine_dir")]
    pub directory: PathBuf,
}

impl Default for QuarantineConfig {
    fn default() -> Self {
        Self {
            directory: default_quarantine_dir(),
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
    "127.0.0.1".to_string()
}

fn default_port() -> u16 {
    15000
}

fn default_threads() -> i64 {
    DEFAULT_THREADS as i64
}

fn default_buffer_size() -> usize {
    DEFAULT_BUFFER_SIZE
}

fn default_quarantine_dir() -> PathBuf {
    PathBuf::from("./quarantine_files")
}

fn default_log_level() -> String {
    "info".to_string()
}

/// Final resolved configuration
#[derive(Debug, Clone)]
pub struct Config {
    pub host: String,
    pub port: u16,
    pub threads: usize,
    pub max_connections: Option<usize>,
    pub buffer_size: usize,
    pub quarantine_dir: PathBuf,
    pub log_level: String,
}

impl Default for Config {
    fn default() -> Self {
        Config::merge(CliArgs::default(), TomlConfig::default())
    }
}

impl Config {
    /// Load configuration from CLI args and optional TOML file.
    /// CLI arguments take precedence over TOML file values.
    pub fn load() -> Result<Self, ConfigError> {
        let cli = CliArgs::parse();

        // Load TOML config if specified
        let toml_config = if let Some(ref config_path) = cli.config {
            let contents = std::fs::read_to_string(config_path)
                .map_err(|e| ConfigError::FileRead(config_path.clone(), e))?;
            toml::from_str(&contents)
                .map_err(|e| ConfigError::TomlParse(config_path.clone(), e))?
        } else {
            TomlConfig::default()
        };

        Ok(Config::merge(cli, toml_config))
    }

    /// Merge CLI args with TOML config (CLI takes precedence)
    pub fn merge(cli: CliArgs, toml_config: TomlConfig) -> Self {
        let threads = cli.threads.unwrap_or(toml_config.server.threads);
        let threads = if threads < 1 {
            warn!(threads, "Threads number must be greater than 0");
            DEFAULT_THREADS
        } else {
            threads as usize
        };

        Config {
            host: cli.host.unwrap_or(toml_config.server.host),
            port: cli.port.unwrap_or(toml_config.server.port),
            threads,
            max_connections: cli
                .max_connections
                .or(toml_config.server.max_connections)
                .filter(|&n| n > 0),
            buffer_size: cli
                .buffer_size
                .unwrap_or(toml_config.server.buffer_size)
                .max(1),
            quarantine_dir: cli
                .quarantine_dir
                .unwrap_or(toml_config.quarantine.directory),
            log_level: if !cli.log_level.is_empty() && cli.log_level != "info" {
                cli.log_level
            } else {
                toml_config.logging.level
            },
        }
    }

    /// `host:port` as passed to the socket layer
    pub fn listen_addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

/// Configuration loading errors
#[derive(Debug)]
pub enum ConfigError {
    FileRead(PathBuf, std::io::Error),
    TomlParse(PathBuf, toml::de::Error),
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
        }
    }
}

impl std::error::Error for ConfigError {}
