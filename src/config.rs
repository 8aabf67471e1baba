//! Configuration management for the Athena MCP server.
//!
//! Handles loading configuration from TOML files and environment variables.
//! Precedence is CLI flags, then the config file, then the environment.

use crate::error::{AthenaError, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::str::FromStr;
use url::Url;

/// Main configuration structure.
#[derive(Debug, Clone, Serialize, Deserialize, Default, PartialEq)]
pub struct Config {
    /// Athena connection settings.
    #[serde(default)]
    pub athena: AthenaConfig,

    /// Status polling behaviour.
    #[serde(default)]
    pub polling: PollingConfig,

    /// Transport settings.
    #[serde(default)]
    pub server: ServerConfig,

    /// Log output settings.
    #[serde(default)]
    pub logging: LoggingConfig,
}

/// Athena connection settings.
#[derive(Debug, Clone, Serialize, Deserialize, Default, PartialEq, Eq)]
pub struct AthenaConfig {
    /// AWS region (e.g., "us-east-1"). Falls back to the AWS provider chain.
    pub region: Option<String>,

    /// Athena workgroup. Athena uses "primary" when unset.
    pub workgroup: Option<String>,

    /// S3 location for query results (e.g., "s3://bucket/prefix/").
    pub output_location: Option<String>,

    /// Data catalog. Athena uses "AwsDataCatalog" when unset.
    pub catalog: Option<String>,
}

impl AthenaConfig {
    /// Merges another config into this one, with the other taking precedence.
    pub fn merge(&mut self, other: &AthenaConfig) {
        if other.region.is_some() {
            self.region = other.region.clone();
        }
        if other.workgroup.is_some() {
            self.workgroup = other.workgroup.clone();
        }
        if other.output_location.is_some() {
            self.output_location = other.output_location.clone();
        }
        if other.catalog.is_some() {
            self.catalog = other.catalog.clone();
        }
    }

    /// Applies environment variables (AWS_REGION, ATHENA_*) as defaults.
    pub fn apply_env_defaults(&mut self) {
        self.apply_defaults_from(|key| std::env::var(key).ok());
    }

    fn apply_defaults_from(&mut self, lookup: impl Fn(&str) -> Option<String>) {
        if self.region.is_none() {
            self.region = lookup("AWS_REGION").or_else(|| lookup("AWS_DEFAULT_REGION"));
        }
        if self.workgroup.is_none() {
            self.workgroup = lookup("ATHENA_WORKGROUP");
        }
        if self.output_location.is_none() {
            self.output_location = lookup("ATHENA_OUTPUT_LOCATION");
        }
        if self.catalog.is_none() {
            self.catalog = lookup("ATHENA_CATALOG");
        }
    }

    /// Checks that the output location, if set, is an `s3://bucket/...` URL.
    pub fn validate(&self) -> Result<()> {
        let Some(location) = &self.output_location else {
            return Ok(());
        };

        let url = Url::parse(location).map_err(|e| {
            AthenaError::config(format!("Invalid output_location '{location}': {e}"))
        })?;
        if url.scheme() != "s3" {
            return Err(AthenaError::config(format!(
                "Invalid output_location scheme '{}'. Expected 's3'",
                url.scheme()
            )));
        }
        if url.host_str().map_or(true, str::is_empty) {
            return Err(AthenaError::config(format!(
                "output_location '{location}' is missing a bucket name"
            )));
        }
        Ok(())
    }
}

/// Status polling behaviour. Operator-level only; tools cannot change it.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct PollingConfig {
    /// Delay before the second status lookup, in milliseconds.
    #[serde(default = "default_initial_interval_ms")]
    pub initial_interval_ms: u64,

    /// Ceiling the delay doubles up to, in milliseconds.
    #[serde(default = "default_max_interval_ms")]
    pub max_interval_ms: u64,

    /// Consecutive transient failures tolerated before giving up.
    #[serde(default = "default_max_transient_retries")]
    pub max_transient_retries: u32,
}

/// Bounds for poll intervals, in milliseconds.
pub const MIN_POLL_INTERVAL_MS: u64 = 50;
pub const MAX_POLL_INTERVAL_MS: u64 = 1000;

fn default_initial_interval_ms() -> u64 {
    250
}

fn default_max_interval_ms() -> u64 {
    1000
}

fn default_max_transient_retries() -> u32 {
    5
}

impl Default for PollingConfig {
    fn default() -> Self {
        Self {
            initial_interval_ms: default_initial_interval_ms(),
            max_interval_ms: default_max_interval_ms(),
            max_transient_retries: default_max_transient_retries(),
        }
    }
}

impl PollingConfig {
    /// Keeps intervals small relative to the 1000 ms minimum tool timeout.
    pub fn validate(&self) -> Result<()> {
        let range = MIN_POLL_INTERVAL_MS..=MAX_POLL_INTERVAL_MS;
        for (name, value) in [
            ("initial_interval_ms", self.initial_interval_ms),
            ("max_interval_ms", self.max_interval_ms),
        ] {
            if !range.contains(&value) {
                return Err(AthenaError::config(format!(
                    "polling.{name} must be between {MIN_POLL_INTERVAL_MS} and {MAX_POLL_INTERVAL_MS}, got {value}"
                )));
            }
        }
        if self.initial_interval_ms > self.max_interval_ms {
            return Err(AthenaError::config(
                "polling.initial_interval_ms must not exceed polling.max_interval_ms",
            ));
        }
        Ok(())
    }
}

/// How MCP messages reach the server.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum Transport {
    /// Newline-delimited JSON-RPC over stdin/stdout.
    #[default]
    Stdio,
    /// HTTP with a server-sent event stream per session.
    Sse,
}

impl FromStr for Transport {
    type Err = AthenaError;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_lowercase().as_str() {
            "stdio" => Ok(Self::Stdio),
            "sse" | "http" => Ok(Self::Sse),
            _ => Err(AthenaError::config(format!(
                "Invalid transport: {s}. Expected: stdio or sse"
            ))),
        }
    }
}

/// Transport settings.
#[derive(Debug, Clone, Serialize, Deserialize, Default, PartialEq, Eq)]
pub struct ServerConfig {
    pub transport: Option<Transport>,
    pub host: Option<String>,
    pub port: Option<u16>,
}

impl ServerConfig {
    pub fn transport(&self) -> Transport {
        self.transport.unwrap_or_default()
    }

    pub fn host(&self) -> &str {
        self.host.as_deref().unwrap_or("127.0.0.1")
    }

    pub fn port(&self) -> u16 {
        self.port.unwrap_or(3000)
    }

    /// Applies TRANSPORT_MODE and PORT as defaults.
    pub fn apply_env_defaults(&mut self) -> Result<()> {
        self.apply_defaults_from(|key| std::env::var(key).ok())
    }

    fn apply_defaults_from(&mut self, lookup: impl Fn(&str) -> Option<String>) -> Result<()> {
        if self.transport.is_none() {
            if let Some(mode) = lookup("TRANSPORT_MODE") {
                self.transport = Some(mode.parse()?);
            }
        }
        if self.port.is_none() {
            if let Some(port) = lookup("PORT") {
                let port = port
                    .parse()
                    .map_err(|_| AthenaError::config(format!("Invalid PORT value: {port}")))?;
                self.port = Some(port);
            }
        }
        Ok(())
    }
}

/// Log output settings.
#[derive(Debug, Clone, Serialize, Deserialize, Default, PartialEq, Eq)]
pub struct LoggingConfig {
    /// Write logs to this file instead of stderr.
    pub file: Option<PathBuf>,
}

impl Config {
    /// Returns the default config file path for the current platform.
    pub fn default_path() -> PathBuf {
        dirs::config_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join("aws-athena-mcp")
            .join("config.toml")
    }

    /// Loads configuration from a TOML file. A missing file yields defaults.
    pub fn load_from_file(path: &Path) -> Result<Self> {
        if !path.exists() {
            return Ok(Self::default());
        }

        let content = std::fs::read_to_string(path)
            .map_err(|e| AthenaError::config(format!("Failed to read config file: {e}")))?;

        Self::parse_toml(&content, path)
    }

    /// Parses configuration from a TOML string.
    fn parse_toml(content: &str, path: &Path) -> Result<Self> {
        toml::from_str(content).map_err(|e| {
            AthenaError::config(format!(
                "Configuration error in {}:\n  {}",
                path.display(),
                e
            ))
        })
    }

    /// Fills unset values from the process environment.
    pub fn apply_env_defaults(&mut self) -> Result<()> {
        self.athena.apply_env_defaults();
        self.server.apply_env_defaults()
    }

    /// Validates every section.
    pub fn validate(&self) -> Result<()> {
        self.athena.validate()?;
        self.polling.validate()
    }
}
