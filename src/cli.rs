//! Command-line argument parsing for the Athena MCP server.
//!
//! Flags override the config file, which overrides the environment.

use crate::config::{AthenaConfig, Config, Transport};
use crate::engine::EngineBackend;
use crate::logging::default_log_path;
use clap::Parser;
use std::path::PathBuf;

/// An MCP server that runs SQL against AWS Athena.
#[derive(Parser, Debug)]
#[command(name = "athena-mcp")]
#[command(version, about, long_about = None)]
pub struct Cli {
    /// Config file path
    #[arg(long, value_name = "PATH")]
    pub config: Option<PathBuf>,

    /// Transport to serve MCP over
    #[arg(short = 't', long, value_enum, value_name = "MODE")]
    pub transport: Option<Transport>,

    /// Address to bind in SSE mode
    #[arg(short = 'H', long, value_name = "HOST")]
    pub host: Option<String>,

    /// Port to bind in SSE mode
    #[arg(short = 'p', long, value_name = "PORT")]
    pub port: Option<u16>,

    /// AWS region
    #[arg(long, value_name = "REGION")]
    pub region: Option<String>,

    /// Athena workgroup
    #[arg(short = 'w', long, value_name = "NAME")]
    pub workgroup: Option<String>,

    /// S3 location for query results (s3://bucket/prefix/)
    #[arg(short = 'o', long, value_name = "S3_URL")]
    pub output_location: Option<String>,

    /// Data catalog
    #[arg(long, value_name = "NAME")]
    pub catalog: Option<String>,

    /// Use an in-memory engine with demo data instead of Athena
    #[arg(long)]
    pub mock_engine: bool,

    /// Write logs to a file instead of stderr (default location if no PATH)
    #[arg(long, value_name = "PATH")]
    pub log_file: Option<Option<PathBuf>>,
}

impl Cli {
    /// Parses command-line arguments.
    pub fn parse_args() -> Self {
        Self::parse()
    }

    /// Returns the config file path to use.
    ///
    /// Uses the --config argument if provided, otherwise the default path.
    pub fn config_path(&self) -> PathBuf {
        self.config.clone().unwrap_or_else(Config::default_path)
    }

    /// Athena settings given on the command line.
    pub fn athena_overrides(&self) -> AthenaConfig {
        AthenaConfig {
            region: self.region.clone(),
            workgroup: self.workgroup.clone(),
            output_location: self.output_location.clone(),
            catalog: self.catalog.clone(),
        }
    }

    /// Applies every flag that was given on top of `config`.
    pub fn apply_to(&self, config: &mut Config) {
        config.athena.merge(&self.athena_overrides());

        if self.transport.is_some() {
            config.server.transport = self.transport;
        }
        if self.host.is_some() {
            config.server.host = self.host.clone();
        }
        if self.port.is_some() {
            config.server.port = self.port;
        }
        if let Some(file) = &self.log_file {
            config.logging.file = Some(file.clone().unwrap_or_else(default_log_path));
        }
    }

    pub fn engine_backend(&self) -> EngineBackend {
        if self.mock_engine {
            EngineBackend::Mock
        } else {
            EngineBackend::Athena
        }
    }
}
