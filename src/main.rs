//! athena-mcp: an MCP server for AWS Athena.

use std::future::Future;
use std::sync::Arc;

use anyhow::{Context, Result};
use aws_athena_mcp::cli::Cli;
use aws_athena_mcp::config::{Config, Transport};
use aws_athena_mcp::mcp::{serve_sse, serve_stdio, McpHandler};
use aws_athena_mcp::query::{Orchestrator, PollPolicy};
use aws_athena_mcp::{engine, logging};
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

#[tokio::main]
async fn main() {
    // A missing .env is fine.
    let _ = dotenvy::dotenv();

    let cli = Cli::parse_args();
    let config = match resolve_config(&cli) {
        Ok(config) => config,
        Err(e) => {
            eprintln!("Error: {e:#}");
            std::process::exit(1);
        }
    };

    logging::init(config.logging.file.as_deref());

    let code = match run(&cli, config).await {
        Ok(()) => 0,
        Err(e) => {
            error!("{e:#}");
            1
        }
    };
    // A pending stdin read would otherwise hold up runtime shutdown.
    std::process::exit(code);
}

/// Builds the effective configuration: flags, then file, then environment.
fn resolve_config(cli: &Cli) -> Result<Config> {
    let config_path = cli.config_path();
    let mut config = Config::load_from_file(&config_path)
        .with_context(|| format!("Failed to load config from {}", config_path.display()))?;

    cli.apply_to(&mut config);
    config.apply_env_defaults()?;
    config.validate()?;
    Ok(config)
}

async fn run(cli: &Cli, config: Config) -> Result<()> {
    let engine = engine::connect(cli.engine_backend(), &config.athena)
        .await
        .context("Failed to set up the query engine")?;

    let orchestrator = Orchestrator::new(engine, PollPolicy::from(&config.polling));
    let handler = Arc::new(McpHandler::new(orchestrator));

    let shutdown = CancellationToken::new();
    tokio::spawn(watch_for_shutdown(shutdown.clone()));

    info!(
        version = env!("CARGO_PKG_VERSION"),
        transport = ?config.server.transport(),
        workgroup = config.athena.workgroup.as_deref().unwrap_or("primary"),
        "Starting aws-athena-mcp"
    );

    match config.server.transport() {
        Transport::Stdio => serve_stdio(handler, shutdown).await?,
        Transport::Sse => {
            serve_sse(handler, config.server.host(), config.server.port(), shutdown).await?
        }
    }

    info!("Server stopped");
    Ok(())
}

async fn watch_for_shutdown(shutdown: CancellationToken) {
    let interrupt = async {
        let _ = tokio::signal::ctrl_c().await;
    };
    cancel_on_signal(shutdown, interrupt, wait_for_sigterm()).await;
}

/// Cancels `shutdown` on the first signal. Without a SIGTERM hook only
/// `interrupt` is awaited.
async fn cancel_on_signal(
    shutdown: CancellationToken,
    interrupt: impl Future<Output = ()>,
    terminate: impl Future<Output = std::io::Result<()>>,
) {
    tokio::pin!(interrupt);
    tokio::select! {
        _ = &mut interrupt => info!("Received Ctrl+C, shutting down"),
        result = terminate => match result {
            Ok(()) => info!("Received SIGTERM, shutting down"),
            Err(e) => {
                warn!("Could not install SIGTERM handler: {e}");
                interrupt.await;
                info!("Received Ctrl+C, shutting down");
            }
        },
    }
    shutdown.cancel();
}

#[cfg(unix)]
async fn wait_for_sigterm() -> std::io::Result<()> {
    use tokio::signal::unix::{signal, SignalKind};
    let mut sigterm = signal(SignalKind::terminate())?;
    sigterm.recv().await;
    Ok(())
}

#[cfg(not(unix))]
async fn wait_for_sigterm() -> std::io::Result<()> {
    std::future::pending::<()>().await;
    Ok(())
}
