//! Presence - TCP presence tracking server
//!
//! Tracks connected peers, admits one connection per remote address and
//! evicts peers that stop sending `keep-alive`.

use anyhow::{bail, Result};
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use tracing::{error, info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use presence::{
    config::{Config, ConfigManager},
    console,
    metrics::Metrics,
    status::StatusServer,
    NetworkClient, PresenceServer, ShutdownCoordinator,
};

/// CLI arguments for Presence
#[derive(Parser, Debug)]
#[command(name = "presence")]
#[command(about = "Presence - TCP presence tracking server")]
#[command(version)]
#[command(args_conflicts_with_subcommands = true)]
#[command(long_about = "
Presence - TCP presence tracking server

Clients connect over TCP and periodically send the literal `keep-alive`.
A client that stays silent for longer than the keep-alive timeout is
disconnected. Only one connection per remote address is admitted.

Configuration priority (highest to lowest, applied per key):
1. Command-line arguments
2. Configuration file
3. Environment variables
4. Built-in defaults

Environment variables:
  PRESENCE_BIND_ADDR          - Bind address (e.g., 0.0.0.0:1337)
  PRESENCE_KEEPALIVE_TIMEOUT  - Keep-alive timeout (e.g., 10s, 2500ms)
  PRESENCE_SWEEP_INTERVAL     - Timeout sweep cadence (e.g., 250ms)
  PRESENCE_LOG_LEVEL          - Log level (trace, debug, info, warn, error)

Console commands: list, dlist, help, clear, exit
")]
pub struct CliArgs {
    #[command(subcommand)]
    pub command: Option<Command>,

    #[command(flatten)]
    pub serve: ServeArgs,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long, global = true, help = "Log level")]
    pub log_level: Option<String>,

    /// Enable verbose logging (sets log level to debug)
    #[arg(short, long, global = true, help = "Enable verbose logging")]
    pub verbose: bool,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Run the presence server (default)
    Serve(ServeArgs),
    /// Connect to a server, send messages and optionally keep the session alive
    Client(ClientArgs),
}

#[derive(clap::Args, Debug, Default)]
pub struct ServeArgs {
    /// Configuration file path
    #[arg(short, long, default_value = "presence.toml", help = "Path to configuration file")]
    pub config: PathBuf,

    /// Bind address (overrides config file)
    #[arg(short, long, help = "Bind address (e.g., 0.0.0.0:1337)")]
    pub bind: Option<String>,

    /// Port to bind to (overrides config file)
    #[arg(short, long, help = "Port to bind to")]
    pub port: Option<u16>,

    /// Keep-alive timeout in milliseconds
    #[arg(long, help = "Keep-alive timeout in milliseconds")]
    pub keepalive_timeout: Option<u64>,

    /// Timeout sweep cadence in milliseconds
    #[arg(long, help = "Timeout sweep interval in milliseconds")]
    pub sweep_interval: Option<u64>,

    /// Run without the operator console
    #[arg(long, help = "Disable the interactive console")]
    pub no_console: bool,

    /// Validate configuration and exit
    #[arg(long, help = "Validate configuration and exit")]
    pub validate_config: bool,
}

#[derive(clap::Args, Debug)]
pub struct ClientArgs {
    /// Server IP address
    #[arg(long, default_value = "127.0.0.1")]
    pub host: String,

    /// Server port
    #[arg(short, long, default_value_t = 1337)]
    pub port: u16,

    /// Send `keep-alive` every N milliseconds until interrupted
    #[arg(long)]
    pub keep_alive_every: Option<u64>,

    /// Messages to send after connecting
    pub messages: Vec<String>,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = CliArgs::parse();

    match args.command {
        Some(Command::Client(ref client_args)) => {
            init_tracing(&args, "info")?;
            run_client(client_args).await
        }
        Some(Command::Serve(ref serve_args)) => serve(&args, serve_args).await,
        None => serve(&args, &args.serve).await,
    }
}

async fn serve(args: &CliArgs, serve_args: &ServeArgs) -> Result<()> {
    let mut config = ConfigManager::load_layered(&serve_args.config)?;

    init_tracing(args, &config.monitoring.log_level)?;

    info!(
        "Starting Presence v{} - TCP presence tracking server",
        env!("CARGO_PKG_VERSION")
    );

    config.merge_with_cli_args(
        serve_args.bind.as_deref(),
        serve_args.port,
        serve_args.keepalive_timeout,
        serve_args.sweep_interval,
        serve_args.no_console,
    );
    config.validate()?;

    if serve_args.validate_config {
        info!("Configuration is valid");
        info!("  Bind address: {}", config.server.bind_addr);
        info!("  Keep-alive timeout: {:?}", config.server.keepalive_timeout);
        info!("  Sweep interval: {:?}", config.server.sweep_interval);
        info!("  Buffer size: {} bytes", config.server.buffer_size);
        info!(
            "  Console: {}",
            if config.console.enabled { "enabled" } else { "disabled" }
        );
        return Ok(());
    }

    run_server(config).await
}

async fn run_server(config: Config) -> Result<()> {
    let config = Arc::new(config);
    let metrics = Arc::new(Metrics::new());

    let mut server = PresenceServer::with_metrics(Arc::clone(&config), Arc::clone(&metrics));
    let local_addr = server.bind().await?;
    info!("Starting server on: {}", local_addr);

    let server = Arc::new(server);
    let registry = server.registry();

    let status_handle = if config.monitoring.status_api_enabled {
        let status_server = StatusServer::new(
            config.monitoring.status_api_addr,
            Arc::clone(&registry),
            Arc::clone(&metrics),
        );
        Some(tokio::spawn(async move {
            if let Err(e) = status_server.start().await {
                error!("Status API server error: {}", e);
            }
        }))
    } else {
        None
    };

    if config.console.enabled {
        console::spawn_stdio(Arc::clone(&registry), config.console.render_queue_capacity);
    }

    let server_task = {
        let server = Arc::clone(&server);
        tokio::spawn(async move { server.run().await })
    };

    let coordinator = ShutdownCoordinator::new(Duration::from_secs(5));
    if let Err(e) = coordinator.listen_for_signals().await {
        error!("Error setting up signal handlers: {}", e);
    }

    coordinator.shutdown_server(&server, server_task).await?;

    if let Some(handle) = status_handle {
        handle.abort();
    }

    info!("Server shutdown complete");
    Ok(())
}

async fn run_client(args: &ClientArgs) -> Result<()> {
    let mut client = NetworkClient::new(&args.host, args.port)?;

    if !client.connect().await {
        bail!("Could not connect to {}", client.peer_addr());
    }
    info!("Connected to {}", client.peer_addr());

    for message in &args.messages {
        if !client.send(message.as_bytes()).await {
            warn!("Failed to send {:?}", message);
        }
    }

    if let Some(every_ms) = args.keep_alive_every {
        let mut ticker = tokio::time::interval(Duration::from_millis(every_ms));
        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    if !client.send_keep_alive().await {
                        warn!("Connection lost");
                        break;
                    }
                }
                _ = tokio::signal::ctrl_c() => {
                    info!("Interrupted");
                    break;
                }
            }
        }
    }

    client.disconnect().await;
    Ok(())
}

/// Initialize tracing/logging. Logs go to stderr so console output on
/// stdout stays readable.
fn init_tracing(args: &CliArgs, default_level: &str) -> Result<()> {
    let log_level = if args.verbose {
        "debug"
    } else {
        args.log_level.as_deref().unwrap_or(default_level)
    };

    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(log_level));

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::fmt::layer()
                .with_writer(std::io::stderr)
                .with_target(false)
                .with_thread_ids(true)
                .with_level(true)
                .with_ansi(true),
        )
        .with(env_filter)
        .init();

    Ok(())
}
