//! cloudshell gateway daemon
//!
//! Serves xterm.js clients over WebSocket, running one shell per
//! connection on its own pseudo-terminal.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::Parser;
use tokio_util::sync::CancellationToken;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use cs_core::config::{self, GatewayConfig};
use cs_gateway::{GatewayServer, GatewayState, NativeSpawner};

#[derive(Parser, Debug)]
#[command(name = "cloudshell")]
#[command(about = "Browser terminal gateway")]
#[command(version)]
struct Args {
    /// Path to configuration file
    #[arg(short, long, env = "CLOUDSHELL_CONFIG")]
    config: Option<PathBuf>,

    /// Path of shell command
    #[arg(long, env = "CLOUDSHELL_COMMAND")]
    command: Option<String>,

    /// Comma-delimited list of arguments passed to the command
    #[arg(
        long,
        env = "CLOUDSHELL_ARGUMENTS",
        value_delimiter = ',',
        allow_hyphen_values = true
    )]
    arguments: Option<Vec<String>>,

    /// Working directory of the command
    #[arg(long, env = "CLOUDSHELL_WORKING_DIR")]
    working_dir: Option<PathBuf>,

    /// Comma-delimited list of hostnames permitted to connect
    #[arg(long, env = "CLOUDSHELL_ALLOWED_HOSTNAMES", value_delimiter = ',')]
    allowed_hostnames: Option<Vec<String>>,

    /// Consecutive send/protocol failures before a session is closed
    #[arg(long, env = "CLOUDSHELL_CONNECTION_ERROR_LIMIT")]
    connection_error_limit: Option<u32>,

    /// Maximum seconds without a pong before a session is closed
    #[arg(long, env = "CLOUDSHELL_KEEPALIVE_PING_TIMEOUT")]
    keepalive_ping_timeout: Option<u64>,

    /// Maximum frame payload in bytes
    #[arg(long, env = "CLOUDSHELL_MAX_BUFFER_SIZE_BYTES")]
    max_buffer_size_bytes: Option<usize>,

    /// IP interface the server listens on
    #[arg(long = "server-addr", env = "CLOUDSHELL_SERVER_ADDRESS")]
    server_address: Option<String>,

    /// Port the server listens on
    #[arg(long, env = "CLOUDSHELL_SERVER_PORT")]
    server_port: Option<u16>,

    /// Prefix for every route
    #[arg(long = "xterm-url-route-prefix", env = "CLOUDSHELL_URL_ROUTE_PREFIX")]
    url_route_prefix: Option<String>,

    /// Path xterm.js attaches to
    #[arg(long, env = "CLOUDSHELL_PATH_XTERMJS")]
    path_xtermjs: Option<String>,

    /// Path of the liveness probe
    #[arg(long, env = "CLOUDSHELL_PATH_LIVENESS")]
    path_liveness: Option<String>,

    /// Path of the readiness probe
    #[arg(long, env = "CLOUDSHELL_PATH_READINESS")]
    path_readiness: Option<String>,

    /// Log level (error, warn, info, debug, trace)
    #[arg(long, env = "CLOUDSHELL_LOG_LEVEL", default_value = "info")]
    log_level: String,

    /// Print the effective configuration as TOML and exit
    #[arg(long)]
    print_config: bool,
}

impl Args {
    /// Override file values with flags and environment variables
    fn apply(&self, config: &mut GatewayConfig) {
        let session = &mut config.session;
        if let Some(command) = &self.command {
            session.command = command.clone();
        }
        if let Some(arguments) = &self.arguments {
            session.arguments = arguments.clone();
        }
        if let Some(dir) = &self.working_dir {
            session.working_dir = Some(dir.clone());
        }
        if let Some(hosts) = &self.allowed_hostnames {
            session.allowed_hostnames = hosts.clone();
        }
        if let Some(limit) = self.connection_error_limit {
            session.connection_error_limit = limit;
        }
        if let Some(secs) = self.keepalive_ping_timeout {
            session.keepalive_timeout = std::time::Duration::from_secs(secs);
        }
        if let Some(bytes) = self.max_buffer_size_bytes {
            session.max_buffer_bytes = bytes;
        }

        if let Some(address) = &self.server_address {
            config.server_address = address.clone();
        }
        if let Some(port) = self.server_port {
            config.server_port = port;
        }
        if let Some(prefix) = &self.url_route_prefix {
            config.url_route_prefix = prefix.clone();
        }
        if let Some(path) = &self.path_xtermjs {
            config.path_xtermjs = path.clone();
        }
        if let Some(path) = &self.path_liveness {
            config.path_liveness = path.clone();
        }
        if let Some(path) = &self.path_readiness {
            config.path_readiness = path.clone();
        }
    }
}

/// Load the config file, falling back to defaults when none exists
fn load_base_config(path: Option<&Path>) -> Result<GatewayConfig> {
    if let Some(path) = path {
        return config::load_config(path)
            .with_context(|| format!("Failed to load config from {:?}", path));
    }

    let default_path = config::default_config_path();
    if default_path.exists() {
        Ok(config::load_config(&default_path).unwrap_or_else(|e| {
            tracing::warn!("Failed to load config from {:?}: {}", default_path, e);
            GatewayConfig::default()
        }))
    } else {
        tracing::debug!("Using default configuration");
        Ok(GatewayConfig::default())
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    // Initialize logging
    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::new(
            std::env::var("RUST_LOG").unwrap_or_else(|_| args.log_level.clone()),
        ))
        .with(tracing_subscriber::fmt::layer())
        .init();

    let mut config = load_base_config(args.config.as_deref())?;
    args.apply(&mut config);
    config.validate().context("Invalid configuration")?;

    if args.print_config {
        let rendered =
            toml::to_string_pretty(&config).context("Failed to render configuration")?;
        print!("{}", rendered);
        return Ok(());
    }

    tracing::info!(
        command = %config.session.command,
        allowed_hostnames = ?config.session.allowed_hostnames,
        "cloudshell starting..."
    );

    let state = Arc::new(GatewayState::new(
        config.clone(),
        Arc::new(NativeSpawner::new()),
    ));

    // Create cancellation token for graceful shutdown
    let cancel = CancellationToken::new();

    // Setup signal handlers
    let cancel_clone = cancel.clone();
    tokio::spawn(async move {
        let ctrl_c = tokio::signal::ctrl_c();

        #[cfg(unix)]
        let terminate = async {
            tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())
                .expect("failed to install signal handler")
                .recv()
                .await;
        };

        #[cfg(not(unix))]
        let terminate = std::future::pending::<()>();

        tokio::select! {
            _ = ctrl_c => {
                tracing::info!("Received Ctrl+C, initiating shutdown...");
            }
            _ = terminate => {
                tracing::info!("Received SIGTERM, initiating shutdown...");
            }
        }

        cancel_clone.cancel();
    });

    let server = GatewayServer::new(state, cancel);
    server.run(&config.bind_address()).await?;

    tracing::info!("cloudshell shutdown complete");
    Ok(())
}
