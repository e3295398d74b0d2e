//! Least-connections HTTP load balancer.
//!
//! # Architecture Overview
//!
//! ```text
//!                        ┌───────────────────────────────────────────┐
//!                        │              LOAD BALANCER                │
//!     Client Request     │  ┌─────────┐    ┌────────────────────┐    │
//!     ───────────────────┼─▶│  http   │───▶│   load_balancer    │    │
//!                        │  │ server  │    │ registry + least   │    │
//!                        │  └────┬────┘    │ connections        │    │
//!                        │       │         └─────────┬──────────┘    │
//!                        │       ▼                   │ reserve       │
//!                        │  ┌─────────┐              ▼               │
//!     Client Response    │  │ proxy   │──── GET <backend><path> ─────┼──▶ Backend
//!     ◀──────────────────┼──│dispatch │◀─── status ──────────────────┼─── Server
//!                        │  └─────────┘   (release when body done)   │
//!                        │                                           │
//!                        │  config · observability · lifecycle       │
//!                        └───────────────────────────────────────────┘
//! ```

use clap::Parser;
use std::path::PathBuf;
use std::sync::Arc;
use tokio::net::TcpListener;

use least_conn_lb::config::{self, LbConfig};
use least_conn_lb::lifecycle::{signals, Shutdown};
use least_conn_lb::observability::{logging, metrics};
use least_conn_lb::{BackendRegistry, HttpServer};

#[derive(Parser, Debug)]
#[command(name = "least-conn-lb")]
#[command(about = "HTTP load balancer using least active connections", long_about = None)]
struct Cli {
    /// Path to a TOML configuration file.
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Override the listener bind address.
    #[arg(short, long)]
    bind: Option<String>,

    /// Backend base URL; repeat to add more. Replaces the configured list.
    #[arg(long = "backend")]
    backends: Vec<String>,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    let mut config = match &cli.config {
        Some(path) => config::load_config(path)?,
        None => LbConfig::default(),
    };
    if let Some(bind) = cli.bind {
        config.listener.bind_address = bind;
    }
    if !cli.backends.is_empty() {
        config.backends = cli.backends;
    }
    config::validation::validate_config(&config).map_err(config::ConfigError::Validation)?;

    logging::init(&config.observability.log_level);
    tracing::info!("least-conn-lb v{} starting", env!("CARGO_PKG_VERSION"));

    if config.observability.metrics_enabled {
        match config.observability.metrics_address.parse() {
            Ok(addr) => metrics::init_metrics(addr)?,
            Err(e) => {
                tracing::error!(
                    metrics_address = %config.observability.metrics_address,
                    error = %e,
                    "Failed to parse metrics address"
                );
                return Err(e.into());
            }
        }
    }

    // Fatal: a malformed backend address aborts startup.
    let registry = Arc::new(BackendRegistry::new(&config.backends)?);
    if registry.is_empty() {
        tracing::warn!("No backends configured; every request will get 503");
    }
    tracing::info!(
        bind_address = %config.listener.bind_address,
        backends = registry.len(),
        upstream_timeout_secs = config.timeouts.upstream_secs,
        "Configuration loaded"
    );

    let listener = TcpListener::bind(&config.listener.bind_address).await?;

    let shutdown = Shutdown::new();
    let server = HttpServer::new(&config, registry);
    let mut server_task = tokio::spawn(server.run(listener, shutdown.subscribe()));

    tokio::select! {
        _ = signals::wait_for_signal() => shutdown.trigger(),
        result = &mut server_task => {
            result??;
            return Ok(());
        }
    }

    server_task.await??;
    tracing::info!("Shutdown complete");
    Ok(())
}
