//! Edge proxy for the Vyper compilation service.
//!
//! ```text
//!   client ──TLS──▶ ┌──────────────────────────┐
//!                   │ edge                     │
//!                   │  OPTIONS ─▶ 204 + CORS   │
//!                   │  else    ─▶ forward ─────┼──HTTP──▶ backend :8080
//!                   └──────────────────────────┘
//! ```

use std::path::PathBuf;

use clap::Parser;
use tokio::net::TcpListener;
use tokio::sync::mpsc;

use vyper_server::config::{self, watcher::ConfigWatcher, ServerConfig};
use vyper_server::lifecycle::{shutdown_on_signal, Shutdown};
use vyper_server::net::load_tls_config;
use vyper_server::observability::{logging, metrics};
use vyper_server::EdgeServer;

#[derive(Parser, Debug)]
#[command(name = "vyper-edge", version, about = "TLS-terminating edge proxy")]
struct Args {
    /// Path to the TOML configuration file.
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Reload CORS, upstream and timeouts when the config file changes.
    #[arg(long, requires = "config")]
    watch: bool,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let args = Args::parse();

    let config = match &args.config {
        Some(path) => config::load_config(path)?,
        None => ServerConfig::default(),
    };
    logging::init(&config.observability);

    tracing::info!(version = env!("CARGO_PKG_VERSION"), "vyper-edge starting");
    tracing::info!(
        bind_address = %config.edge.bind_address,
        upstream = %config.edge.upstream,
        tls = config.edge.tls.is_some(),
        max_connections = config.edge.max_connections,
        "Configuration loaded"
    );

    if config.observability.metrics_enabled {
        match config.observability.metrics_address.parse() {
            Ok(addr) => metrics::init_metrics(addr),
            Err(_) => tracing::error!(
                metrics_address = %config.observability.metrics_address,
                "Failed to parse metrics address"
            ),
        }
    }

    let mut server = EdgeServer::new(config.edge.clone())?;
    if let Some(tls) = &config.edge.tls {
        server = server.with_tls(load_tls_config(tls).await?);
    }

    // Kept alive for the lifetime of the server.
    let (_watcher, updates) = match (&args.config, args.watch) {
        (Some(path), true) => {
            let (watcher, updates) = ConfigWatcher::new(path);
            (Some(watcher.run()?), updates)
        }
        _ => {
            let (_, updates) = mpsc::unbounded_channel();
            (None, updates)
        }
    };

    let listener = TcpListener::bind(&config.edge.bind_address).await?;

    let shutdown = Shutdown::new();
    tokio::spawn(shutdown_on_signal(shutdown.clone()));

    server.run(listener, updates, shutdown.subscribe()).await?;

    tracing::info!("Shutdown complete");
    Ok(())
}
