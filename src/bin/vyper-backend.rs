//! Vyper compilation backend.

use std::path::PathBuf;
use std::sync::Arc;

use clap::Parser;
use tokio::net::TcpListener;

use vyper_server::backend::{Compiler, VyperCli};
use vyper_server::config::{self, BackendVariant, ServerConfig};
use vyper_server::lifecycle::{shutdown_on_signal, Shutdown};
use vyper_server::observability::{logging, metrics};
use vyper_server::BackendServer;

#[derive(Parser, Debug)]
#[command(name = "vyper-backend", version, about = "Vyper compilation backend")]
struct Args {
    /// Path to the TOML configuration file.
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// CORS flavour: `local` or `https`. Overrides the config file.
    #[arg(long)]
    variant: Option<BackendVariant>,

    /// Listen address. Overrides the config file.
    #[arg(long)]
    bind: Option<String>,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let args = Args::parse();

    let mut config = match &args.config {
        Some(path) => config::load_config(path)?,
        None => ServerConfig::default(),
    };
    if let Some(variant) = args.variant {
        config.backend.variant = variant;
    }
    if let Some(bind) = args.bind {
        config.backend.bind_address = bind;
    }
    logging::init(&config.observability);

    if config.observability.metrics_enabled {
        match config.observability.metrics_address.parse() {
            Ok(addr) => metrics::init_metrics(addr),
            Err(_) => tracing::error!(
                metrics_address = %config.observability.metrics_address,
                "Failed to parse metrics address"
            ),
        }
    }

    let compiler = Arc::new(VyperCli::from_config(&config.backend.compiler));
    let version = match compiler.version().await {
        Ok(version) => version,
        Err(e) => {
            tracing::warn!(error = %e, "Could not query compiler version");
            "unknown".to_string()
        }
    };
    tracing::info!(compiler_version = %version, "vyper-backend starting");

    let server = BackendServer::new(&config.backend, compiler, version);
    let listener = TcpListener::bind(&config.backend.bind_address).await?;

    let shutdown = Shutdown::new();
    tokio::spawn(shutdown_on_signal(shutdown.clone()));

    server.run(listener, shutdown.subscribe()).await?;

    tracing::info!("Shutdown complete");
    Ok(())
}
