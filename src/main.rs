//! Edge request router.
//!
//! Serves a Vercel build output: every request runs through the phased
//! routes manifest and is answered by a static asset, an edge function, a
//! redirect or an external pass-through.
//!
//! # Architecture Overview
//!
//! ```text
//!                          ┌──────────────────────────────────────────────┐
//!                          │                 EDGE ROUTER                  │
//!                          │                                              │
//!     Client Request       │  ┌────────┐    ┌──────────┐    ┌──────────┐  │
//!     ─────────────────────┼─▶│  http  │───▶│ routing  │───▶│  serve   │  │
//!                          │  │ server │    │ phases + │    │materialize│ │
//!                          │  └────────┘    │ matcher  │    └────┬─────┘  │
//!                          │                └────┬─────┘         │        │
//!                          │                     ▼               ▼        │
//!                          │               ┌────────────────────────┐     │
//!     Client Response      │               │ runtime: functions,    │     │
//!     ◀────────────────────┼───────────────│ fetch, suspense cache  │     │
//!                          │               └────────────────────────┘     │
//!                          │                                              │
//!                          │  config · manifest · observability · lifecycle │
//!                          └──────────────────────────────────────────────┘
//! ```

use std::path::PathBuf;
use std::sync::Arc;

use clap::Parser;
use tokio::net::TcpListener;
use tokio::sync::mpsc;

use edge_router::config::{load_config, validate_deployment, ManifestWatcher};
use edge_router::lifecycle::{listen_for_signals, Shutdown};
use edge_router::observability::{init_logging, init_metrics};
use edge_router::{load_deployment, EdgeServer, RuntimeEnv};

#[derive(Parser)]
#[command(name = "edge-router")]
#[command(about = "Serve a Vercel build output through its routes manifest", long_about = None)]
struct Cli {
    /// Path to the TOML configuration file.
    #[arg(short, long, default_value = "edge.toml")]
    config: PathBuf,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();
    let config = load_config(&cli.config)?;

    init_logging(&config.observability);
    tracing::info!("edge-router v{} starting", env!("CARGO_PKG_VERSION"));

    tracing::info!(
        bind_address = %config.listener.bind_address,
        routes = ?config.manifest.routes_path,
        build_output = ?config.manifest.build_output_path,
        request_timeout_secs = config.timeouts.request_secs,
        "Configuration loaded"
    );

    let env = Arc::new(RuntimeEnv::from_config(&config)?);
    let deployment = load_deployment(&config.manifest.routes_path, &config.manifest.build_output_path)?;
    if let Err(errors) = validate_deployment(&deployment, env.functions()) {
        for error in &errors {
            tracing::error!(error = %error, "Invalid deployment");
        }
        return Err(format!("deployment failed validation with {} error(s)", errors.len()).into());
    }

    if config.observability.metrics_enabled {
        if let Ok(addr) = config.observability.metrics_address.parse() {
            init_metrics(addr);
        } else {
            tracing::error!(
                metrics_address = %config.observability.metrics_address,
                "Failed to parse metrics address"
            );
        }
    }

    // The watcher must stay alive for the lifetime of the server.
    let (_watcher, updates) = if config.manifest.watch {
        let (watcher, updates) = ManifestWatcher::new(
            &config.manifest.routes_path,
            &config.manifest.build_output_path,
            env.clone(),
        );
        (Some(watcher.run()?), updates)
    } else {
        let (_tx, updates) = mpsc::unbounded_channel();
        (None, updates)
    };

    let shutdown = Shutdown::new();
    tokio::spawn(listen_for_signals(shutdown.clone()));

    let listener = TcpListener::bind(&config.listener.bind_address).await?;
    tracing::info!(address = %listener.local_addr()?, "Listening for connections");

    let server = EdgeServer::new(&config, deployment, env);
    server.run(listener, updates, shutdown.subscribe()).await?;

    tracing::info!("Shutdown complete");
    Ok(())
}
