//! HAProxy manager
//!
//! Runs next to a node and keeps its load balancer alive and current.
//!
//! # Architecture Overview
//!
//! ```text
//!                ┌──────────────────────────────────────────────────────────┐
//!                │                      MANAGER                              │
//!                │                                                           │
//!   Control      │  ┌─────────┐   write    ┌──────────────┐                   │
//!   client  ─────┼─▶│ control │──────────▶│ haproxy.cfg  │◀── renderer        │
//!                │  │ surface │            └──────┬───────┘    container      │
//!                │  └────┬────┘                   │ poll / watch               │
//!                │       │                        ▼                            │
//!                │       │               ┌──────────────┐                      │
//!                │       └──────────────▶│    reload    │── SIGHUP ──▶ LB      │
//!                │                       │ coordinator  │         container    │
//!                │                       └──────────────┘                      │
//!                │                                                           │
//!                │  ┌────────────────────┐   ┌─────────────────────────────┐ │
//!                │  │ supervisors        │   │ lifecycle                   │ │
//!                │  │ lb, config-renderer│   │ startup / ordered shutdown  │ │
//!                │  └────────────────────┘   └─────────────────────────────┘ │
//!                └──────────────────────────────────────────────────────────┘
//! ```

use std::path::PathBuf;
use std::sync::Arc;

use clap::Parser;
use tokio::net::TcpListener;

use haproxy_manager::config::load_config;
use haproxy_manager::lifecycle::signals::{handle_signals, TerminationSignals};
use haproxy_manager::lifecycle::startup::{connect_runtime, ensure_config_directory};
use haproxy_manager::observability::{logging, metrics};
use haproxy_manager::{Manager, ManagerError};

#[derive(Parser)]
#[command(name = "haproxy-manager")]
#[command(about = "Supervises an HAProxy container and reloads it on configuration changes", long_about = None)]
struct Args {
    /// Path to a TOML configuration file. Defaults apply without one.
    #[arg(short, long, env = "MANAGER_CONFIG")]
    config: Option<PathBuf>,
}

#[tokio::main]
async fn main() {
    let args = Args::parse();

    if let Err(e) = run(args).await {
        tracing::error!(error = %e, "Manager exited with an error");
        eprintln!("haproxy-manager: {e}");
        std::process::exit(1);
    }
}

async fn run(args: Args) -> Result<(), ManagerError> {
    let config = load_config(args.config.as_deref())?;

    logging::init_logging(&config.observability.log_level);
    tracing::info!(version = env!("CARGO_PKG_VERSION"), "haproxy-manager starting");

    tracing::info!(
        namespace = %config.runtime.namespace,
        config_file = ?config.config_file(),
        detector = ?config.detector.strategy,
        renderer_enabled = config.renderer.enabled,
        control_enabled = config.control.enabled,
        "Configuration loaded"
    );

    if config.observability.metrics_enabled {
        if let Ok(addr) = config.observability.metrics_address.parse() {
            metrics::init_metrics(addr);
        } else {
            tracing::error!(
                metrics_address = %config.observability.metrics_address,
                "Failed to parse metrics address"
            );
        }
    }

    ensure_config_directory(&config).await?;
    let runtime = Arc::new(connect_runtime(&config).await?);

    let control_listener = if config.control.enabled {
        Some(TcpListener::bind(&config.control.bind_address).await?)
    } else {
        None
    };

    let signals = TerminationSignals::new()?;
    let manager = Manager::new(config, runtime);
    tokio::spawn(handle_signals(signals, manager.orchestrator()));

    manager.run(control_listener).await?;

    tracing::info!("Shutdown complete");
    Ok(())
}
