//! Sockschain - SOCKS5 server and chain forwarder
//!
//! This is the main entry point for the Sockschain application.

use anyhow::{Context, Result};
use clap::Parser;
use sockschain::config::{load_config, parse_listen_addr};
use sockschain::socks::{ChainForwarder, Socks5Server};
use std::path::PathBuf;
use std::sync::Arc;
use tokio::net::TcpListener;
use tokio::sync::broadcast;
use tracing::{info, warn};
use tracing_subscriber::{EnvFilter, FmtSubscriber};

/// Sockschain - SOCKS5 server with a transparent chaining forwarder
#[derive(Parser, Debug)]
#[command(name = "sockschain")]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Path to configuration file
    #[arg(short, long)]
    config: PathBuf,

    /// Log level (trace, debug, info, warn, error)
    #[arg(short, long, default_value = "info")]
    log_level: String,

    /// Enable JSON logging format
    #[arg(long)]
    json_log: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    // Setup logging
    setup_logging(&args.log_level, args.json_log)?;

    // Load configuration
    let config = load_config(&args.config)?;

    info!("Sockschain v{}", sockschain::VERSION);
    info!("Configuration loaded from: {:?}", args.config);

    if let Some(metrics) = &config.metrics {
        #[cfg(feature = "prometheus")]
        {
            sockschain::metrics::init_prometheus(&metrics.listen)?;
            info!("Prometheus exporter listening on {}", metrics.listen);
        }
        #[cfg(not(feature = "prometheus"))]
        warn!(
            "Ignoring [metrics] listen = {}: built without the prometheus feature",
            metrics.listen
        );
    }

    // Setup shutdown signal
    let (shutdown_tx, _) = broadcast::channel(1);

    let signal_tx = shutdown_tx.clone();
    tokio::spawn(async move {
        wait_for_signal().await;
        let _ = signal_tx.send(true);
    });

    let server_task = {
        let shutdown_rx = shutdown_tx.subscribe();
        let server = config.server.clone();
        async move {
            let Some(server) = server else {
                return Ok(());
            };
            let addr = parse_listen_addr(&server.listen_addr)?;
            let listener = TcpListener::bind(addr)
                .await
                .with_context(|| format!("Failed to bind SOCKS5 server on {}", addr))?;
            Arc::new(Socks5Server::new(server.socks))
                .run(listener, shutdown_rx)
                .await
        }
    };

    let chain_task = {
        let shutdown_rx = shutdown_tx.subscribe();
        let chain = config.chain.clone();
        async move {
            let Some(chain) = chain else {
                return Ok(());
            };
            let addr = parse_listen_addr(&chain.listen_addr)?;
            let listener = TcpListener::bind(addr)
                .await
                .with_context(|| format!("Failed to bind chain forwarder on {}", addr))?;
            Arc::new(ChainForwarder::new(chain.upstream_addr))
                .run(listener, shutdown_rx)
                .await
        }
    };

    tokio::try_join!(server_task, chain_task)?;

    info!("Sockschain stopped");
    Ok(())
}

/// Wait for Ctrl+C or, on unix, SIGTERM
async fn wait_for_signal() {
    #[cfg(unix)]
    {
        use tokio::signal::unix::{signal, SignalKind};

        match signal(SignalKind::terminate()) {
            Ok(mut sigterm) => {
                tokio::select! {
                    _ = tokio::signal::ctrl_c() => {
                        info!("Received Ctrl+C, shutting down...");
                    }
                    _ = sigterm.recv() => {
                        info!("Received SIGTERM, shutting down...");
                    }
                }
                return;
            }
            Err(e) => warn!("Failed to setup SIGTERM handler: {}", e),
        }
    }

    let _ = tokio::signal::ctrl_c().await;
    info!("Received Ctrl+C, shutting down...");
}

/// Setup logging: `RUST_LOG` wins over `--log-level` when set
fn setup_logging(level: &str, json: bool) -> Result<()> {
    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(level))
        .with_context(|| format!("Invalid log level: {}", level))?;

    let builder = FmtSubscriber::builder()
        .with_env_filter(filter)
        .with_target(true);

    if json {
        tracing::subscriber::set_global_default(builder.json().finish())?;
    } else {
        tracing::subscriber::set_global_default(builder.finish())?;
    }

    Ok(())
}
