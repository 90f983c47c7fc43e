//! Fence Sentinel service binary.
//!
//! Reads snapshots and operator commands as lines on stdin, reduces them in a
//! single consumer loop and captures alarm evidence.
//!
//! # Configuration
//!
//! Configuration is loaded from:
//! 1. Configuration files (config/sentinel.toml, /etc/sentinel/sentinel.toml)
//! 2. Environment variables (prefixed with SENTINEL__)

use anyhow::{Context, Result};
use fence_sentinel::config::{Config, LoggingConfig};
use fence_sentinel::{run_feed, FeedItem, Session, SessionCommand};
use std::sync::Arc;
use tokio::io::BufReader;
use tokio::signal;
use tokio::sync::mpsc;
use tracing::{debug, error, info, warn, Level};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

#[tokio::main]
async fn main() -> Result<()> {
    // Load configuration
    let config = Config::load().context("Failed to load configuration")?;

    // Initialize logging
    init_logging(&config.logging)?;

    info!(
        service = %config.service.name,
        version = env!("CARGO_PKG_VERSION"),
        "Starting Fence Sentinel"
    );

    if let Some(port) = config.service.metrics_port {
        init_metrics(port)?;
    }

    let session = Arc::new(Session::from_config(&config).context("Failed to create frame source")?);

    if config.camera.autostart {
        if let Err(e) = session.apply(SessionCommand::StartCamera).await {
            warn!(error = %e, "Frame source failed to start, captures disabled");
        }
    }

    let (feed_tx, feed_rx) = mpsc::channel::<FeedItem>(config.buffers.snapshot_queue);

    // Spawn reduction loop; commands and snapshots share it to keep line order
    let mut reducer_handle = tokio::spawn({
        let session = session.clone();
        async move {
            session.run(feed_rx).await;
        }
    });

    // Spawn rendered view publisher
    let view_handle = tokio::spawn({
        let mut view = session.subscribe();
        async move {
            while view.changed().await.is_ok() {
                let state = view.borrow_and_update().clone();
                match serde_json::to_string(&state) {
                    Ok(json) => debug!(state = %json, "State updated"),
                    Err(e) => warn!(error = %e, "Failed to serialize state"),
                }
            }
        }
    });

    // Spawn stdin feed
    let feed_handle = tokio::spawn(async move {
        let stdin = BufReader::new(tokio::io::stdin());
        if let Err(e) = run_feed(stdin, feed_tx).await {
            error!(error = %e, "Feed error");
        }
    });

    tokio::select! {
        _ = shutdown_signal() => {
            info!("Initiating graceful shutdown...");
            // Closing the feed lets the reduction loop finish in-flight captures.
            feed_handle.abort();
            if let Err(e) = (&mut reducer_handle).await {
                error!(error = %e, "Reduction loop failed");
            }
        }
        result = &mut reducer_handle => {
            if let Err(e) = result {
                error!(error = %e, "Reduction loop failed");
            }
            info!("Snapshot feed drained");
        }
    }

    view_handle.abort();
    session.shutdown().await;

    info!("Shutdown complete");
    Ok(())
}

/// Initialize the tracing/logging subsystem.
fn init_logging(config: &LoggingConfig) -> Result<()> {
    let level = match config.level.to_lowercase().as_str() {
        "trace" => Level::TRACE,
        "debug" => Level::DEBUG,
        "info" => Level::INFO,
        "warn" => Level::WARN,
        "error" => Level::ERROR,
        _ => Level::INFO,
    };

    let filter = EnvFilter::from_default_env()
        .add_directive(format!("fence_sentinel={}", level).parse()?)
        .add_directive(format!("sentinel={}", level).parse()?);

    let subscriber = tracing_subscriber::registry().with(filter);

    // Logs go to stderr; stdin carries the feed.
    if config.format == "json" {
        subscriber
            .with(fmt::layer().json().with_writer(std::io::stderr))
            .init();
    } else {
        subscriber
            .with(fmt::layer().pretty().with_writer(std::io::stderr))
            .init();
    }

    Ok(())
}

/// Initialize Prometheus metrics exporter
fn init_metrics(port: u16) -> Result<()> {
    metrics_exporter_prometheus::PrometheusBuilder::new()
        .with_http_listener(([0, 0, 0, 0], port))
        .install()
        .context("Failed to install Prometheus metrics exporter")?;

    info!(port = port, "Prometheus metrics exporter started");

    Ok(())
}

/// Wait for shutdown signal (SIGINT or SIGTERM)
async fn shutdown_signal() {
    let ctrl_c = async {
        signal::ctrl_c()
            .await
            .expect("Failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        signal::unix::signal(signal::unix::SignalKind::terminate())
            .expect("Failed to install SIGTERM handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            info!("Received Ctrl+C signal");
        }
        _ = terminate => {
            info!("Received SIGTERM signal");
        }
    }
}
