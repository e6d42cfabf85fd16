//! camstream: serve a USB camera as a live MJPEG stream

use std::sync::Arc;

use clap::Parser;
use color_eyre::Result;
use tokio::net::TcpListener;
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

use camstream::capture::opener_for;
use camstream::server::{self, AppState};
use camstream::telemetry;
use camstream::{Config, DeviceController};

mod cli;

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize error handling and logging
    color_eyre::install()?;
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("camstream=info")),
        )
        .with_timer(tracing_subscriber::fmt::time::uptime())
        .init();

    let cli = cli::Cli::parse();
    let mut config = Config::load(cli.config.as_deref())?;
    cli.apply(&mut config);
    info!("Configuration: {:?}", config);
    let metrics = telemetry::init_metrics_recorder().cloned();

    let controller = Arc::new(DeviceController::new(
        config.device.clone(),
        opener_for(config.device.source),
    ));

    // Auto-start the camera
    let starter = Arc::clone(&controller);
    if let Err(err) = tokio::task::spawn_blocking(move || starter.start()).await? {
        error!("Failed to start camera. Please check if USB camera is connected.");
        return Err(err.into());
    }

    let listener = TcpListener::bind((config.server.host, config.server.port)).await?;
    let state = AppState {
        controller: Arc::clone(&controller),
        stream: config.stream.clone(),
        server: config.server.clone(),
        metrics,
    };

    let stopper = Arc::clone(&controller);
    let shutdown = async move {
        shutdown_signal().await;
        info!("Shutting down server...");
        // Ends every open stream so graceful shutdown can complete
        if let Err(err) = tokio::task::spawn_blocking(move || stopper.stop()).await {
            warn!("Camera stop task failed: {}", err);
        }
    };

    let served = server::serve(listener, state, shutdown).await;
    tokio::task::spawn_blocking(move || controller.stop()).await?;
    served?;

    info!("camstream shut down");
    Ok(())
}

/// Resolve on Ctrl-C or SIGTERM
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(err) = tokio::signal::ctrl_c().await {
            warn!("Failed to listen for Ctrl-C: {}", err);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(err) => {
                warn!("Failed to listen for SIGTERM: {}", err);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => {}
        () = terminate => {}
    }
}
