use std::net::SocketAddr;
use std::sync::Arc;

use anyhow::{Context, Result};
use livecast_core::{Config, StreamRegistryClient};
use tokio_util::sync::CancellationToken;
use tracing::{error, info};

use crate::http::{create_router, AppState};

/// Run the HTTP API until SIGINT/SIGTERM
pub async fn serve(config: Config, registry: Arc<dyn StreamRegistryClient>) -> Result<()> {
    let http_address = config.http_address();
    let http_addr: SocketAddr = http_address
        .parse()
        .with_context(|| format!("Invalid HTTP address '{http_address}'"))?;

    let state = AppState::new(config, registry);
    let poller = state.streams.start();
    let router = create_router(state);

    let listener = tokio::net::TcpListener::bind(http_addr)
        .await
        .with_context(|| format!("Failed to bind HTTP address {http_addr}"))?;
    info!("HTTP server listening on {}", http_addr);

    let shutdown_token = CancellationToken::new();
    {
        let token = shutdown_token.clone();
        tokio::spawn(async move {
            shutdown_signal().await;
            token.cancel();
        });
    }

    let result = axum::serve(listener, router)
        .with_graceful_shutdown(async move { shutdown_token.cancelled().await })
        .await;

    poller.shutdown().await;

    if let Err(e) = result {
        error!("HTTP server error: {}", e);
        return Err(e.into());
    }
    info!("HTTP server shut down gracefully");
    Ok(())
}

/// Wait for a shutdown signal (SIGTERM or SIGINT/Ctrl+C)
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            error!("Failed to install Ctrl+C handler: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                error!("Failed to install SIGTERM handler: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => { info!("Received Ctrl+C"); }
        () = terminate => { info!("Received SIGTERM"); }
    }
}
