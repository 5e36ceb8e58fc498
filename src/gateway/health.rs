//! Liveness endpoint for process supervisors.
//!
//! Runs on its own task next to the polling loop and never touches the RAG
//! pipeline: bind → spawn background task → return handle with shutdown channel.

use std::net::SocketAddr;

use axum::routing::get;
use axum::{Json, Router};
use serde::Serialize;
use tokio::sync::oneshot;
use tokio::task::JoinHandle;

use super::GatewayError;

#[derive(Debug, Serialize)]
pub struct LivenessResponse {
    pub status: &'static str,
    pub version: &'static str,
}

/// `GET /`
pub async fn liveness() -> Json<LivenessResponse> {
    Json(LivenessResponse {
        status: "online",
        version: crate::config::APP_VERSION,
    })
}

pub fn health_router() -> Router {
    Router::new().route("/", get(liveness))
}

/// Handle to a running liveness server.
pub struct HealthServer {
    pub addr: SocketAddr,
    shutdown_tx: Option<oneshot::Sender<()>>,
    task: Option<JoinHandle<()>>,
}

impl HealthServer {
    /// Signal graceful shutdown. Safe to call more than once.
    pub fn shutdown(&mut self) {
        if let Some(tx) = self.shutdown_tx.take() {
            let _ = tx.send(());
            tracing::info!("Liveness server shutdown signal sent");
        }
    }

    /// Shut down and wait for the server task to finish.
    pub async fn stop(mut self) {
        self.shutdown();
        if let Some(task) = self.task.take() {
            if let Err(e) = task.await {
                tracing::warn!(error = %e, "Liveness server task ended abnormally");
            }
        }
    }
}

/// Bind `addr` and serve the liveness route in a background task.
pub async fn start_health_server(addr: SocketAddr) -> Result<HealthServer, GatewayError> {
    let listener = tokio::net::TcpListener::bind(addr).await?;
    let addr = listener.local_addr()?;

    let (shutdown_tx, shutdown_rx) = oneshot::channel::<()>();

    let task = tokio::spawn(async move {
        let shutdown_signal = async move {
            let _ = shutdown_rx.await;
        };

        tracing::info!(%addr, "Liveness server started");

        if let Err(e) = axum::serve(listener, health_router())
            .with_graceful_shutdown(shutdown_signal)
            .await
        {
            tracing::error!("Liveness server error: {e}");
        }

        tracing::info!("Liveness server stopped");
    });

    Ok(HealthServer {
        addr,
        shutdown_tx: Some(shutdown_tx),
        task: Some(task),
    })
}
