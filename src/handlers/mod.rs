mod health;
mod metrics;

pub use health::health_handler;
pub use metrics::metrics_handler;

use axum::{Router, routing::get};
use std::sync::Arc;
use tokio::net::TcpListener;
use tokio_util::sync::CancellationToken;
use tracing::info;

use crate::error::{GateError, Result};
use crate::state::AppState;

// Admin routes: liveness and Prometheus scrape
pub fn router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/health", get(health_handler))
        .route("/metrics", get(metrics_handler))
        .with_state(state)
}

/// Bind the admin listener. Failing here is a startup error.
pub async fn bind_admin(addr: &str) -> Result<TcpListener> {
    TcpListener::bind(addr)
        .await
        .map_err(|source| GateError::Bind {
            addr: addr.to_string(),
            source,
        })
}

pub async fn serve_admin(
    listener: TcpListener,
    state: Arc<AppState>,
    shutdown: CancellationToken,
) -> Result<()> {
    info!(addr = %listener.local_addr()?, "admin server listening");
    axum::serve(listener, router(state))
        .with_graceful_shutdown(shutdown.cancelled_owned())
        .await?;
    Ok(())
}
