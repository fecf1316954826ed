//! Inbound HTTP Server
//!
//! Serves the swap API together with /live, /ready and /metrics on a
//! single axum 0.7 listener.

pub mod routes;

use tokio::sync::broadcast;
use tracing::{info, instrument};

pub use routes::{AppState, router};

/// Bind and serve until the shutdown signal fires.
#[instrument(skip(state, shutdown_rx))]
pub async fn serve(
  state: AppState,
  bind_address: String,
  mut shutdown_rx: broadcast::Receiver<()>,
) -> anyhow::Result<()> {
  let app = router(state);
  let listener = tokio::net::TcpListener::bind(&bind_address).await?;
  info!(address = %bind_address, "Swap API server started");

  axum::serve(listener, app)
    .with_graceful_shutdown(async move {
      let _ = shutdown_rx.recv().await;
    })
    .await?;

  Ok(())
}
