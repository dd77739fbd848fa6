pub mod handlers;
pub mod router;

use std::sync::Arc;

use anyhow::Context;
use tokio::net::TcpListener;

use crate::state::AppState;

/// Binds `host:port` and serves the HTTP API until Ctrl-C.
pub async fn serve(state: Arc<AppState>, host: &str, port: u16) -> anyhow::Result<()> {
    let bind_addr = format!("{}:{}", host, port);
    let listener = TcpListener::bind(&bind_addr)
        .await
        .with_context(|| format!("Failed to bind to {}", bind_addr))?;
    let addr = listener.local_addr()?;

    tracing::info!("Listening on http://{}", addr);

    let app = router::router(state);
    axum::serve(listener, app)
        .with_graceful_shutdown(async {
            let _ = tokio::signal::ctrl_c().await;
            tracing::info!("shutting down");
        })
        .await
        .context("Server error")?;

    Ok(())
}
