//! HTTP adaptation of the command surface.
//!
//! Library mode serves the transfer/status API; provisioning mode serves
//! the captive credential portal. Both are thin wrappers: every handler
//! delegates to `core` and only maps results onto status codes.

pub mod api;
pub mod portal;

use std::net::SocketAddr;

use axum::Router;
use tokio_util::sync::CancellationToken;

/// Axum server with graceful shutdown tied to the daemon lifecycle.
pub struct WebServer {
    bind_addr: SocketAddr,
    router: Router,
    shutdown: CancellationToken,
}

impl WebServer {
    pub fn new(router: Router, bind_addr: SocketAddr, shutdown: CancellationToken) -> Self {
        Self {
            bind_addr,
            router,
            shutdown,
        }
    }

    /// Serve until the shutdown token fires.
    pub async fn serve(self) -> anyhow::Result<()> {
        let listener = tokio::net::TcpListener::bind(self.bind_addr).await?;
        tracing::info!(addr = %self.bind_addr, "http surface listening");

        axum::serve(listener, self.router)
            .with_graceful_shutdown(self.shutdown.cancelled_owned())
            .await?;

        Ok(())
    }
}
