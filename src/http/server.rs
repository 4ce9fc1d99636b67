//! HTTP server implementation.

use std::future::Future;
use std::net::SocketAddr;
use std::sync::Arc;

use axum::http::HeaderName;
use tokio::net::TcpListener;
use tracing::{error, info};

use super::service::router;
use crate::error::{PenaltyBoxError, Result};
use crate::ratelimit::Limiter;

/// HTTP server fronting a rate limiter.
pub struct HttpServer<L: Limiter + 'static> {
    /// Address to bind to
    addr: SocketAddr,
    /// The rate limiter instance
    rate_limiter: Arc<L>,
    /// Header carrying the client identifier
    client_header: HeaderName,
}

impl<L: Limiter + 'static> HttpServer<L> {
    /// Create a new HTTP server.
    pub fn new(addr: SocketAddr, rate_limiter: Arc<L>, client_header: HeaderName) -> Self {
        Self {
            addr,
            rate_limiter,
            client_header,
        }
    }

    /// Bind the configured address and serve until `signal` resolves.
    pub async fn serve_with_shutdown<F>(self, signal: F) -> Result<()>
    where
        F: Future<Output = ()> + Send + 'static,
    {
        let listener = TcpListener::bind(self.addr).await.map_err(|e| {
            error!(addr = %self.addr, error = %e, "Failed to bind HTTP listener");
            PenaltyBoxError::Io(e)
        })?;
        self.serve_on(listener, signal).await
    }

    /// Serve on an already bound listener until `signal` resolves.
    pub async fn serve_on<F>(self, listener: TcpListener, signal: F) -> Result<()>
    where
        F: Future<Output = ()> + Send + 'static,
    {
        let app = router(self.rate_limiter, self.client_header.clone());

        info!(
            addr = %listener.local_addr()?,
            client_header = %self.client_header,
            "Starting HTTP server with graceful shutdown"
        );

        axum::serve(
            listener,
            app.into_make_service_with_connect_info::<SocketAddr>(),
        )
        .with_graceful_shutdown(signal)
        .await
        .map_err(|e| {
            error!(error = %e, "HTTP server failed");
            PenaltyBoxError::Io(e)
        })
    }
}
