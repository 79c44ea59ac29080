use axum::routing::{get, post};
use axum::Router;
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::net::TcpListener;
use tokio_util::sync::CancellationToken;
use tower_http::trace::TraceLayer;

use super::handlers;
use crate::kernel::Kernel;
use crate::msgcore::MsgManager;
use crate::types::{Error, Result};

/// Shared state of every control handler.
#[derive(Debug, Clone)]
pub struct ControlState {
    pub kernel: Arc<Kernel>,
    pub dispatcher: Arc<MsgManager>,
}

/// Build the control router.
pub fn router(state: ControlState) -> Router {
    Router::new()
        .route("/start", post(handlers::start_kernel))
        .route("/stop", post(handlers::stop_kernel))
        .route("/start/{service}", post(handlers::start_service))
        .route("/stop/{service}", post(handlers::stop_service))
        .route("/status", get(handlers::status))
        .route("/health", get(handlers::health))
        .route("/messages", post(handlers::post_message))
        .route("/messages/recent", get(handlers::recent_messages))
        .route("/messages/handlers", get(handlers::handlers))
        .route("/{service}/stats", get(handlers::service_stats))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

/// HTTP server bound to a kernel, stopped through its cancellation token.
#[derive(Debug)]
pub struct ControlServer {
    state: ControlState,
    cancel: CancellationToken,
}

impl ControlServer {
    pub fn new(state: ControlState) -> Self {
        Self {
            state,
            cancel: CancellationToken::new(),
        }
    }

    /// Token that triggers graceful shutdown when cancelled.
    pub fn shutdown_token(&self) -> CancellationToken {
        self.cancel.clone()
    }

    /// Bind `addr` and serve until shutdown.
    pub async fn serve(self, addr: &str) -> Result<()> {
        let addr: SocketAddr = addr
            .parse()
            .map_err(|e| Error::validation(format!("invalid listen address '{}': {}", addr, e)))?;
        let listener = TcpListener::bind(addr).await?;
        self.serve_on(listener).await
    }

    /// Serve on an already bound listener until shutdown.
    pub async fn serve_on(self, listener: TcpListener) -> Result<()> {
        let local = listener.local_addr()?;
        tracing::info!(
            addr = %local,
            kernel = %self.state.kernel.name(),
            "control_server_listening"
        );

        let cancel = self.cancel.clone();
        axum::serve(listener, router(self.state))
            .with_graceful_shutdown(async move { cancel.cancelled().await })
            .await?;

        tracing::info!(addr = %local, "control_server_stopped");
        Ok(())
    }
}
