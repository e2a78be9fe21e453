use crate::app::ComponentRegistry;
use crate::config::ControlConfig;
use crate::error::{ControlError, Result};
use crate::run_state::RunStateStore;
use axum::{routing::get, Router};
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Instant;
use tokio::net::TcpListener;
use tokio_util::sync::CancellationToken;
use tower_http::trace::TraceLayer;
use tracing::info;

use super::handlers::{get_state_handler, health_handler, put_state_handler};

/// Shared state for the Axum server
#[derive(Clone)]
pub struct ControlState {
    pub(crate) run_state: Arc<RunStateStore>,
    pub(crate) components: ComponentRegistry,
    pub(crate) started_at: Instant,
}

impl ControlState {
    pub fn new(run_state: Arc<RunStateStore>, components: ComponentRegistry) -> Self {
        Self {
            run_state,
            components,
            started_at: Instant::now(),
        }
    }
}

/// Routes of the control surface
pub fn router(state: ControlState) -> Router {
    Router::new()
        .route("/state", get(get_state_handler).put(put_state_handler))
        .route("/health", get(health_handler))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

/// HTTP server exposing get/set of the run state
pub struct ControlServer {
    listener: TcpListener,
    state: ControlState,
}

impl ControlServer {
    /// Bind the listening socket; serving starts with `serve`
    pub async fn bind(config: &ControlConfig, state: ControlState) -> Result<Self> {
        let addr = format!("{}:{}", config.ip, config.port);

        let listener = TcpListener::bind(&addr)
            .await
            .map_err(|e| ControlError::BindFailed {
                address: addr.clone(),
                source: e,
            })?;

        info!("Control surface listening on {}", addr);
        Ok(Self { listener, state })
    }

    pub fn local_addr(&self) -> Result<SocketAddr> {
        Ok(self.listener.local_addr()?)
    }

    /// Serve until `shutdown` is cancelled
    pub async fn serve(self, shutdown: CancellationToken) -> Result<()> {
        let app = router(self.state);

        axum::serve(self.listener, app)
            .with_graceful_shutdown(async move { shutdown.cancelled().await })
            .await
            .map_err(|e| ControlError::ServerFailed {
                details: format!("Server error: {}", e),
            })?;

        info!("Control surface stopped");
        Ok(())
    }
}
