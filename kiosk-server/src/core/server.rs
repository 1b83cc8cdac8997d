//! Server Implementation
//!
//! HTTP 服务器启动和管理

use std::net::SocketAddr;

use anyhow::Context;

use crate::core::{Config, ServerState};
use crate::routes::build_app;

/// HTTP Server
pub struct Server {
    config: Config,
    state: Option<ServerState>,
}

impl Server {
    pub fn new(config: Config) -> Self {
        Self {
            config,
            state: None,
        }
    }

    /// Create server with existing state (for sharing with oneshot)
    pub fn with_state(config: Config, state: ServerState) -> Self {
        Self {
            config,
            state: Some(state),
        }
    }

    pub async fn run(&self) -> anyhow::Result<()> {
        let state = match &self.state {
            Some(s) => s.clone(),
            None => ServerState::initialize(&self.config),
        };

        state
            .warm_up()
            .await
            .map_err(|e| anyhow::anyhow!("ledger warm-up failed: {}", e))?;
        let tasks = state.start_background_tasks();

        let addr = SocketAddr::from(([0, 0, 0, 0], self.config.http_port));
        let listener = tokio::net::TcpListener::bind(addr)
            .await
            .with_context(|| format!("failed to bind {}", addr))?;
        tracing::info!("Kiosk server listening on {}", addr);

        let app = build_app(&state).with_state(state.clone());
        let shutdown = state.shutdown.clone();
        let broadcaster = state.broadcaster.clone();
        axum::serve(listener, app)
            .with_graceful_shutdown(async move {
                tokio::select! {
                    _ = tokio::signal::ctrl_c() => tracing::info!("Shutting down..."),
                    _ = shutdown.cancelled() => {}
                }
                shutdown.cancel();
                // Open event streams hold connections; end them so serve can return.
                broadcaster.close_all();
            })
            .await
            .context("HTTP server error")?;

        tasks.shutdown(self.config.shutdown_timeout()).await;
        Ok(())
    }
}
