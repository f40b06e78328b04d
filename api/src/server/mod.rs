//! API Server Module
//!
//! Router construction and the listener that serves scoring traffic.

use anyhow::Result;
use axum::{
    routing::{get, post},
    Router,
};
use std::future::Future;
use std::sync::Arc;
use tower_http::trace::TraceLayer;
use tracing::info;

use fraudguard_core::InferenceService;

use crate::handlers::{health_check, model_info, predict, ApiState};
use crate::models::ApiConfig;

/// Build the application router
pub fn router(state: Arc<ApiState>) -> Router {
    Router::new()
        .route("/health", get(health_check))
        .route("/predict", post(predict))
        .route("/model", get(model_info))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

/// Main API server
pub struct ApiServer {
    /// Server configuration
    config: ApiConfig,
    /// Shared state
    state: Arc<ApiState>,
}

impl ApiServer {
    /// Create a new API server
    pub fn new(config: ApiConfig, inference: Arc<InferenceService>) -> Self {
        let state = Arc::new(ApiState {
            inference,
            api_token: config.api_token.clone(),
            response_mode: config.response_mode,
        });

        Self { config, state }
    }

    pub fn router(&self) -> Router {
        router(self.state.clone())
    }

    /// Serve until `shutdown` resolves
    pub async fn start<F>(&self, shutdown: F) -> Result<()>
    where
        F: Future<Output = ()> + Send + 'static,
    {
        if self.state.api_token.is_none() {
            tracing::warn!("No API token configured; every scoring request will be rejected");
        }

        let listener =
            tokio::net::TcpListener::bind((self.config.host.as_str(), self.config.port)).await?;
        info!(
            "FraudGuard API server listening on {}",
            listener.local_addr()?
        );

        axum::serve(listener, self.router())
            .with_graceful_shutdown(shutdown)
            .await
            .map_err(|e| anyhow::anyhow!("Failed to start API server: {}", e))?;

        info!("FraudGuard API server stopped");
        Ok(())
    }
}
