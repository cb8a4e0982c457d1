//! HTTP and WebSocket server for Fleetshell.
//!
//! # Routes
//!
//! - `POST /execute`: run a command on every stored host
//! - `POST /execute-command`: run a command on one stored host
//! - `GET /ws/:address`: metrics stream (JSON snapshot per interval)
//! - `GET /terminal/:address`: interactive terminal (binary both ways)
//! - `GET|POST|DELETE /hosts`, `GET /hosts/:id`: host records
//! - `GET /health`
//!
//! # Example
//!
//! ```rust,ignore
//! use std::sync::Arc;
//! use fleetshell::api::{ApiConfig, ApiServer, AppState};
//!
//! let state = Arc::new(AppState::new(config, store, connector));
//! ApiServer::new(ApiConfig::default(), state).run().await?;
//! ```

pub mod error;
pub mod handlers;
pub mod routes;
pub mod state;
pub mod types;
pub mod websocket;

use std::net::SocketAddr;
use std::sync::Arc;

use axum::Router;
use tokio::net::TcpListener;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;
use tracing::info;

pub use error::{ApiError, ApiResult};
pub use state::AppState;
pub use types::*;

use crate::config::Config;

/// Configuration for the API server.
#[derive(Debug, Clone)]
pub struct ApiConfig {
    /// Address to bind the server to
    pub bind_address: SocketAddr,
    /// Whether to enable CORS
    pub enable_cors: bool,
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            bind_address: SocketAddr::from(([0, 0, 0, 0], 3000)),
            enable_cors: true,
        }
    }
}

impl ApiConfig {
    /// Server settings from the loaded configuration.
    pub fn from_config(config: &Config) -> crate::error::Result<Self> {
        let bind_address = config.server.bind.parse().map_err(|e| {
            crate::error::Error::InvalidConfig(format!(
                "server.bind '{}': {}",
                config.server.bind, e
            ))
        })?;

        Ok(Self {
            bind_address,
            enable_cors: config.server.cors_permissive,
        })
    }

    /// Create a new API configuration with the specified bind address.
    pub fn with_address(mut self, addr: SocketAddr) -> Self {
        self.bind_address = addr;
        self
    }
}

/// The main API server.
pub struct ApiServer {
    config: ApiConfig,
    state: Arc<AppState>,
}

impl ApiServer {
    /// Create a new API server over existing state.
    pub fn new(config: ApiConfig, state: Arc<AppState>) -> Self {
        Self { config, state }
    }

    /// Build the router with all routes.
    pub fn router(&self) -> Router {
        let mut app = routes::api_routes(self.state.clone());

        // Add CORS layer if enabled
        if self.config.enable_cors {
            let cors = CorsLayer::new()
                .allow_origin(Any)
                .allow_methods(Any)
                .allow_headers(Any);
            app = app.layer(cors);
        }

        // Add tracing layer
        app.layer(TraceLayer::new_for_http())
    }

    /// Run the API server.
    pub async fn run(self) -> Result<(), std::io::Error> {
        self.run_with_shutdown(std::future::pending()).await
    }

    /// Run the server with graceful shutdown support.
    pub async fn run_with_shutdown(
        self,
        shutdown: impl std::future::Future<Output = ()> + Send + 'static,
    ) -> Result<(), std::io::Error> {
        let addr = self.config.bind_address;
        let router = self.router();

        info!("Starting Fleetshell API server on {}", addr);

        let listener = TcpListener::bind(addr).await?;
        axum::serve(listener, router)
            .with_graceful_shutdown(shutdown)
            .await
    }

    /// Get a reference to the application state.
    pub fn state(&self) -> Arc<AppState> {
        self.state.clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_api_config_default() {
        let config = ApiConfig::default();
        assert_eq!(config.bind_address.port(), 3000);
        assert!(config.enable_cors);
    }

    #[test]
    fn test_api_config_from_config() {
        let mut config = Config::default();
        config.server.bind = "127.0.0.1:8088".to_string();
        config.server.cors_permissive = false;

        let api = ApiConfig::from_config(&config).unwrap();
        assert_eq!(api.bind_address.port(), 8088);
        assert!(!api.enable_cors);
    }

    #[test]
    fn test_api_config_bad_bind() {
        let mut config = Config::default();
        config.server.bind = "not an address".to_string();
        assert!(ApiConfig::from_config(&config).is_err());
    }
}
