//! API route configuration.

use std::sync::Arc;

use axum::routing::{get, post};
use axum::Router;

use super::handlers;
use super::state::AppState;
use super::websocket;

/// Create the main API router with all routes.
pub fn api_routes(state: Arc<AppState>) -> Router {
    Router::new()
        .merge(execution_routes())
        .merge(host_routes())
        // WebSocket routes
        .merge(websocket_routes())
        // Add state
        .with_state(state)
}

/// Fleet and single-host execution.
fn execution_routes() -> Router<Arc<AppState>> {
    Router::new()
        .route("/health", get(handlers::health_check))
        .route("/execute", post(handlers::execute))
        .route("/execute-command", post(handlers::execute_command))
}

/// Host record management.
fn host_routes() -> Router<Arc<AppState>> {
    Router::new()
        .route(
            "/hosts",
            get(handlers::list_hosts)
                .post(handlers::upsert_host)
                .delete(handlers::remove_host),
        )
        .route("/hosts/:id", get(handlers::get_host))
}

/// Metrics and terminal streams.
fn websocket_routes() -> Router<Arc<AppState>> {
    Router::new()
        .route("/ws/:address", get(websocket::metrics_ws_handler))
        .route("/terminal/:address", get(websocket::terminal_ws_handler))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Config;
    use crate::store::FileHostStore;

    #[cfg(feature = "russh")]
    #[test]
    fn test_router_creation() {
        use crate::connection::{SshConnector, SshOptions};

        let state = Arc::new(AppState::new(
            Config::default(),
            Arc::new(FileHostStore::in_memory()),
            Arc::new(SshConnector::new(SshOptions::default())),
        ));
        let _router = api_routes(state);
        // Just verify it doesn't panic
    }
}
