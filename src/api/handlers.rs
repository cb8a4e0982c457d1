//! API route handlers.

use std::sync::Arc;

use axum::extract::{Path, Query, State};
use axum::response::IntoResponse;
use axum::Json;
use tracing::info;

use super::error::{ApiError, ApiResult};
use super::state::AppState;
use super::types::*;
use crate::executor;
use crate::fleet::FleetResult;

// ============================================================================
// Health
// ============================================================================

/// Health check endpoint.
pub async fn health_check(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    Json(HealthResponse {
        status: "healthy".to_string(),
        version: crate::version().to_string(),
        uptime_secs: state.uptime_secs(),
        active_streams: state.active_streams(),
    })
}

// ============================================================================
// Execution Handlers
// ============================================================================

/// Run a command on every stored host.
pub async fn execute(
    State(state): State<Arc<AppState>>,
    Json(req): Json<ExecuteRequest>,
) -> ApiResult<Json<FleetResult>> {
    if req.command.trim().is_empty() {
        return Err(ApiError::BadRequest("command must not be empty".to_string()));
    }

    let hosts = state.fleet_hosts()?;
    info!(hosts = hosts.len(), command = %req.command, "Fleet execution requested");

    let results = state.dispatcher().dispatch_all(&req.command, &hosts).await;
    Ok(Json(results))
}

/// Run a command on one stored host.
pub async fn execute_command(
    State(state): State<Arc<AppState>>,
    Json(req): Json<ExecuteCommandRequest>,
) -> ApiResult<Json<ExecuteCommandResponse>> {
    if req.command.trim().is_empty() {
        return Err(ApiError::BadRequest("command must not be empty".to_string()));
    }

    let record = state.store.get(&req.address)?;
    info!(host = %record.host.address, command = %req.command, "Command requested");

    let output = executor::execute_on_host(
        state.connector.as_ref(),
        &record.host,
        &req.command,
        state.config.host_timeout(),
    )
    .await?;

    Ok(Json(ExecuteCommandResponse { output }))
}

// ============================================================================
// Host Handlers
// ============================================================================

/// List hosts, one page at a time.
pub async fn list_hosts(
    State(state): State<Arc<AppState>>,
    Query(query): Query<HostListQuery>,
) -> ApiResult<Json<HostListResponse>> {
    let page_size = state.config.server.page_size.max(1);
    let page = query.page.unwrap_or(1).max(1);
    let search = query.search.unwrap_or_default();

    let total = state.store.count(&search)?;
    let hosts = state
        .store
        .search(&search, page_size, (page - 1) * page_size)?
        .into_iter()
        .map(HostView::from)
        .collect();

    Ok(Json(HostListResponse {
        hosts,
        page,
        total_pages: total.div_ceil(page_size),
        total,
        search,
    }))
}

/// Create a host, or update it when the request carries an id.
pub async fn upsert_host(
    State(state): State<Arc<AppState>>,
    Json(req): Json<HostUpsertRequest>,
) -> ApiResult<Json<MessageResponse>> {
    let (id, host) = req.into_descriptor();

    if id > 0 {
        let record = state.store.update(id, host)?;
        Ok(Json(
            MessageResponse::new("Host updated successfully").with_host(record.into()),
        ))
    } else {
        let record = state.store.create(host)?;
        Ok(Json(
            MessageResponse::new("Host added successfully").with_host(record.into()),
        ))
    }
}

/// Get one host by id.
pub async fn get_host(
    State(state): State<Arc<AppState>>,
    Path(id): Path<u64>,
) -> ApiResult<Json<HostView>> {
    Ok(Json(state.store.get_by_id(id)?.into()))
}

/// Remove a host by address.
pub async fn remove_host(
    State(state): State<Arc<AppState>>,
    Json(req): Json<RemoveHostRequest>,
) -> ApiResult<Json<MessageResponse>> {
    state.store.remove(&req.address)?;
    Ok(Json(MessageResponse::new("Host removed successfully")))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Config;
    use crate::connection::{Connection, ConnectionError, ConnectionResult, Connector};
    use crate::host::HostDescriptor;
    use crate::store::{FileHostStore, HostStore};
    use async_trait::async_trait;

    struct RefusingConnector;

    #[async_trait]
    impl Connector for RefusingConnector {
        async fn open(&self, host: &HostDescriptor) -> ConnectionResult<Arc<dyn Connection>> {
            Err(ConnectionError::ConnectionFailed {
                host: host.address.clone(),
                reason: "connection refused".to_string(),
            })
        }
    }

    fn state_with_hosts(count: usize) -> Arc<AppState> {
        let store = Arc::new(FileHostStore::in_memory());
        for i in 1..=count {
            store
                .create(HostDescriptor::new(format!("10.0.0.{}", i), "root", "pw"))
                .unwrap();
        }
        Arc::new(AppState::new(
            Config::default(),
            store,
            Arc::new(RefusingConnector),
        ))
    }

    #[tokio::test]
    async fn test_list_hosts_pages() {
        let state = state_with_hosts(6);

        let Json(page) = list_hosts(
            State(state.clone()),
            Query(HostListQuery {
                page: Some(2),
                search: None,
            }),
        )
        .await
        .unwrap();

        assert_eq!(page.total, 6);
        assert_eq!(page.total_pages, 2);
        assert_eq!(page.hosts.len(), 2);
        assert_eq!(page.hosts[0].address, "10.0.0.5");
    }

    #[tokio::test]
    async fn test_list_hosts_page_zero_is_first() {
        let state = state_with_hosts(1);
        let Json(page) = list_hosts(
            State(state),
            Query(HostListQuery {
                page: Some(0),
                search: Some("10.0".into()),
            }),
        )
        .await
        .unwrap();
        assert_eq!(page.page, 1);
        assert_eq!(page.hosts.len(), 1);
    }

    #[tokio::test]
    async fn test_execute_reports_every_host() {
        let state = state_with_hosts(3);
        let Json(results) = execute(
            State(state),
            Json(ExecuteRequest {
                command: "uptime".into(),
            }),
        )
        .await
        .unwrap();

        assert_eq!(results.len(), 3);
        assert_eq!(results.failed_count(), 3);
        assert!(results
            .get("10.0.0.2")
            .unwrap()
            .text()
            .contains("connection refused"));
    }

    #[tokio::test]
    async fn test_execute_command_unknown_host() {
        let state = state_with_hosts(0);
        let err = execute_command(
            State(state),
            Json(ExecuteCommandRequest {
                address: "10.9.9.9".into(),
                command: "uptime".into(),
            }),
        )
        .await
        .unwrap_err();
        assert!(matches!(err, ApiError::NotFound(_)));
    }

    #[tokio::test]
    async fn test_upsert_then_get() {
        let state = state_with_hosts(0);

        let Json(created) = upsert_host(
            State(state.clone()),
            Json(HostUpsertRequest {
                id: 0,
                address: "10.0.0.7".into(),
                user: "root".into(),
                password: "pw".into(),
                commands: Default::default(),
            }),
        )
        .await
        .unwrap();
        let id = created.host.unwrap().id;

        upsert_host(
            State(state.clone()),
            Json(HostUpsertRequest {
                id,
                address: "10.0.0.7".into(),
                user: "admin".into(),
                password: String::new(),
                commands: Default::default(),
            }),
        )
        .await
        .unwrap();

        let Json(view) = get_host(State(state.clone()), Path(id)).await.unwrap();
        assert_eq!(view.user, "admin");
        assert!(view.has_password);
        assert_eq!(state.store.get("10.0.0.7").unwrap().host.credential, "pw");
    }

    #[tokio::test]
    async fn test_remove_unknown_host() {
        let state = state_with_hosts(0);
        let err = remove_host(
            State(state),
            Json(RemoveHostRequest {
                address: "nope".into(),
            }),
        )
        .await
        .unwrap_err();
        assert_eq!(err.status_code(), axum::http::StatusCode::NOT_FOUND);
    }
}
