//! `serve`: run the HTTP and WebSocket API.

use super::CommandContext;
use anyhow::{Context, Result};
use clap::Parser;
use fleetshell::api::{ApiConfig, ApiServer, AppState};
use std::net::SocketAddr;
use std::sync::Arc;
use tracing::info;

/// Arguments for the serve command
#[derive(Parser, Debug, Clone)]
pub struct ServeArgs {
    /// Listen address (overrides server.bind)
    #[arg(short, long, env = "FLEETSHELL_BIND")]
    pub bind: Option<SocketAddr>,
}

impl ServeArgs {
    /// Execute the command; returns when interrupted
    pub async fn execute(&self, ctx: &mut CommandContext) -> Result<i32> {
        let mut api_config = ApiConfig::from_config(&ctx.config)?;
        if let Some(bind) = self.bind {
            api_config = api_config.with_address(bind);
        }

        let store = ctx.open_store()?;
        let connector = ctx.connector();
        let state = Arc::new(AppState::new(ctx.config.clone(), store, connector));

        ctx.output.banner("FLEETSHELL API");
        ctx.output
            .plain(&format!("Listening on http://{}", api_config.bind_address));

        ApiServer::new(api_config, state)
            .run_with_shutdown(async {
                let _ = tokio::signal::ctrl_c().await;
                info!("Shutdown requested");
            })
            .await
            .context("API server failed")?;

        Ok(0)
    }
}
