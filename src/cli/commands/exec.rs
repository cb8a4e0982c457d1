//! `exec`: run one command on stored hosts.

use super::CommandContext;
use anyhow::{bail, Result};
use clap::Parser;
use fleetshell::fleet::FleetDispatcher;
use fleetshell::host::HostDescriptor;
use std::time::Duration;

/// Arguments for the exec command
#[derive(Parser, Debug, Clone)]
pub struct ExecArgs {
    /// Command line or alias name to run
    pub command: String,

    /// Limit to these host addresses (default: every stored host)
    #[arg(short = 'H', long = "host", action = clap::ArgAction::Append)]
    pub hosts: Vec<String>,

    /// Hosts executing at the same time
    #[arg(short = 'f', long)]
    pub concurrency: Option<usize>,

    /// Per-host deadline in seconds (0 disables)
    #[arg(long)]
    pub timeout: Option<u64>,
}

impl ExecArgs {
    /// Execute the command; exit code 2 when any host failed
    pub async fn execute(&self, ctx: &mut CommandContext) -> Result<i32> {
        if self.command.trim().is_empty() {
            bail!("command must not be empty");
        }

        let store = ctx.open_store()?;
        let hosts: Vec<HostDescriptor> = if self.hosts.is_empty() {
            store
                .search("", ctx.config.fleet.max_hosts, 0)?
                .into_iter()
                .map(|record| record.host)
                .collect()
        } else {
            self.hosts
                .iter()
                .map(|address| store.get(address).map(|record| record.host))
                .collect::<Result<_, _>>()?
        };

        if hosts.is_empty() {
            ctx.output.warning("no hosts to run on");
            return Ok(0);
        }

        let host_timeout = match self.timeout {
            Some(0) => None,
            Some(secs) => Some(Duration::from_secs(secs)),
            None => ctx.config.host_timeout(),
        };

        let dispatcher = FleetDispatcher::new(ctx.connector())
            .with_max_concurrency(self.concurrency.unwrap_or(ctx.config.fleet.max_concurrency))
            .with_host_timeout(host_timeout);

        ctx.output.banner(&format!("EXEC: {}", self.command));
        ctx.output.info(&format!(
            "Running on {} hosts, {} at a time",
            hosts.len(),
            dispatcher.max_concurrency()
        ));

        let results = dispatcher.dispatch_all(&self.command, &hosts).await;
        ctx.output.fleet_result(&results);

        Ok(if results.failed_count() > 0 { 2 } else { 0 })
    }
}
