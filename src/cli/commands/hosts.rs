//! `hosts`: list, add and remove stored hosts.

use super::CommandContext;
use anyhow::{anyhow, Result};
use clap::{Parser, Subcommand};
use fleetshell::host::HostDescriptor;

/// Arguments for the hosts command
#[derive(Parser, Debug, Clone)]
pub struct HostsArgs {
    #[command(subcommand)]
    pub action: HostsAction,
}

/// Host store operations
#[derive(Subcommand, Debug, Clone)]
pub enum HostsAction {
    /// List stored hosts
    List {
        /// Case-insensitive filter on user or address
        #[arg(short, long, default_value = "")]
        search: String,

        /// Page number (1-based)
        #[arg(short, long, default_value_t = 1)]
        page: usize,
    },

    /// Add a host
    Add {
        /// Address (`host`, `host:port` or `[v6]:port`)
        #[arg(long)]
        address: String,

        /// Login user
        #[arg(long)]
        user: String,

        /// Login password
        #[arg(long, env = "FLEETSHELL_PASSWORD", hide_env_values = true)]
        password: String,

        /// Command alias as NAME=COMMAND (repeatable)
        #[arg(long = "alias", value_parser = parse_alias, action = clap::ArgAction::Append)]
        aliases: Vec<(String, String)>,
    },

    /// Remove a host by address
    Remove {
        /// Address of the host to remove
        address: String,
    },
}

fn parse_alias(value: &str) -> Result<(String, String)> {
    let (name, command) = value
        .split_once('=')
        .ok_or_else(|| anyhow!("expected NAME=COMMAND, got '{}'", value))?;
    if name.trim().is_empty() || command.trim().is_empty() {
        return Err(anyhow!("alias name and command must not be empty"));
    }
    Ok((name.trim().to_string(), command.to_string()))
}

impl HostsArgs {
    /// Execute the command
    pub async fn execute(&self, ctx: &mut CommandContext) -> Result<i32> {
        let store = ctx.open_store()?;

        match &self.action {
            HostsAction::List { search, page } => {
                let page_size = ctx.config.server.page_size.max(1);
                let page = (*page).max(1);
                let total = store.count(search)?;
                let records = store.search(search, page_size, (page - 1) * page_size)?;

                let rows: Vec<Vec<String>> = records
                    .iter()
                    .map(|record| {
                        let mut aliases: Vec<&str> =
                            record.host.commands.keys().map(String::as_str).collect();
                        aliases.sort_unstable();
                        vec![
                            record.id.to_string(),
                            record.host.address.clone(),
                            record.host.user.clone(),
                            aliases.join(","),
                        ]
                    })
                    .collect();

                ctx.output.table(&["ID", "ADDRESS", "USER", "ALIASES"], &rows);
                ctx.output.plain(&format!(
                    "page {} of {} ({} hosts)",
                    page,
                    total.div_ceil(page_size).max(1),
                    total
                ));
            }
            HostsAction::Add {
                address,
                user,
                password,
                aliases,
            } => {
                let mut host = HostDescriptor::new(address, user, password);
                host.commands.extend(aliases.iter().cloned());
                let record = store.create(host)?;
                ctx.output
                    .plain(&format!("Added host {} (id {})", record.host.address, record.id));
            }
            HostsAction::Remove { address } => {
                store.remove(address)?;
                ctx.output.plain(&format!("Removed host {}", address));
            }
        }

        Ok(0)
    }
}
