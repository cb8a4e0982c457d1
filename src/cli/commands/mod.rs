//! Subcommands module for the Fleetshell CLI
//!
//! This module contains all the subcommand implementations.

pub mod exec;
pub mod hosts;
pub mod metrics;
pub mod serve;

use crate::cli::output::OutputFormatter;
use anyhow::{Context, Result};
use fleetshell::config::Config;
use fleetshell::connection::{Connector, SshConnector};
use fleetshell::store::{FileHostStore, HostStore};
use is_terminal::IsTerminal;
use std::sync::Arc;

/// Common context shared between commands
pub struct CommandContext {
    /// Configuration
    pub config: Config,
    /// Output formatter
    pub output: OutputFormatter,
    /// Verbosity level
    pub verbosity: u8,
}

impl CommandContext {
    /// Create a new command context from CLI arguments
    pub fn new(cli: &crate::cli::Cli, mut config: Config) -> Self {
        let use_color = !cli.no_color && std::io::stdout().is_terminal();
        let output = OutputFormatter::new(use_color, cli.is_json(), cli.verbosity());

        if let Some(path) = &cli.store {
            config.store.path = Some(path.clone());
        }

        Self {
            config,
            output,
            verbosity: cli.verbosity(),
        }
    }

    /// Open the configured host store
    pub fn open_store(&self) -> Result<Arc<dyn HostStore>> {
        match self.config.store_path() {
            Some(path) => {
                let store = FileHostStore::open(&path)
                    .with_context(|| format!("Failed to open host store: {}", path.display()))?;
                Ok(Arc::new(store))
            }
            None => Ok(Arc::new(FileHostStore::in_memory())),
        }
    }

    /// SSH connector built from the configuration
    pub fn connector(&self) -> Arc<dyn Connector> {
        if self.config.ssh.accept_any_host_key {
            self.output
                .warning("accepting any SSH host key; server identities are not verified");
        }
        Arc::new(SshConnector::new(self.config.ssh_options()))
    }
}
