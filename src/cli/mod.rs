//! CLI module for Fleetshell
//!
//! This module provides the command-line interface for Fleetshell,
//! including argument parsing and subcommand handling.

pub mod commands;
pub mod output;

use clap::{Parser, Subcommand, ValueEnum};
use std::path::PathBuf;

/// Fleetshell - SSH fleet management
///
/// Run commands across many hosts, watch host metrics, and serve the
/// HTTP/WebSocket API.
#[derive(Parser, Debug, Clone)]
#[command(name = "fleetshell")]
#[command(author = "Fleetshell Contributors")]
#[command(version)]
#[command(about = "Run commands across a fleet of SSH hosts", long_about = None)]
#[command(propagate_version = true)]
pub struct Cli {
    /// Subcommand to execute
    #[command(subcommand)]
    pub command: Commands,

    /// Verbosity level (-v, -vv, -vvv)
    #[arg(short = 'v', long, global = true, action = clap::ArgAction::Count)]
    pub verbose: u8,

    /// Output format
    #[arg(long, global = true, default_value = "human")]
    pub output: OutputFormat,

    /// Path to configuration file
    #[arg(short = 'c', long, global = true, env = "FLEETSHELL_CONFIG")]
    pub config: Option<PathBuf>,

    /// Path to the host store file
    #[arg(long, global = true)]
    pub store: Option<PathBuf>,

    /// Disable colored output
    #[arg(long, global = true)]
    pub no_color: bool,
}

/// Output format for CLI
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, ValueEnum)]
pub enum OutputFormat {
    /// Human-readable output with colors
    #[default]
    Human,
    /// JSON output for scripting
    Json,
}

/// Available subcommands
#[derive(Subcommand, Debug, Clone)]
pub enum Commands {
    /// Serve the HTTP and WebSocket API
    Serve(commands::serve::ServeArgs),

    /// Run a command on stored hosts
    Exec(commands::exec::ExecArgs),

    /// Poll metrics from one host
    Metrics(commands::metrics::MetricsArgs),

    /// Manage stored hosts
    Hosts(commands::hosts::HostsArgs),
}

impl Cli {
    /// Parse command-line arguments
    pub fn parse_args() -> Self {
        Cli::parse()
    }

    /// Get the effective verbosity level (0-3)
    pub fn verbosity(&self) -> u8 {
        self.verbose.min(3)
    }

    /// Check if JSON output is requested
    pub fn is_json(&self) -> bool {
        matches!(self.output, OutputFormat::Json)
    }
}
