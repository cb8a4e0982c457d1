//! # Fleetshell - SSH Fleet Management
//!
//! Fleetshell runs shell commands across a fleet of SSH hosts, streams
//! periodic health metrics from individual hosts, and bridges interactive
//! terminal sessions to a persistent duplex channel such as a WebSocket.
//!
//! ## Core Concepts
//!
//! - **Hosts**: [`HostDescriptor`](host::HostDescriptor) values read from a
//!   [`HostStore`](store::HostStore)
//! - **Connections**: a [`Connector`](connection::Connector) opens one live SSH
//!   transport per operation; sessions are channels on that transport
//! - **Fleet execution**: one command fanned out to many hosts with bounded
//!   concurrency and per-host failure isolation
//! - **Metrics**: a fixed battery of diagnostic commands parsed into a snapshot
//!   on every polling cycle
//! - **Terminals**: a PTY-backed shell pumped both ways over a duplex channel
//!
//! ## Architecture Overview
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────┐
//! │                 CLI (clap)          HTTP / WebSocket API (axum)      │
//! └─────────────────────────────────────────────────────────────────────┘
//!                                    │
//!          ┌─────────────────────────┼─────────────────────────┐
//!          ▼                         ▼                         ▼
//! ┌─────────────────┐   ┌─────────────────────┐   ┌─────────────────────┐
//! │ FleetDispatcher │   │  MetricsCollector   │   │   TerminalBridge    │
//! │  (fan-out)      │   │  (polling loop)     │   │   (PTY pumps)       │
//! └─────────────────┘   └─────────────────────┘   └─────────────────────┘
//!          │                         │                         │
//!          └─────────────────────────┼─────────────────────────┘
//!                                    ▼
//! ┌─────────────────────────────────────────────────────────────────────┐
//! │             Connector / Connection / Session (russh)                 │
//! └─────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Quick Example
//!
//! ```rust,ignore
//! use std::sync::Arc;
//! use fleetshell::prelude::*;
//!
//! #[tokio::main]
//! async fn main() -> Result<()> {
//!     let connector = Arc::new(SshConnector::new(SshOptions::default()));
//!     let hosts = vec![
//!         HostDescriptor::new("10.0.0.5:22", "admin", "secret"),
//!         HostDescriptor::new("10.0.0.6:22", "admin", "secret"),
//!     ];
//!
//!     let results = FleetDispatcher::new(connector)
//!         .with_max_concurrency(8)
//!         .dispatch_all("uptime", &hosts)
//!         .await;
//!
//!     for result in results.iter() {
//!         println!("{}: {}", result.host, result.text());
//!     }
//!     Ok(())
//! }
//! ```

#![warn(clippy::all)]
#![allow(clippy::module_name_repetitions)]

// Re-export commonly used items in prelude
pub mod prelude {
    //! Convenient re-exports of commonly used types and traits.

    // Connection types
    #[cfg(feature = "russh")]
    pub use crate::connection::{SshConnection, SshConnector, SshOptions};
    pub use crate::connection::{
        Connection, ConnectionError, ConnectionResult, Connector, ExecOutput, PtyRequest,
        Session, ShellExit, ShellProcess,
    };

    // Channels
    pub use crate::channel::{ChannelError, ChannelMessage, ChannelSink, ChannelSource};

    // Error handling
    pub use crate::error::{Error, Result};

    // Hosts and storage
    pub use crate::host::HostDescriptor;
    pub use crate::store::{FileHostStore, HostRecord, HostStore, StoreError};

    // Subsystems
    pub use crate::fleet::{CommandOutcome, CommandResult, FleetDispatcher, FleetResult};
    pub use crate::metrics::{MetricKey, MetricSpec, MetricsCollector, MetricsSnapshot};
    pub use crate::terminal::{BridgeState, TerminalBridge, TerminalOptions};

    // Configuration
    pub use crate::config::Config;
}

// ============================================================================
// Core Modules
// ============================================================================

/// Error types and result aliases for Fleetshell operations.
pub mod error;

/// Host descriptors: address, login user, credential and command aliases.
pub mod host;

/// Connection layer: the connector, connection and session traits and the
/// russh-backed SSH implementation.
pub mod connection;

/// Duplex message channels used by the metrics and terminal streams.
pub mod channel;

// ============================================================================
// Remote Operations
// ============================================================================

/// Single-host command execution.
pub mod executor;

/// Concurrent fan-out execution across many hosts.
///
/// Every host runs in its own task, bounded by a semaphore. A failure on one
/// host is recorded as that host's result and never affects the others.
pub mod fleet;

/// Host health metrics: diagnostic battery, output parsers and the polling
/// collector.
pub mod metrics;

/// Interactive terminal bridging between a remote PTY and a duplex channel.
pub mod terminal;

// ============================================================================
// Storage and Configuration
// ============================================================================

/// Host record storage.
pub mod store;

/// Configuration management for Fleetshell behavior.
///
/// Handles loading and merging configuration from multiple sources:
/// environment variables, config files, and command-line arguments.
pub mod config;

// ============================================================================
// HTTP API
// ============================================================================

/// HTTP and WebSocket server exposing fleet execution, host records and the
/// metrics and terminal streams.
#[cfg(feature = "api")]
pub mod api;

// ============================================================================
// Version Information
// ============================================================================

/// Returns the current version of Fleetshell.
pub fn version() -> &'static str {
    env!("CARGO_PKG_VERSION")
}
