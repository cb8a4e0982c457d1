//! Application state management.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Instant;

use crate::config::Config;
use crate::connection::Connector;
use crate::fleet::FleetDispatcher;
use crate::host::HostDescriptor;
use crate::metrics::MetricsCollector;
use crate::store::{HostStore, StoreResult};
use crate::terminal::TerminalBridge;

/// Shared application state.
///
/// Handlers reach the host store and the connector only through this value;
/// there is no process-wide state.
pub struct AppState {
    /// Host records
    pub store: Arc<dyn HostStore>,
    /// Opens SSH connections
    pub connector: Arc<dyn Connector>,
    /// Loaded configuration
    pub config: Config,
    /// Server start time
    pub start_time: Instant,
    /// Open metrics and terminal streams
    active_streams: AtomicUsize,
}

impl AppState {
    /// Create a new application state.
    pub fn new(config: Config, store: Arc<dyn HostStore>, connector: Arc<dyn Connector>) -> Self {
        Self {
            store,
            connector,
            config,
            start_time: Instant::now(),
            active_streams: AtomicUsize::new(0),
        }
    }

    /// Get server uptime in seconds.
    pub fn uptime_secs(&self) -> u64 {
        self.start_time.elapsed().as_secs()
    }

    /// Number of open metrics and terminal streams.
    pub fn active_streams(&self) -> usize {
        self.active_streams.load(Ordering::Relaxed)
    }

    /// Count a stream as open until the guard is dropped.
    pub fn track_stream(&self) -> StreamGuard<'_> {
        self.active_streams.fetch_add(1, Ordering::Relaxed);
        StreamGuard { state: self }
    }

    /// Hosts included in a fleet execution.
    pub fn fleet_hosts(&self) -> StoreResult<Vec<HostDescriptor>> {
        Ok(self
            .store
            .search("", self.config.fleet.max_hosts, 0)?
            .into_iter()
            .map(|record| record.host)
            .collect())
    }

    /// Fleet dispatcher built from the configuration.
    pub fn dispatcher(&self) -> FleetDispatcher {
        FleetDispatcher::new(Arc::clone(&self.connector))
            .with_max_concurrency(self.config.fleet.max_concurrency)
            .with_host_timeout(self.config.host_timeout())
    }

    /// Metrics collector built from the configuration.
    pub fn collector(&self) -> MetricsCollector {
        MetricsCollector::new(Arc::clone(&self.connector))
            .with_specs(self.config.metrics.commands.clone())
            .with_interval(self.config.metrics_interval())
            .with_command_timeout(self.config.metrics_command_timeout())
    }

    /// Terminal bridge built from the configuration.
    pub fn terminal(&self) -> TerminalBridge {
        TerminalBridge::new(Arc::clone(&self.connector)).with_options(self.config.terminal_options())
    }
}

/// Keeps a stream counted as open.
pub struct StreamGuard<'a> {
    state: &'a AppState,
}

impl Drop for StreamGuard<'_> {
    fn drop(&mut self) {
        self.state.active_streams.fetch_sub(1, Ordering::Relaxed);
    }
}
