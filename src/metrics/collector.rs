//! Periodic metrics collection for one host.
//!
//! A [`MetricsCollector`] opens a single connection and reuses it for every
//! cycle. Each cycle runs the configured battery one command at a time, each
//! on a fresh session, and pushes the resulting snapshot to a channel sink as
//! JSON text. Per-metric failures become that metric's error text;
//! connection-level failures end the collector.

use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use super::{MetricReading, MetricSpec, MetricsSnapshot};
use crate::channel::{ChannelMessage, ChannelSink};
use crate::connection::{Connection, ConnectionError, Connector};
use crate::executor;
use crate::host::HostDescriptor;

/// Default time between the end of one cycle and the start of the next
pub const DEFAULT_INTERVAL: Duration = Duration::from_secs(5);

/// Errors that end a collector.
#[derive(Error, Debug)]
pub enum CollectorError {
    /// The connection could not be opened or became unusable.
    #[error(transparent)]
    Connection(#[from] ConnectionError),

    /// The client side of the channel went away.
    #[error("metrics channel closed by client")]
    ChannelClosed,
}

/// Run every spec once on `connection` and build a snapshot.
///
/// Only connection-level errors are returned; anything else is recorded
/// as the failing metric's reading.
pub async fn collect_snapshot(
    connection: &dyn Connection,
    specs: &[MetricSpec],
    command_timeout: Option<Duration>,
) -> Result<MetricsSnapshot, ConnectionError> {
    let mut snapshot = MetricsSnapshot::default();

    for spec in specs {
        let reading = match executor::run(connection, &spec.command, command_timeout).await {
            Ok(output) => MetricReading::Value(spec.key.parse(&output)),
            Err(e) if e.is_connection_level() => return Err(e),
            Err(e) => {
                debug!(metric = %spec.key, error = %e, "Metric command failed");
                MetricReading::Error(e.to_string())
            }
        };
        snapshot.insert(spec.key, reading);
    }

    Ok(snapshot)
}

/// Polls one host's metrics on a fixed interval.
#[derive(Clone)]
pub struct MetricsCollector {
    connector: Arc<dyn Connector>,
    specs: Vec<MetricSpec>,
    interval: Duration,
    command_timeout: Option<Duration>,
    max_cycles: Option<u64>,
}

impl MetricsCollector {
    /// Collector with the default battery and interval.
    pub fn new(connector: Arc<dyn Connector>) -> Self {
        Self {
            connector,
            specs: MetricSpec::defaults(),
            interval: DEFAULT_INTERVAL,
            command_timeout: None,
            max_cycles: None,
        }
    }

    /// Replace the diagnostic battery.
    pub fn with_specs(mut self, specs: Vec<MetricSpec>) -> Self {
        self.specs = specs;
        self
    }

    /// Set the sleep between cycles.
    pub fn with_interval(mut self, interval: Duration) -> Self {
        self.interval = interval;
        self
    }

    /// Bound each diagnostic command.
    pub fn with_command_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.command_timeout = timeout;
        self
    }

    /// Stop after `cycles` snapshots instead of running until cancelled.
    pub fn with_max_cycles(mut self, cycles: Option<u64>) -> Self {
        self.max_cycles = cycles;
        self
    }

    /// Sleep between cycles.
    pub fn interval(&self) -> Duration {
        self.interval
    }

    /// Poll `host` until cancelled, the sink fails, or the connection dies.
    ///
    /// Returns the number of snapshots delivered. On a connection-level
    /// failure the error text is sent to the sink before it is closed. The
    /// sink is closed and the connection released on every exit path.
    pub async fn start_polling<S>(
        &self,
        host: &HostDescriptor,
        sink: &mut S,
        cancel: &CancellationToken,
    ) -> Result<u64, CollectorError>
    where
        S: ChannelSink + ?Sized,
    {
        info!(host = %host.address, interval_secs = self.interval.as_secs(), "Starting metrics collector");

        let connection = match self.connector.open(host).await {
            Ok(connection) => connection,
            Err(e) => {
                warn!(host = %host.address, error = %e, "Metrics connection failed");
                let _ = sink.send(ChannelMessage::Text(e.to_string())).await;
                sink.close().await;
                return Err(e.into());
            }
        };

        let result = self.poll_loop(connection.as_ref(), sink, cancel).await;

        if let Err(e) = connection.close().await {
            debug!(host = %host.address, error = %e, "Failed to close metrics connection");
        }

        match &result {
            Ok(cycles) => info!(host = %host.address, cycles, "Metrics collector stopped"),
            Err(CollectorError::Connection(e)) => {
                warn!(host = %host.address, error = %e, "Metrics collector aborted");
                let _ = sink.send(ChannelMessage::Text(e.to_string())).await;
            }
            Err(CollectorError::ChannelClosed) => {
                debug!(host = %host.address, "Metrics client went away");
            }
        }
        sink.close().await;

        result
    }

    async fn poll_loop<S>(
        &self,
        connection: &dyn Connection,
        sink: &mut S,
        cancel: &CancellationToken,
    ) -> Result<u64, CollectorError>
    where
        S: ChannelSink + ?Sized,
    {
        let mut cycles = 0u64;

        loop {
            let snapshot = tokio::select! {
                _ = cancel.cancelled() => return Ok(cycles),
                snapshot = collect_snapshot(connection, &self.specs, self.command_timeout) => snapshot?,
            };

            debug!(identifier = %connection.identifier(), snapshot = ?snapshot, "Sending metrics");
            sink.send(ChannelMessage::Text(snapshot.to_json()))
                .await
                .map_err(|_| CollectorError::ChannelClosed)?;
            cycles += 1;

            if self.max_cycles.is_some_and(|max| cycles >= max) {
                return Ok(cycles);
            }

            tokio::select! {
                _ = cancel.cancelled() => return Ok(cycles),
                _ = tokio::time::sleep(self.interval) => {}
            }
        }
    }
}

impl std::fmt::Debug for MetricsCollector {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MetricsCollector")
            .field("specs", &self.specs)
            .field("interval", &self.interval)
            .field("command_timeout", &self.command_timeout)
            .field("max_cycles", &self.max_cycles)
            .finish()
    }
}
