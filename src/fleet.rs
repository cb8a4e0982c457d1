//! Fan-out command execution across a fleet of hosts.
//!
//! Every host runs independently in its own task. A semaphore caps how many
//! hosts are in flight at once, and each task reports its [`CommandResult`]
//! over an mpsc channel to a collection barrier that waits for all of them.
//! A failure on one host is captured as that host's result and never affects
//! the others.

use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, Semaphore};
use tracing::{debug, info, warn};

use crate::connection::{ConnectionError, Connector};
use crate::executor;
use crate::host::HostDescriptor;

/// Default number of hosts executing at the same time
pub const DEFAULT_MAX_CONCURRENCY: usize = 16;

/// Outcome of running one command on one host.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CommandOutcome {
    /// Combined output of a successful run
    Output(String),
    /// Why the run failed
    Error(String),
}

/// Result of running one command on one host.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommandResult {
    /// Host address
    pub host: String,
    /// Output or error text
    pub outcome: CommandOutcome,
    /// The host could not be reached at all
    pub unreachable: bool,
}

impl CommandResult {
    /// A successful result.
    pub fn output(host: impl Into<String>, output: impl Into<String>) -> Self {
        Self {
            host: host.into(),
            outcome: CommandOutcome::Output(output.into()),
            unreachable: false,
        }
    }

    /// A failed result.
    pub fn error(host: impl Into<String>, error: impl Into<String>) -> Self {
        Self {
            host: host.into(),
            outcome: CommandOutcome::Error(error.into()),
            unreachable: false,
        }
    }

    /// A failed result classified by the error that caused it.
    pub fn failure(host: impl Into<String>, error: &ConnectionError) -> Self {
        Self {
            unreachable: error.is_connection_level(),
            ..Self::error(host, error.to_string())
        }
    }

    /// Whether the command succeeded.
    pub fn is_ok(&self) -> bool {
        matches!(self.outcome, CommandOutcome::Output(_))
    }

    /// Output text or error text, whichever is set.
    pub fn text(&self) -> &str {
        match &self.outcome {
            CommandOutcome::Output(text) | CommandOutcome::Error(text) => text,
        }
    }
}

/// Per-host results of one fleet dispatch, keyed by address.
///
/// Serializes as a JSON object `{address: {"output": ..} | {"error": ..}}`.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FleetResult {
    results: HashMap<String, CommandResult>,
}

impl FleetResult {
    /// Result for one host.
    pub fn get(&self, host: &str) -> Option<&CommandResult> {
        self.results.get(host)
    }

    /// Number of hosts in the result.
    pub fn len(&self) -> usize {
        self.results.len()
    }

    /// Whether no host was dispatched.
    pub fn is_empty(&self) -> bool {
        self.results.is_empty()
    }

    /// Iterate over results in no particular order.
    pub fn iter(&self) -> impl Iterator<Item = &CommandResult> {
        self.results.values()
    }

    /// Number of hosts whose command failed.
    pub fn failed_count(&self) -> usize {
        self.results.values().filter(|r| !r.is_ok()).count()
    }

    fn insert(&mut self, result: CommandResult) {
        self.results.insert(result.host.clone(), result);
    }
}

impl Serialize for FleetResult {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        use serde::ser::SerializeMap;

        let mut map = serializer.serialize_map(Some(self.results.len()))?;
        for (host, result) in &self.results {
            map.serialize_entry(host, &result.outcome)?;
        }
        map.end()
    }
}

/// Dispatches a command to many hosts with bounded concurrency.
#[derive(Clone)]
pub struct FleetDispatcher {
    connector: Arc<dyn Connector>,
    max_concurrency: usize,
    host_timeout: Option<Duration>,
}

impl FleetDispatcher {
    /// Create a dispatcher with the default concurrency cap and no deadline.
    pub fn new(connector: Arc<dyn Connector>) -> Self {
        Self {
            connector,
            max_concurrency: DEFAULT_MAX_CONCURRENCY,
            host_timeout: None,
        }
    }

    /// Cap the number of hosts executing at once (minimum 1).
    pub fn with_max_concurrency(mut self, max: usize) -> Self {
        self.max_concurrency = max.max(1);
        self
    }

    /// Bound each host's connect + run time.
    pub fn with_host_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.host_timeout = timeout;
        self
    }

    /// Concurrency cap in effect.
    pub fn max_concurrency(&self) -> usize {
        self.max_concurrency
    }

    /// Run `command` on every host and wait for all of them.
    ///
    /// The result holds exactly one entry per distinct host address.
    pub async fn dispatch_all(&self, command: &str, hosts: &[HostDescriptor]) -> FleetResult {
        let mut seen = HashSet::new();
        let hosts: Vec<&HostDescriptor> = hosts
            .iter()
            .filter(|h| seen.insert(h.address.as_str()))
            .collect();

        info!(
            hosts = hosts.len(),
            max_concurrency = self.max_concurrency,
            "Dispatching command to fleet"
        );

        let semaphore = Arc::new(Semaphore::new(self.max_concurrency));
        let (tx, mut rx) = mpsc::channel::<CommandResult>(hosts.len().max(1));
        let command: Arc<str> = Arc::from(command);

        for host in &hosts {
            let host = (*host).clone();
            let tx = tx.clone();
            let semaphore = Arc::clone(&semaphore);
            let connector = Arc::clone(&self.connector);
            let command = Arc::clone(&command);
            let deadline = self.host_timeout;

            tokio::spawn(async move {
                // The semaphore lives as long as this dispatch, it is never closed
                let Ok(_permit) = semaphore.acquire_owned().await else {
                    return;
                };

                let result =
                    match executor::execute_on_host(connector.as_ref(), &host, &command, deadline)
                        .await
                    {
                        Ok(output) => CommandResult::output(&host.address, output),
                        Err(e) => {
                            debug!(host = %host.address, error = %e, "Host command failed");
                            CommandResult::failure(&host.address, &e)
                        }
                    };

                let _ = tx.send(result).await;
            });
        }
        drop(tx);

        let mut fleet = FleetResult::default();
        while let Some(result) = rx.recv().await {
            fleet.insert(result);
        }

        // A task that panicked never reported; keep one entry per host anyway
        for host in &hosts {
            if fleet.get(&host.address).is_none() {
                warn!(host = %host.address, "Execution task ended without a result");
                fleet.insert(CommandResult::error(
                    &host.address,
                    "execution task terminated unexpectedly",
                ));
            }
        }

        info!(
            hosts = fleet.len(),
            failed = fleet.failed_count(),
            "Fleet dispatch complete"
        );
        fleet
    }
}

impl std::fmt::Debug for FleetDispatcher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FleetDispatcher")
            .field("max_concurrency", &self.max_concurrency)
            .field("host_timeout", &self.host_timeout)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_command_result_accessors() {
        let ok = CommandResult::output("a", "up 3 days");
        assert!(ok.is_ok());
        assert_eq!(ok.text(), "up 3 days");

        let err = CommandResult::error("b", "failed to dial b: refused");
        assert!(!err.is_ok());
        assert_eq!(err.text(), "failed to dial b: refused");
    }

    #[test]
    fn test_failure_marks_connection_errors_unreachable() {
        let dial = ConnectionError::ConnectionFailed {
            host: "b:22".into(),
            reason: "refused".into(),
        };
        let result = CommandResult::failure("b", &dial);
        assert!(result.unreachable);
        assert_eq!(result.text(), "failed to dial b:22: refused");

        let exit = ConnectionError::NonZeroExit {
            status: 1,
            output: "x".into(),
        };
        assert!(!CommandResult::failure("c", &exit).unreachable);
    }

    #[test]
    fn test_fleet_result_serializes_as_object() {
        let mut fleet = FleetResult::default();
        fleet.insert(CommandResult::output("10.0.0.1:22", "ok\n"));
        fleet.insert(CommandResult::error("10.0.0.2:22", "refused"));

        let json = serde_json::to_value(&fleet).unwrap();
        assert_eq!(json["10.0.0.1:22"]["output"], "ok\n");
        assert_eq!(json["10.0.0.2:22"]["error"], "refused");
        assert_eq!(fleet.failed_count(), 1);
    }

    #[test]
    fn test_insert_replaces_same_host() {
        let mut fleet = FleetResult::default();
        fleet.insert(CommandResult::error("h", "first"));
        fleet.insert(CommandResult::output("h", "second"));
        assert_eq!(fleet.len(), 1);
        assert!(fleet.get("h").unwrap().is_ok());
    }
}
