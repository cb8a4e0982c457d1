//! Single-host command execution.
//!
//! [`run`] executes one command over one fresh session on an existing
//! connection, optionally under a deadline. [`execute_on_host`] owns the whole lifecycle for one host:
//! connect, resolve aliases, run (optionally under a deadline), disconnect.
//! In both, whatever was opened is closed again on every exit path.

use std::time::Duration;
use tracing::{debug, instrument};

use crate::connection::{Connection, ConnectionError, ConnectionResult, Connector};
use crate::host::HostDescriptor;

/// Run `command` on a fresh session of `connection`.
///
/// Returns the combined stdout/stderr text on exit status 0. A non-zero exit
/// becomes [`ConnectionError::NonZeroExit`] carrying the captured text.
/// `deadline` bounds session setup and the command together; a session
/// that was opened is closed even when it fires.
pub async fn run(
    connection: &dyn Connection,
    command: &str,
    deadline: Option<Duration>,
) -> ConnectionResult<String> {
    let started = tokio::time::Instant::now();

    let mut session = match deadline {
        Some(limit) => tokio::time::timeout(limit, connection.open_session())
            .await
            .map_err(|_| ConnectionError::Timeout(limit))??,
        None => connection.open_session().await?,
    };

    let result = match deadline {
        Some(limit) => {
            let remaining = limit.saturating_sub(started.elapsed());
            tokio::time::timeout(remaining, session.exec(command))
                .await
                .unwrap_or(Err(ConnectionError::Timeout(limit)))
        }
        None => session.exec(command).await,
    };

    if let Err(e) = session.close().await {
        debug!(identifier = %connection.identifier(), error = %e, "Failed to close session");
    }

    result?.into_result()
}

/// Connect to `host`, run `command` and disconnect.
///
/// When `deadline` is given it bounds connect and execution together; the
/// connection is still closed when the deadline fires mid-command.
#[instrument(skip(connector, host), fields(host = %host.address))]
pub async fn execute_on_host(
    connector: &dyn Connector,
    host: &HostDescriptor,
    command: &str,
    deadline: Option<Duration>,
) -> ConnectionResult<String> {
    let command = host.resolve_command(command);
    let started = tokio::time::Instant::now();

    let connection = match deadline {
        Some(limit) => tokio::time::timeout(limit, connector.open(host))
            .await
            .map_err(|_| ConnectionError::Timeout(limit))??,
        None => connector.open(host).await?,
    };

    let remaining = deadline.map(|limit| limit.saturating_sub(started.elapsed()));
    let result = run(connection.as_ref(), &command, remaining)
        .await
        .map_err(|e| match (e, deadline) {
            (ConnectionError::Timeout(_), Some(limit)) => ConnectionError::Timeout(limit),
            (e, _) => e,
        });

    if let Err(e) = connection.close().await {
        debug!(identifier = %connection.identifier(), error = %e, "Failed to close connection");
    }

    debug!(
        success = result.is_ok(),
        elapsed_ms = started.elapsed().as_millis() as u64,
        "Command finished"
    );
    result
}
