//! Connection layer for remote host communication.
//!
//! This module defines the seams between the fleet, metrics and terminal
//! subsystems and the SSH transport underneath them.
//!
//! # Overview
//!
//! - [`Connector`] opens one live connection for a [`HostDescriptor`].
//! - [`Connection`] is that live transport; it hands out [`Session`]s.
//! - [`Session`] is a single channel on the connection: it either runs one
//!   command to completion or is upgraded to an interactive shell with a PTY.
//!
//! Connections are never pooled. Whoever opens a connection closes it.
//!
//! # Example
//!
//! ```rust,ignore
//! use fleetshell::connection::{Connector, SshConnector, SshOptions};
//! use fleetshell::host::HostDescriptor;
//!
//! let connector = SshConnector::new(SshOptions::default());
//! let host = HostDescriptor::new("10.0.0.5:22", "admin", "secret");
//!
//! let conn = connector.open(&host).await?;
//! let mut session = conn.open_session().await?;
//! let output = session.exec("uname -a").await?;
//! session.close().await?;
//! conn.close().await?;
//! ```

/// Pure Rust SSH implementation using russh.
#[cfg(feature = "russh")]
pub mod russh;

use async_trait::async_trait;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tokio::io::{AsyncRead, AsyncWrite};
use tokio::sync::oneshot;
use tokio_util::sync::CancellationToken;

use crate::host::HostDescriptor;

#[cfg(feature = "russh")]
pub use self::russh::{SshConnection, SshConnector, SshOptions};

#[cfg(feature = "russh")]
impl From<::russh::Error> for ConnectionError {
    fn from(err: ::russh::Error) -> Self {
        ConnectionError::SshError(err.to_string())
    }
}

/// Errors that can occur while talking to a remote host.
#[derive(Error, Debug)]
pub enum ConnectionError {
    /// Failed to reach the host or complete the SSH handshake.
    #[error("failed to dial {host}: {reason}")]
    ConnectionFailed {
        /// Address that was dialed
        host: String,
        /// Underlying failure
        reason: String,
    },

    /// The server rejected the credentials.
    #[error("authentication failed for {user}@{host}")]
    AuthenticationFailed {
        /// Login user
        user: String,
        /// Address that was dialed
        host: String,
    },

    /// The server's host key was not accepted.
    #[error("host key rejected for {0}")]
    HostKeyRejected(String),

    /// An operation exceeded its deadline.
    #[error("operation timed out after {}ms", .0.as_millis())]
    Timeout(Duration),

    /// The connection was closed underneath the operation.
    #[error("connection closed")]
    ConnectionClosed,

    /// Error reported by the SSH implementation itself.
    #[error("SSH error: {0}")]
    SshError(String),

    /// A session (channel) or pseudo-terminal could not be allocated.
    #[error("failed to create session: {0}")]
    SessionFailed(String),

    /// The command could not be started or its output could not be read.
    #[error("failed to run: {0}")]
    ExecutionFailed(String),

    /// The command ran but exited with a non-zero status.
    #[error("command exited with status {status}: {output}")]
    NonZeroExit {
        /// Remote exit status
        status: u32,
        /// Combined stdout/stderr captured before exit
        output: String,
    },

    /// I/O error on a stream.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Configuration is invalid or incomplete.
    #[error("invalid configuration: {0}")]
    InvalidConfig(String),
}

impl ConnectionError {
    /// Whether this error means the underlying transport is unusable.
    ///
    /// Connection-level errors end whatever long-running operation owns the
    /// connection; everything else only fails the command or session that
    /// hit it.
    pub fn is_connection_level(&self) -> bool {
        matches!(
            self,
            ConnectionError::ConnectionFailed { .. }
                | ConnectionError::AuthenticationFailed { .. }
                | ConnectionError::HostKeyRejected(_)
                | ConnectionError::ConnectionClosed
                | ConnectionError::InvalidConfig(_)
        )
    }
}

/// Result type for connection operations.
pub type ConnectionResult<T> = Result<T, ConnectionError>;

/// Raw result of running one command on a session.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExecOutput {
    /// Stdout and stderr interleaved in arrival order.
    pub output: String,
    /// Exit status reported by the server, if any.
    pub exit_status: Option<u32>,
}

impl ExecOutput {
    /// Output of a command that exited with status 0.
    pub fn success(output: impl Into<String>) -> Self {
        Self {
            output: output.into(),
            exit_status: Some(0),
        }
    }

    /// Output of a command that exited with the given status.
    pub fn with_status(output: impl Into<String>, status: u32) -> Self {
        Self {
            output: output.into(),
            exit_status: Some(status),
        }
    }

    /// Fold the exit status into a result carrying the captured text.
    pub fn into_result(self) -> ConnectionResult<String> {
        match self.exit_status {
            Some(0) => Ok(self.output),
            Some(status) => Err(ConnectionError::NonZeroExit {
                status,
                output: self.output,
            }),
            None => Err(ConnectionError::ExecutionFailed(
                "remote command exited without reporting a status".to_string(),
            )),
        }
    }
}

/// Pseudo-terminal parameters for an interactive session.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PtyRequest {
    /// TERM value
    pub term: String,
    /// Width in characters
    pub cols: u32,
    /// Height in rows
    pub rows: u32,
    /// Whether the remote side echoes input
    pub echo: bool,
    /// Input/output line speed in baud
    pub speed: u32,
}

impl Default for PtyRequest {
    fn default() -> Self {
        Self {
            term: "xterm".to_string(),
            cols: 80,
            rows: 40,
            echo: true,
            speed: 14400,
        }
    }
}

/// How a remote shell process ended.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ShellExit {
    /// The process exited with a status code.
    Status(u32),
    /// The process was killed by a signal.
    Signal(String),
    /// The channel closed without reporting how the process ended.
    Closed,
}

/// A running interactive shell on the remote host.
///
/// Writing to `stdin` feeds the remote process; reading `stdout` yields its
/// terminal output until the process ends, at which point `stdout` reaches
/// EOF and `exit` resolves. Cancelling `cancel` tears the remote channel down.
pub struct ShellProcess {
    /// Remote process input
    pub stdin: Box<dyn AsyncWrite + Send + Unpin>,
    /// Remote process terminal output
    pub stdout: Box<dyn AsyncRead + Send + Unpin>,
    /// Resolves once the remote channel is gone
    pub exit: oneshot::Receiver<ShellExit>,
    /// Closes the remote channel when cancelled
    pub cancel: CancellationToken,
}

impl std::fmt::Debug for ShellProcess {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ShellProcess")
            .field("cancelled", &self.cancel.is_cancelled())
            .finish_non_exhaustive()
    }
}

/// Opens connections to hosts.
#[async_trait]
pub trait Connector: Send + Sync {
    /// Open a new live connection to `host`.
    async fn open(&self, host: &HostDescriptor) -> ConnectionResult<Arc<dyn Connection>>;
}

/// A live connection to one host.
#[async_trait]
pub trait Connection: Send + Sync {
    /// Connection identifier (`user@host:port`)
    fn identifier(&self) -> &str;

    /// Open a new session (channel) on this connection.
    async fn open_session(&self) -> ConnectionResult<Box<dyn Session>>;

    /// Close the connection.
    async fn close(&self) -> ConnectionResult<()>;
}

/// A single session on a connection.
#[async_trait]
pub trait Session: Send {
    /// Run `command` to completion and capture its combined output.
    async fn exec(&mut self, command: &str) -> ConnectionResult<ExecOutput>;

    /// Allocate a pseudo-terminal for this session.
    async fn request_pty(&mut self, pty: &PtyRequest) -> ConnectionResult<()>;

    /// Start an interactive shell, or `command` when given.
    ///
    /// Consumes the session; the returned process owns the channel.
    async fn start_shell(self: Box<Self>, command: Option<&str>) -> ConnectionResult<ShellProcess>;

    /// Close the session.
    async fn close(&mut self) -> ConnectionResult<()>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_exec_output_success() {
        let result = ExecOutput::success("hello\n").into_result();
        assert_eq!(result.unwrap(), "hello\n");
    }

    #[test]
    fn test_exec_output_non_zero_keeps_text() {
        let err = ExecOutput::with_status("No such file", 2)
            .into_result()
            .unwrap_err();
        match err {
            ConnectionError::NonZeroExit { status, output } => {
                assert_eq!(status, 2);
                assert_eq!(output, "No such file");
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn test_exec_output_missing_status() {
        let output = ExecOutput {
            output: String::new(),
            exit_status: None,
        };
        assert!(matches!(
            output.into_result(),
            Err(ConnectionError::ExecutionFailed(_))
        ));
    }

    #[test]
    fn test_connection_level_classification() {
        assert!(ConnectionError::ConnectionClosed.is_connection_level());
        assert!(ConnectionError::ConnectionFailed {
            host: "a".into(),
            reason: "refused".into()
        }
        .is_connection_level());
        assert!(!ConnectionError::SessionFailed("x".into()).is_connection_level());
        assert!(!ConnectionError::Timeout(Duration::from_secs(5)).is_connection_level());
    }

    #[test]
    fn test_dial_error_message_contains_reason() {
        let err = ConnectionError::ConnectionFailed {
            host: "10.0.0.2:22".into(),
            reason: "connection refused".into(),
        };
        assert_eq!(
            err.to_string(),
            "failed to dial 10.0.0.2:22: connection refused"
        );
    }

    #[test]
    fn test_timeout_message_keeps_sub_second_limit() {
        let err = ConnectionError::Timeout(Duration::from_millis(20));
        assert_eq!(err.to_string(), "operation timed out after 20ms");

        let err = ConnectionError::Timeout(Duration::from_secs(60));
        assert_eq!(err.to_string(), "operation timed out after 60000ms");
    }

    #[test]
    fn test_default_pty_request() {
        let pty = PtyRequest::default();
        assert_eq!(pty.term, "xterm");
        assert_eq!((pty.cols, pty.rows), (80, 40));
    }
}
