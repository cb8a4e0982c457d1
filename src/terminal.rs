//! Interactive terminal bridging.
//!
//! A [`TerminalBridge`] opens a PTY-backed shell on one host and pumps bytes
//! between it and a duplex client channel until either side goes away.
//!
//! ```text
//! Dialing -> SessionOpen -> PtyRequested -> Running -> Closing -> Closed
//! ```
//!
//! Any failure before `Running` is reported to the client as one text
//! message, after which the channel and the connection are closed. Once
//! running, a downstream task copies remote output to the channel and an
//! upstream task copies channel input to the remote process. Both share one
//! [`CancellationToken`]; whichever side ends first cancels it and the other
//! stops without sending anything further.

use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tokio::sync::oneshot;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::channel::{ChannelMessage, ChannelSink, ChannelSource};
use crate::connection::{Connection, ConnectionError, Connector, PtyRequest, ShellExit};
use crate::host::HostDescriptor;

/// Default size of one downstream read
pub const DEFAULT_READ_BUFFER: usize = 1024;

/// How long to wait for the exit report once remote output has ended
const EXIT_REPORT_WAIT: Duration = Duration::from_secs(2);

/// Lifecycle of one bridge.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BridgeState {
    /// Opening the connection
    Dialing,
    /// Session channel allocated
    SessionOpen,
    /// Pseudo-terminal allocated
    PtyRequested,
    /// Shell running, pumps active
    Running,
    /// Tearing down
    Closing,
    /// Everything released
    Closed,
}

/// Failures that keep a bridge from reaching `Running`.
///
/// The display text is what the client receives before the channel closes.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum BridgeError {
    /// The host could not be reached or authenticated.
    #[error("failed to dial: {0}")]
    Dial(String),

    /// No session could be opened on the connection.
    #[error("failed to create session: {0}")]
    Session(String),

    /// The server refused the pseudo-terminal.
    #[error("request for pseudo terminal failed: {0}")]
    Pty(String),

    /// The login shell or command could not be started.
    #[error("failed to start shell: {0}")]
    Shell(String),
}

impl BridgeError {
    /// The state the bridge was in when it failed.
    pub fn state(&self) -> BridgeState {
        match self {
            BridgeError::Dial(_) => BridgeState::Dialing,
            BridgeError::Session(_) => BridgeState::Dialing,
            BridgeError::Pty(_) => BridgeState::SessionOpen,
            BridgeError::Shell(_) => BridgeState::PtyRequested,
        }
    }
}

/// The part of a connection error worth showing after a stage prefix.
fn detail(err: &ConnectionError) -> String {
    match err {
        ConnectionError::ConnectionFailed { host, reason } => format!("{}: {}", host, reason),
        ConnectionError::SessionFailed(reason) | ConnectionError::ExecutionFailed(reason) => {
            reason.clone()
        }
        other => other.to_string(),
    }
}

/// Text status sent to the client when the remote process ends.
pub fn exit_message(exit: &ShellExit) -> String {
    match exit {
        ShellExit::Status(code) => format!("session ended with exit status {}", code),
        ShellExit::Signal(signal) => format!("session ended by signal {}", signal),
        ShellExit::Closed => "session closed".to_string(),
    }
}

/// Terminal session parameters.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TerminalOptions {
    /// Pseudo-terminal to allocate
    pub pty: PtyRequest,
    /// Command to run instead of the login shell
    pub shell: Option<String>,
    /// Maximum bytes per downstream message
    pub read_buffer: usize,
}

impl Default for TerminalOptions {
    fn default() -> Self {
        Self {
            pty: PtyRequest::default(),
            shell: None,
            read_buffer: DEFAULT_READ_BUFFER,
        }
    }
}

/// What happened during a bridge that reached `Running`.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BridgeSummary {
    /// Bytes forwarded from the remote process to the client
    pub bytes_to_client: u64,
    /// Bytes forwarded from the client to the remote process
    pub bytes_to_remote: u64,
    /// How the remote process ended, if it ended on its own
    pub exit: Option<ShellExit>,
}

/// Bridges a remote shell to a duplex channel.
#[derive(Clone)]
pub struct TerminalBridge {
    connector: Arc<dyn Connector>,
    options: TerminalOptions,
}

impl TerminalBridge {
    /// Bridge with the default terminal options.
    pub fn new(connector: Arc<dyn Connector>) -> Self {
        Self {
            connector,
            options: TerminalOptions::default(),
        }
    }

    /// Replace the PTY and buffering options.
    pub fn with_options(mut self, options: TerminalOptions) -> Self {
        self.options = options;
        self
    }

    /// Current terminal options.
    pub fn options(&self) -> &TerminalOptions {
        &self.options
    }

    /// Run a terminal session for `host` over `sink`/`source`.
    ///
    /// Returns once the bridge is `Closed`. The channel and the connection
    /// are closed on every path.
    pub async fn run<S, R>(
        &self,
        host: &HostDescriptor,
        mut sink: S,
        source: R,
    ) -> Result<BridgeSummary, BridgeError>
    where
        S: ChannelSink + 'static,
        R: ChannelSource + 'static,
    {
        debug!(host = %host.address, state = ?BridgeState::Dialing, "Terminal bridge");

        let connection = match self.connector.open(host).await {
            Ok(connection) => connection,
            Err(e) => {
                let err = BridgeError::Dial(detail(&e));
                Self::report(&mut sink, &err).await;
                return Err(err);
            }
        };

        let result = self.bridge(connection.as_ref(), sink, source).await;

        debug!(host = %host.address, state = ?BridgeState::Closing, "Terminal bridge");
        if let Err(e) = connection.close().await {
            debug!(host = %host.address, error = %e, "Failed to close terminal connection");
        }
        debug!(host = %host.address, state = ?BridgeState::Closed, "Terminal bridge");

        match &result {
            Ok(summary) => info!(
                host = %host.address,
                bytes_to_client = summary.bytes_to_client,
                bytes_to_remote = summary.bytes_to_remote,
                exit = ?summary.exit,
                "Terminal session ended"
            ),
            Err(e) => warn!(host = %host.address, state = ?e.state(), error = %e, "Terminal session failed"),
        }
        result
    }

    async fn bridge<S, R>(
        &self,
        connection: &dyn Connection,
        mut sink: S,
        source: R,
    ) -> Result<BridgeSummary, BridgeError>
    where
        S: ChannelSink + 'static,
        R: ChannelSource + 'static,
    {
        let identifier = connection.identifier().to_string();

        let mut session = match connection.open_session().await {
            Ok(session) => session,
            Err(e) => {
                let err = BridgeError::Session(detail(&e));
                Self::report(&mut sink, &err).await;
                return Err(err);
            }
        };
        debug!(identifier = %identifier, state = ?BridgeState::SessionOpen, "Terminal bridge");

        if let Err(e) = session.request_pty(&self.options.pty).await {
            let _ = session.close().await;
            let err = BridgeError::Pty(detail(&e));
            Self::report(&mut sink, &err).await;
            return Err(err);
        }
        debug!(identifier = %identifier, state = ?BridgeState::PtyRequested, "Terminal bridge");

        let process = match session.start_shell(self.options.shell.as_deref()).await {
            Ok(process) => process,
            Err(e) => {
                let err = BridgeError::Shell(detail(&e));
                Self::report(&mut sink, &err).await;
                return Err(err);
            }
        };
        debug!(identifier = %identifier, state = ?BridgeState::Running, "Terminal bridge");

        let token = CancellationToken::new();

        let downstream = tokio::spawn(pump_downstream(
            process.stdout,
            process.exit,
            sink,
            token.clone(),
            self.options.read_buffer.max(1),
        ));
        let upstream = tokio::spawn(pump_upstream(source, process.stdin, token.clone()));

        let (downstream, upstream) = tokio::join!(downstream, upstream);
        token.cancel();
        process.cancel.cancel();

        let mut summary = BridgeSummary::default();
        match downstream {
            Ok((bytes, exit)) => {
                summary.bytes_to_client = bytes;
                summary.exit = exit;
            }
            Err(e) => warn!(identifier = %identifier, error = %e, "Downstream pump panicked"),
        }
        match upstream {
            Ok(bytes) => summary.bytes_to_remote = bytes,
            Err(e) => warn!(identifier = %identifier, error = %e, "Upstream pump panicked"),
        }

        Ok(summary)
    }

    async fn report<S: ChannelSink + ?Sized>(sink: &mut S, err: &BridgeError) {
        let _ = sink.send(ChannelMessage::Text(err.to_string())).await;
        sink.close().await;
    }
}

impl std::fmt::Debug for TerminalBridge {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TerminalBridge")
            .field("options", &self.options)
            .finish()
    }
}

/// Remote output to client, one binary message per read.
async fn pump_downstream<S: ChannelSink>(
    mut stdout: Box<dyn AsyncRead + Send + Unpin>,
    exit: oneshot::Receiver<ShellExit>,
    mut sink: S,
    token: CancellationToken,
    read_buffer: usize,
) -> (u64, Option<ShellExit>) {
    let mut buf = vec![0u8; read_buffer];
    let mut sent = 0u64;
    let mut ended = None;

    loop {
        let read = tokio::select! {
            biased;
            _ = token.cancelled() => break,
            read = stdout.read(&mut buf) => read,
        };

        match read {
            Ok(0) => {
                let status = tokio::time::timeout(EXIT_REPORT_WAIT, exit)
                    .await
                    .ok()
                    .and_then(Result::ok)
                    .unwrap_or(ShellExit::Closed);
                if !token.is_cancelled() {
                    let _ = sink.send(ChannelMessage::Text(exit_message(&status))).await;
                }
                ended = Some(status);
                break;
            }
            Ok(n) => {
                let message = ChannelMessage::Binary(buf[..n].to_vec());
                let delivered = tokio::select! {
                    biased;
                    _ = token.cancelled() => false,
                    result = sink.send(message) => result.is_ok(),
                };
                if !delivered {
                    break;
                }
                sent += n as u64;
            }
            Err(e) => {
                debug!(error = %e, "Remote output read failed");
                break;
            }
        }
    }

    sink.close().await;
    token.cancel();
    (sent, ended)
}

/// Client input to remote stdin, bytes verbatim.
async fn pump_upstream<R: ChannelSource>(
    mut source: R,
    mut stdin: Box<dyn AsyncWrite + Send + Unpin>,
    token: CancellationToken,
) -> u64 {
    let mut written = 0u64;

    loop {
        let message = tokio::select! {
            biased;
            _ = token.cancelled() => break,
            message = source.recv() => message,
        };

        let message = match message {
            Some(Ok(message)) => message,
            Some(Err(e)) => {
                debug!(error = %e, "Client channel failed");
                break;
            }
            None => {
                debug!("Client channel closed");
                break;
            }
        };

        let bytes = message.as_bytes();
        let result = tokio::select! {
            biased;
            _ = token.cancelled() => break,
            result = write_chunk(&mut stdin, bytes) => result,
        };
        if let Err(e) = result {
            debug!(error = %e, "Remote input write failed");
            break;
        }
        written += bytes.len() as u64;
    }

    token.cancel();
    let _ = stdin.shutdown().await;
    written
}

async fn write_chunk<W: AsyncWrite + Unpin + ?Sized>(writer: &mut W, bytes: &[u8]) -> std::io::Result<()> {
    writer.write_all(bytes).await?;
    writer.flush().await
}
