//! Russh connection module
//!
//! SSH connectivity using the russh crate. Each [`SshConnection`] wraps one
//! authenticated russh client handle; every [`Session`] it hands out is a
//! fresh channel on that handle.
//!
//! Interactive shells are driven by a background task that owns the russh
//! channel and exposes it to callers as a pair of in-memory byte pipes.

use async_trait::async_trait;
use russh::client::{Handle, Handler, Msg};
use russh::keys::key::PublicKey;
use russh::{Channel, ChannelMsg, Pty};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpStream;
use tokio::sync::{oneshot, RwLock};
use tokio_util::sync::CancellationToken;
use tracing::{debug, trace, warn};

use super::{
    Connection, ConnectionError, ConnectionResult, Connector, ExecOutput, PtyRequest, Session,
    ShellExit, ShellProcess,
};
use crate::host::HostDescriptor;

/// Default deadline for TCP connect + handshake + authentication
pub const DEFAULT_CONNECT_TIMEOUT: Duration = Duration::from_secs(10);

/// Capacity of the in-memory pipes between a shell driver and its caller
const PIPE_CAPACITY: usize = 64 * 1024;

/// Largest chunk forwarded from the caller to the remote shell at once
const INPUT_CHUNK: usize = 4 * 1024;

/// Options for opening SSH connections.
#[derive(Debug, Clone)]
pub struct SshOptions {
    /// Deadline for connect, handshake and authentication
    pub connect_timeout: Duration,
    /// Accept any server host key without checking `known_hosts`
    pub accept_any_host_key: bool,
}

impl Default for SshOptions {
    fn default() -> Self {
        Self {
            connect_timeout: DEFAULT_CONNECT_TIMEOUT,
            accept_any_host_key: false,
        }
    }
}

/// Client handler for russh with host key verification
struct ClientHandler {
    /// The hostname we're connecting to (for known_hosts lookup)
    host: String,
    /// The port we're connecting to
    port: u16,
    /// Skip verification entirely
    accept_any: bool,
    /// Set when the server key was refused, so the caller can report why
    rejected: Arc<AtomicBool>,
}

impl ClientHandler {
    fn new(host: &str, port: u16, accept_any: bool, rejected: Arc<AtomicBool>) -> Self {
        Self {
            host: host.to_string(),
            port,
            accept_any,
            rejected,
        }
    }
}

#[async_trait]
impl Handler for ClientHandler {
    type Error = russh::Error;

    async fn check_server_key(
        &mut self,
        server_public_key: &PublicKey,
    ) -> Result<bool, Self::Error> {
        if self.accept_any {
            warn!(
                host = %self.host,
                "Host key verification disabled, accepting server key"
            );
            return Ok(true);
        }

        match russh_keys::check_known_hosts(&self.host, self.port, server_public_key) {
            Ok(true) => {
                debug!(host = %self.host, "Host key verified against known_hosts");
                Ok(true)
            }
            Ok(false) => {
                warn!(host = %self.host, "Host not found in known_hosts, rejecting");
                self.rejected.store(true, Ordering::SeqCst);
                Ok(false)
            }
            Err(e) => {
                warn!(
                    host = %self.host,
                    error = %e,
                    "HOST KEY VERIFICATION FAILED! Server key does not match known_hosts entry."
                );
                self.rejected.store(true, Ordering::SeqCst);
                Ok(false)
            }
        }
    }
}

/// Opens [`SshConnection`]s with password authentication.
#[derive(Debug, Clone, Default)]
pub struct SshConnector {
    options: SshOptions,
}

impl SshConnector {
    /// Create a connector with the given options.
    pub fn new(options: SshOptions) -> Self {
        Self { options }
    }

    /// The options used for every connection.
    pub fn options(&self) -> &SshOptions {
        &self.options
    }
}

#[async_trait]
impl Connector for SshConnector {
    async fn open(&self, host: &HostDescriptor) -> ConnectionResult<Arc<dyn Connection>> {
        let conn = SshConnection::connect(host, &self.options).await?;
        Ok(Arc::new(conn))
    }
}

/// One authenticated SSH connection.
///
/// The handle sits behind an `RwLock`: opening channels only needs a read
/// lock, `close()` takes the handle out under the write lock.
pub struct SshConnection {
    /// `user@host:port`
    identifier: String,
    /// Russh client handle, `None` once closed
    handle: RwLock<Option<Handle<ClientHandler>>>,
}

impl SshConnection {
    /// Connect and authenticate to `host`.
    pub async fn connect(host: &HostDescriptor, options: &SshOptions) -> ConnectionResult<Self> {
        let (hostname, port) = host.target();
        let identifier = format!("{}@{}:{}", host.user, hostname, port);

        debug!(
            host = %hostname,
            port = %port,
            user = %host.user,
            "Connecting via SSH (russh)"
        );

        let timeout = options.connect_timeout;
        let handle = tokio::time::timeout(
            timeout,
            Self::do_connect(host, &hostname, port, options.accept_any_host_key),
        )
        .await
        .map_err(|_| ConnectionError::Timeout(timeout))??;

        debug!(identifier = %identifier, "SSH connection established");

        Ok(Self {
            identifier,
            handle: RwLock::new(Some(handle)),
        })
    }

    /// Perform the actual connection
    async fn do_connect(
        host: &HostDescriptor,
        hostname: &str,
        port: u16,
        accept_any_host_key: bool,
    ) -> ConnectionResult<Handle<ClientHandler>> {
        let config = Arc::new(russh::client::Config::default());

        let socket = TcpStream::connect((hostname, port)).await.map_err(|e| {
            ConnectionError::ConnectionFailed {
                host: host.address.clone(),
                reason: e.to_string(),
            }
        })?;

        // Enable TCP_NODELAY for interactive latency
        socket.set_nodelay(true).map_err(|e| ConnectionError::ConnectionFailed {
            host: host.address.clone(),
            reason: format!("failed to set TCP_NODELAY: {}", e),
        })?;

        let rejected = Arc::new(AtomicBool::new(false));
        let handler = ClientHandler::new(hostname, port, accept_any_host_key, rejected.clone());

        let mut session = russh::client::connect_stream(config, socket, handler)
            .await
            .map_err(|e| {
                if rejected.load(Ordering::SeqCst) {
                    ConnectionError::HostKeyRejected(host.address.clone())
                } else {
                    ConnectionError::ConnectionFailed {
                        host: host.address.clone(),
                        reason: format!("SSH handshake failed: {}", e),
                    }
                }
            })?;

        let authenticated = session
            .authenticate_password(&host.user, &host.credential)
            .await
            .map_err(|e| ConnectionError::ConnectionFailed {
                host: host.address.clone(),
                reason: format!("password authentication exchange failed: {}", e),
            })?;

        if !authenticated {
            return Err(ConnectionError::AuthenticationFailed {
                user: host.user.clone(),
                host: host.address.clone(),
            });
        }

        Ok(session)
    }
}

#[async_trait]
impl Connection for SshConnection {
    fn identifier(&self) -> &str {
        &self.identifier
    }

    async fn open_session(&self) -> ConnectionResult<Box<dyn Session>> {
        let guard = self.handle.read().await;
        let handle = guard.as_ref().ok_or(ConnectionError::ConnectionClosed)?;

        let channel = match handle.channel_open_session().await {
            Ok(channel) => channel,
            // The server is alive but refused this particular channel
            Err(russh::Error::ChannelOpenFailure(reason)) => {
                return Err(ConnectionError::SessionFailed(format!("{:?}", reason)));
            }
            Err(e) => {
                debug!(identifier = %self.identifier, error = %e, "Channel open failed");
                return Err(ConnectionError::ConnectionClosed);
            }
        };
        drop(guard);

        trace!(identifier = %self.identifier, "Session opened");
        Ok(Box::new(SshSession {
            channel,
            identifier: self.identifier.clone(),
        }))
    }

    async fn close(&self) -> ConnectionResult<()> {
        debug!(identifier = %self.identifier, "Closing SSH connection");

        let handle = self.handle.write().await.take();
        if let Some(handle) = handle {
            let _ = handle
                .disconnect(
                    russh::Disconnect::ByApplication,
                    "Connection closed by client",
                    "en",
                )
                .await;
        }

        Ok(())
    }
}

impl std::fmt::Debug for SshConnection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SshConnection")
            .field("identifier", &self.identifier)
            .finish()
    }
}

/// A single russh channel.
struct SshSession {
    channel: Channel<Msg>,
    identifier: String,
}

impl SshSession {
    /// Wait for the server's reply to a `want_reply` request.
    ///
    /// Any output that races ahead of the reply is returned so it is not lost.
    async fn await_reply(&mut self) -> Result<Vec<u8>, String> {
        let mut early = Vec::new();
        loop {
            match self.channel.wait().await {
                Some(ChannelMsg::Success) => return Ok(early),
                Some(ChannelMsg::Failure) => return Err("request rejected by server".to_string()),
                Some(ChannelMsg::Data { ref data })
                | Some(ChannelMsg::ExtendedData { ref data, .. }) => {
                    early.extend_from_slice(data);
                }
                Some(ChannelMsg::Close) | None => return Err("channel closed".to_string()),
                Some(_) => {}
            }
        }
    }
}

#[async_trait]
impl Session for SshSession {
    async fn exec(&mut self, command: &str) -> ConnectionResult<ExecOutput> {
        trace!(identifier = %self.identifier, command = %command, "Executing remote command");

        self.channel
            .exec(true, command)
            .await
            .map_err(|e| ConnectionError::ExecutionFailed(format!("failed to execute command: {}", e)))?;

        // Stdout and stderr share one buffer so output keeps its arrival order
        let mut combined = Vec::new();
        let mut exit_status = None;

        while let Some(msg) = self.channel.wait().await {
            match msg {
                ChannelMsg::Data { ref data } => combined.extend_from_slice(data),
                ChannelMsg::ExtendedData { ref data, .. } => combined.extend_from_slice(data),
                ChannelMsg::ExitStatus { exit_status: status } => exit_status = Some(status),
                ChannelMsg::ExitSignal { signal_name, .. } => {
                    debug!(identifier = %self.identifier, signal = ?signal_name, "Remote command killed by signal");
                }
                ChannelMsg::Failure => {
                    return Err(ConnectionError::ExecutionFailed(
                        "exec request rejected by server".to_string(),
                    ));
                }
                ChannelMsg::Close => break,
                _ => {}
            }
        }

        trace!(identifier = %self.identifier, exit_status = ?exit_status, "Command completed");

        Ok(ExecOutput {
            output: String::from_utf8_lossy(&combined).into_owned(),
            exit_status,
        })
    }

    async fn request_pty(&mut self, pty: &PtyRequest) -> ConnectionResult<()> {
        let modes = [
            (Pty::ECHO, u32::from(pty.echo)),
            (Pty::TTY_OP_ISPEED, pty.speed),
            (Pty::TTY_OP_OSPEED, pty.speed),
        ];

        self.channel
            .request_pty(true, &pty.term, pty.cols, pty.rows, 0, 0, &modes)
            .await
            .map_err(|e| ConnectionError::SessionFailed(e.to_string()))?;

        self.await_reply()
            .await
            .map(|_| ())
            .map_err(ConnectionError::SessionFailed)
    }

    async fn start_shell(
        mut self: Box<Self>,
        command: Option<&str>,
    ) -> ConnectionResult<ShellProcess> {
        let started = match command {
            Some(command) => self.channel.exec(true, command).await,
            None => self.channel.request_shell(true).await,
        };
        started.map_err(|e| ConnectionError::ExecutionFailed(e.to_string()))?;

        let early = self
            .await_reply()
            .await
            .map_err(ConnectionError::ExecutionFailed)?;

        debug!(identifier = %self.identifier, "Interactive shell started");
        let SshSession {
            channel,
            identifier,
        } = *self;
        Ok(spawn_shell_driver(channel, early, identifier))
    }

    async fn close(&mut self) -> ConnectionResult<()> {
        // Closing an already closed channel is not an error worth reporting
        let _ = self.channel.close().await;
        Ok(())
    }
}

/// Move `channel` into a background task that pumps it to/from byte pipes.
fn spawn_shell_driver(mut channel: Channel<Msg>, early: Vec<u8>, identifier: String) -> ShellProcess {
    let (stdin_local, mut stdin_remote) = tokio::io::duplex(PIPE_CAPACITY);
    let (mut stdout_remote, stdout_local) = tokio::io::duplex(PIPE_CAPACITY);
    let (exit_tx, exit_rx) = oneshot::channel();
    let cancel = CancellationToken::new();
    let token = cancel.clone();

    tokio::spawn(async move {
        let mut buf = vec![0u8; INPUT_CHUNK];
        let mut input_open = true;
        let mut exit = ShellExit::Closed;

        if !early.is_empty() && stdout_remote.write_all(&early).await.is_err() {
            token.cancel();
        }

        loop {
            tokio::select! {
                _ = token.cancelled() => {
                    debug!(identifier = %identifier, "Shell cancelled");
                    break;
                }
                read = stdin_remote.read(&mut buf), if input_open => match read {
                    Ok(0) | Err(_) => {
                        input_open = false;
                        let _ = channel.eof().await;
                    }
                    Ok(n) => {
                        if let Err(e) = channel.data(&buf[..n]).await {
                            warn!(identifier = %identifier, error = %e, "Failed to write to remote shell");
                            break;
                        }
                    }
                },
                msg = channel.wait() => match msg {
                    Some(ChannelMsg::Data { ref data })
                    | Some(ChannelMsg::ExtendedData { ref data, .. }) => {
                        if stdout_remote.write_all(data).await.is_err() {
                            debug!(identifier = %identifier, "Shell output reader gone");
                            break;
                        }
                    }
                    Some(ChannelMsg::ExitStatus { exit_status }) => {
                        exit = ShellExit::Status(exit_status);
                    }
                    Some(ChannelMsg::ExitSignal { signal_name, .. }) => {
                        exit = ShellExit::Signal(format!("{:?}", signal_name));
                    }
                    Some(ChannelMsg::Close) | None => break,
                    Some(_) => {}
                },
            }
        }

        let _ = channel.close().await;
        drop(stdout_remote);
        debug!(identifier = %identifier, exit = ?exit, "Shell channel closed");
        let _ = exit_tx.send(exit);
    });

    ShellProcess {
        stdin: Box::new(stdin_local),
        stdout: Box::new(stdout_local),
        exit: exit_rx,
        cancel,
    }
}
