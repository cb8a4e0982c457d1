//! Shared test utilities for the Fleetshell test suite.
//!
//! This module provides:
//! - Mock implementations of the Connector, Connection and Session traits
//! - In-memory shell pipes standing in for a remote PTY
//! - Host fixtures and a temporary host store helper
//!
//! # Usage
//!
//! ```rust,ignore
//! mod common;
//! use common::*;
//! ```

#![allow(dead_code)]

use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicBool, AtomicU32, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use parking_lot::{Mutex, RwLock};
use tempfile::TempDir;
use tokio::io::DuplexStream;
use tokio::sync::{mpsc, oneshot};
use tokio_util::sync::CancellationToken;

use fleetshell::connection::{
    Connection, ConnectionError, ConnectionResult, Connector, ExecOutput, PtyRequest, Session,
    ShellExit, ShellProcess,
};
use fleetshell::host::HostDescriptor;
use fleetshell::store::FileHostStore;

// ============================================================================
// Mock Connector
// ============================================================================

/// Counts commands running at the same moment across every mock connection.
#[derive(Debug, Default)]
pub struct ConcurrencyProbe {
    active: AtomicUsize,
    peak: AtomicUsize,
}

impl ConcurrencyProbe {
    fn enter(&self) {
        let now = self.active.fetch_add(1, Ordering::SeqCst) + 1;
        self.peak.fetch_max(now, Ordering::SeqCst);
    }

    fn leave(&self) {
        self.active.fetch_sub(1, Ordering::SeqCst);
    }

    /// Highest number of commands seen running together.
    pub fn peak(&self) -> usize {
        self.peak.load(Ordering::SeqCst)
    }
}

/// A connector handing out [`MockConnection`]s keyed by host address.
///
/// # Example
///
/// ```rust,ignore
/// let connector = MockConnector::new();
/// connector.connection("10.0.0.1").set_output("uptime", "up 3 days");
/// connector.set_unreachable("10.0.0.2");
/// ```
#[derive(Debug, Default)]
pub struct MockConnector {
    connections: RwLock<HashMap<String, MockConnection>>,
    unreachable: RwLock<HashSet<String>>,
    open_delay: RwLock<Option<Duration>>,
    opened: AtomicU32,
    probe: Arc<ConcurrencyProbe>,
}

impl MockConnector {
    pub fn new() -> Self {
        Self::default()
    }

    /// The mock behind `address`, created on first use.
    pub fn connection(&self, address: &str) -> MockConnection {
        self.connections
            .write()
            .entry(address.to_string())
            .or_insert_with(|| MockConnection::with_probe(address, Arc::clone(&self.probe)))
            .clone()
    }

    /// Make dialing `address` fail with "connection refused".
    pub fn set_unreachable(&self, address: &str) {
        self.unreachable.write().insert(address.to_string());
    }

    /// Delay every dial.
    pub fn set_open_delay(&self, delay: Duration) {
        *self.open_delay.write() = Some(delay);
    }

    /// Number of successful dials.
    pub fn open_count(&self) -> u32 {
        self.opened.load(Ordering::SeqCst)
    }

    /// Concurrency seen across all connections.
    pub fn probe(&self) -> &ConcurrencyProbe {
        &self.probe
    }
}

#[async_trait]
impl Connector for MockConnector {
    async fn open(&self, host: &HostDescriptor) -> ConnectionResult<Arc<dyn Connection>> {
        let delay = *self.open_delay.read();
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }

        if self.unreachable.read().contains(&host.address) {
            return Err(ConnectionError::ConnectionFailed {
                host: host.address.clone(),
                reason: "connection refused".to_string(),
            });
        }

        self.opened.fetch_add(1, Ordering::SeqCst);
        Ok(Arc::new(self.connection(&host.address)))
    }
}

// ============================================================================
// Mock Connection
// ============================================================================

/// How a mock command behaves.
#[derive(Debug, Clone)]
pub enum MockReply {
    /// The command ran and exited with this output.
    Exit(ExecOutput),
    /// The command could not be run.
    Fail(String),
}

/// Remote ends of a mock interactive shell.
#[derive(Debug)]
pub struct RemoteShell {
    /// Bytes the client typed
    pub input: DuplexStream,
    /// Write here to produce terminal output; drop to end it
    pub output: DuplexStream,
    /// Report how the process ended
    pub exit: Option<oneshot::Sender<ShellExit>>,
    /// Cancelled when the bridge tears the channel down
    pub cancel: CancellationToken,
    /// Command requested instead of the login shell
    pub command: Option<String>,
}

impl RemoteShell {
    /// Report an exit and end the output stream.
    pub fn finish(mut self, exit: ShellExit) {
        if let Some(tx) = self.exit.take() {
            let _ = tx.send(exit);
        }
    }
}

#[derive(Debug)]
struct ConnectionState {
    identifier: String,
    replies: RwLock<HashMap<String, MockReply>>,
    exec_delay: RwLock<Option<Duration>>,
    command_delays: RwLock<HashMap<String, Duration>>,
    commands: RwLock<Vec<String>>,
    sessions_opened: AtomicU32,
    sessions_closed: AtomicU32,
    closed: AtomicU32,
    fail_sessions: AtomicBool,
    lose_after_sessions: AtomicU32,
    fail_pty: AtomicBool,
    fail_shell: AtomicBool,
    ptys: RwLock<Vec<PtyRequest>>,
    shell_tx: mpsc::UnboundedSender<RemoteShell>,
    shell_rx: Mutex<Option<mpsc::UnboundedReceiver<RemoteShell>>>,
    probe: Arc<ConcurrencyProbe>,
}

/// A scriptable live connection.
///
/// Unknown commands exit with status 127. Clones share state.
#[derive(Debug, Clone)]
pub struct MockConnection {
    state: Arc<ConnectionState>,
}

impl MockConnection {
    pub fn new(identifier: impl Into<String>) -> Self {
        Self::with_probe(identifier, Arc::default())
    }

    fn with_probe(identifier: impl Into<String>, probe: Arc<ConcurrencyProbe>) -> Self {
        let (shell_tx, shell_rx) = mpsc::unbounded_channel();
        Self {
            state: Arc::new(ConnectionState {
                identifier: identifier.into(),
                replies: RwLock::new(HashMap::new()),
                exec_delay: RwLock::new(None),
                command_delays: RwLock::new(HashMap::new()),
                commands: RwLock::new(Vec::new()),
                sessions_opened: AtomicU32::new(0),
                sessions_closed: AtomicU32::new(0),
                closed: AtomicU32::new(0),
                fail_sessions: AtomicBool::new(false),
                lose_after_sessions: AtomicU32::new(u32::MAX),
                fail_pty: AtomicBool::new(false),
                fail_shell: AtomicBool::new(false),
                ptys: RwLock::new(Vec::new()),
                shell_tx,
                shell_rx: Mutex::new(Some(shell_rx)),
                probe,
            }),
        }
    }

    /// Make `command` succeed with `output`.
    pub fn set_output(&self, command: &str, output: &str) {
        self.set_reply(command, MockReply::Exit(ExecOutput::success(output)));
    }

    /// Make `command` exit with `status`.
    pub fn set_exit(&self, command: &str, output: &str, status: u32) {
        self.set_reply(command, MockReply::Exit(ExecOutput::with_status(output, status)));
    }

    pub fn set_reply(&self, command: &str, reply: MockReply) {
        self.state.replies.write().insert(command.to_string(), reply);
    }

    /// Delay every command.
    pub fn set_exec_delay(&self, delay: Duration) {
        *self.state.exec_delay.write() = Some(delay);
    }

    /// Delay only `command`, overriding the delay set for every command.
    pub fn set_command_delay(&self, command: &str, delay: Duration) {
        self.state
            .command_delays
            .write()
            .insert(command.to_string(), delay);
    }

    /// Refuse new sessions with a session-level error.
    pub fn fail_sessions(&self) {
        self.state.fail_sessions.store(true, Ordering::SeqCst);
    }

    /// Report the connection as closed once `n` sessions have been opened.
    pub fn lose_connection_after(&self, n: u32) {
        self.state.lose_after_sessions.store(n, Ordering::SeqCst);
    }

    pub fn fail_pty(&self) {
        self.state.fail_pty.store(true, Ordering::SeqCst);
    }

    pub fn fail_shell(&self) {
        self.state.fail_shell.store(true, Ordering::SeqCst);
    }

    /// Remote ends of every shell started on this connection.
    ///
    /// # Panics
    ///
    /// Panics when called twice.
    pub fn shells(&self) -> mpsc::UnboundedReceiver<RemoteShell> {
        self.state
            .shell_rx
            .lock()
            .take()
            .expect("shell receiver already taken")
    }

    pub fn commands(&self) -> Vec<String> {
        self.state.commands.read().clone()
    }

    pub fn ptys(&self) -> Vec<PtyRequest> {
        self.state.ptys.read().clone()
    }

    pub fn sessions_opened(&self) -> u32 {
        self.state.sessions_opened.load(Ordering::SeqCst)
    }

    pub fn sessions_closed(&self) -> u32 {
        self.state.sessions_closed.load(Ordering::SeqCst)
    }

    /// Number of times `close` was called.
    pub fn close_count(&self) -> u32 {
        self.state.closed.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Connection for MockConnection {
    fn identifier(&self) -> &str {
        &self.state.identifier
    }

    async fn open_session(&self) -> ConnectionResult<Box<dyn Session>> {
        let opened = self.state.sessions_opened.load(Ordering::SeqCst);
        if opened >= self.state.lose_after_sessions.load(Ordering::SeqCst) {
            return Err(ConnectionError::ConnectionClosed);
        }
        if self.state.fail_sessions.load(Ordering::SeqCst) {
            return Err(ConnectionError::SessionFailed(
                "administratively prohibited".to_string(),
            ));
        }

        self.state.sessions_opened.fetch_add(1, Ordering::SeqCst);
        Ok(Box::new(MockSession {
            state: Arc::clone(&self.state),
            closed: false,
        }))
    }

    async fn close(&self) -> ConnectionResult<()> {
        self.state.closed.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}

// ============================================================================
// Mock Session
// ============================================================================

struct MockSession {
    state: Arc<ConnectionState>,
    closed: bool,
}

#[async_trait]
impl Session for MockSession {
    async fn exec(&mut self, command: &str) -> ConnectionResult<ExecOutput> {
        self.state.commands.write().push(command.to_string());

        self.state.probe.enter();
        let delay = self
            .state
            .command_delays
            .read()
            .get(command)
            .copied()
            .or(*self.state.exec_delay.read());
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }
        self.state.probe.leave();

        let reply = self.state.replies.read().get(command).cloned();
        match reply {
            Some(MockReply::Exit(output)) => Ok(output),
            Some(MockReply::Fail(reason)) => Err(ConnectionError::ExecutionFailed(reason)),
            None => Ok(ExecOutput::with_status(
                format!("sh: {}: command not found", command),
                127,
            )),
        }
    }

    async fn request_pty(&mut self, pty: &PtyRequest) -> ConnectionResult<()> {
        if self.state.fail_pty.load(Ordering::SeqCst) {
            return Err(ConnectionError::SessionFailed("pty allocation refused".to_string()));
        }
        self.state.ptys.write().push(pty.clone());
        Ok(())
    }

    async fn start_shell(self: Box<Self>, command: Option<&str>) -> ConnectionResult<ShellProcess> {
        if self.state.fail_shell.load(Ordering::SeqCst) {
            return Err(ConnectionError::ExecutionFailed("shell request refused".to_string()));
        }

        let (stdin, input) = tokio::io::duplex(64 * 1024);
        let (output, stdout) = tokio::io::duplex(64 * 1024);
        let (exit_tx, exit_rx) = oneshot::channel();
        let cancel = CancellationToken::new();

        let _ = self.state.shell_tx.send(RemoteShell {
            input,
            output,
            exit: Some(exit_tx),
            cancel: cancel.clone(),
            command: command.map(str::to_string),
        });

        Ok(ShellProcess {
            stdin: Box::new(stdin),
            stdout: Box::new(stdout),
            exit: exit_rx,
            cancel,
        })
    }

    async fn close(&mut self) -> ConnectionResult<()> {
        if !self.closed {
            self.closed = true;
            self.state.sessions_closed.fetch_add(1, Ordering::SeqCst);
        }
        Ok(())
    }
}

// ============================================================================
// Fixtures
// ============================================================================

/// A host with the standard test credentials.
pub fn host(address: &str) -> HostDescriptor {
    HostDescriptor::new(address, "admin", "secret")
}

/// Hosts `10.0.0.1` .. `10.0.0.n`.
pub fn hosts(n: usize) -> Vec<HostDescriptor> {
    (1..=n).map(|i| host(&format!("10.0.0.{}", i))).collect()
}

/// A file-backed host store in a fresh temporary directory.
pub struct TempStore {
    pub dir: TempDir,
    pub store: FileHostStore,
}

impl TempStore {
    pub fn new() -> Self {
        let dir = TempDir::new().expect("temp dir");
        let store = FileHostStore::open(dir.path().join("hosts.json")).expect("open store");
        Self { dir, store }
    }

    pub fn path(&self) -> std::path::PathBuf {
        self.dir.path().join("hosts.json")
    }
}

impl Default for TempStore {
    fn default() -> Self {
        Self::new()
    }
}
