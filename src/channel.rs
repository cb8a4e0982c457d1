//! Duplex message channels.
//!
//! The metrics collector and the terminal bridge talk to their client through
//! a persistent bidirectional message channel. In the server that channel is a
//! WebSocket (see `api::websocket`); the CLI and the tests use the in-memory
//! mpsc implementation in this module.
//!
//! A channel is split into a [`ChannelSink`] (messages to the client) and a
//! [`ChannelSource`] (messages from the client) so both directions can be
//! driven from different tasks.

use async_trait::async_trait;
use thiserror::Error;
use tokio::sync::mpsc;

/// One message on a duplex channel.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ChannelMessage {
    /// UTF-8 text (JSON snapshots, status and error reports)
    Text(String),
    /// Raw bytes (terminal traffic)
    Binary(Vec<u8>),
}

impl ChannelMessage {
    /// The message payload as bytes.
    pub fn as_bytes(&self) -> &[u8] {
        match self {
            ChannelMessage::Text(text) => text.as_bytes(),
            ChannelMessage::Binary(data) => data,
        }
    }

    /// Returns the text payload, if this is a text message.
    pub fn as_text(&self) -> Option<&str> {
        match self {
            ChannelMessage::Text(text) => Some(text),
            ChannelMessage::Binary(_) => None,
        }
    }
}

/// Errors on a duplex channel.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ChannelError {
    /// The channel has been closed by either side.
    #[error("channel closed")]
    Closed,

    /// Transport-level failure.
    #[error("channel transport error: {0}")]
    Transport(String),
}

/// Outbound half of a duplex channel.
#[async_trait]
pub trait ChannelSink: Send {
    /// Send one message.
    async fn send(&mut self, message: ChannelMessage) -> Result<(), ChannelError>;

    /// Close the channel. Closing twice is a no-op.
    async fn close(&mut self);
}

/// Inbound half of a duplex channel.
#[async_trait]
pub trait ChannelSource: Send {
    /// Receive the next message; `None` once the peer has closed.
    async fn recv(&mut self) -> Option<Result<ChannelMessage, ChannelError>>;
}

#[async_trait]
impl<T: ChannelSink + ?Sized> ChannelSink for Box<T> {
    async fn send(&mut self, message: ChannelMessage) -> Result<(), ChannelError> {
        (**self).send(message).await
    }

    async fn close(&mut self) {
        (**self).close().await
    }
}

#[async_trait]
impl<T: ChannelSource + ?Sized> ChannelSource for Box<T> {
    async fn recv(&mut self) -> Option<Result<ChannelMessage, ChannelError>> {
        (**self).recv().await
    }
}

/// Sink backed by a tokio mpsc sender.
#[derive(Debug)]
pub struct MpscSink {
    tx: Option<mpsc::Sender<ChannelMessage>>,
}

#[async_trait]
impl ChannelSink for MpscSink {
    async fn send(&mut self, message: ChannelMessage) -> Result<(), ChannelError> {
        let tx = self.tx.as_ref().ok_or(ChannelError::Closed)?;
        tx.send(message).await.map_err(|_| ChannelError::Closed)
    }

    async fn close(&mut self) {
        self.tx = None;
    }
}

/// Source backed by a tokio mpsc receiver.
#[derive(Debug)]
pub struct MpscSource {
    rx: mpsc::Receiver<ChannelMessage>,
}

#[async_trait]
impl ChannelSource for MpscSource {
    async fn recv(&mut self) -> Option<Result<ChannelMessage, ChannelError>> {
        self.rx.recv().await.map(Ok)
    }
}

/// Create a sink whose messages arrive on the returned receiver.
///
/// The receiver yields `None` once the sink is closed or dropped.
pub fn mpsc_sink(capacity: usize) -> (MpscSink, mpsc::Receiver<ChannelMessage>) {
    let (tx, rx) = mpsc::channel(capacity);
    (MpscSink { tx: Some(tx) }, rx)
}

/// Create a source fed by the returned sender.
///
/// Dropping every sender closes the source.
pub fn mpsc_source(capacity: usize) -> (mpsc::Sender<ChannelMessage>, MpscSource) {
    let (tx, rx) = mpsc::channel(capacity);
    (tx, MpscSource { rx })
}
