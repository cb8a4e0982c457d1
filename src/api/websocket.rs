//! WebSocket handlers for the metrics and terminal streams.
//!
//! Each socket is split into a [`WsSink`] and a [`WsSource`] so the
//! subsystems can drive both directions from separate tasks.

use std::sync::Arc;

use async_trait::async_trait;
use axum::extract::ws::{Message, WebSocket, WebSocketUpgrade};
use axum::extract::{Path, State};
use axum::response::IntoResponse;
use futures_util::stream::{SplitSink, SplitStream};
use futures_util::{SinkExt, StreamExt};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use super::state::AppState;
use crate::channel::{ChannelError, ChannelMessage, ChannelSink, ChannelSource};

/// Outbound half of a WebSocket.
pub struct WsSink {
    sender: SplitSink<WebSocket, Message>,
    closed: bool,
}

impl WsSink {
    pub fn new(sender: SplitSink<WebSocket, Message>) -> Self {
        Self {
            sender,
            closed: false,
        }
    }
}

#[async_trait]
impl ChannelSink for WsSink {
    async fn send(&mut self, message: ChannelMessage) -> Result<(), ChannelError> {
        if self.closed {
            return Err(ChannelError::Closed);
        }

        let message = match message {
            ChannelMessage::Text(text) => Message::Text(text.into()),
            ChannelMessage::Binary(data) => Message::Binary(data.into()),
        };
        self.sender
            .send(message)
            .await
            .map_err(|e| ChannelError::Transport(e.to_string()))
    }

    async fn close(&mut self) {
        if !self.closed {
            self.closed = true;
            let _ = self.sender.close().await;
        }
    }
}

/// Inbound half of a WebSocket.
pub struct WsSource {
    receiver: SplitStream<WebSocket>,
}

impl WsSource {
    pub fn new(receiver: SplitStream<WebSocket>) -> Self {
        Self { receiver }
    }
}

#[async_trait]
impl ChannelSource for WsSource {
    async fn recv(&mut self) -> Option<Result<ChannelMessage, ChannelError>> {
        loop {
            match self.receiver.next().await? {
                Ok(Message::Text(text)) => return Some(Ok(ChannelMessage::Text(text.to_string()))),
                Ok(Message::Binary(data)) => return Some(Ok(ChannelMessage::Binary(data.to_vec()))),
                Ok(Message::Close(_)) => {
                    debug!("Client closed WebSocket connection");
                    return None;
                }
                // Axum answers pings itself
                Ok(Message::Ping(_)) | Ok(Message::Pong(_)) => continue,
                Err(e) => return Some(Err(ChannelError::Transport(e.to_string()))),
            }
        }
    }
}

/// Split a socket into channel halves.
fn split_socket(socket: WebSocket) -> (WsSink, WsSource) {
    let (sender, receiver) = socket.split();
    (WsSink::new(sender), WsSource::new(receiver))
}

/// WebSocket handler for the metrics stream of one host.
pub async fn metrics_ws_handler(
    State(state): State<Arc<AppState>>,
    Path(address): Path<String>,
    ws: WebSocketUpgrade,
) -> impl IntoResponse {
    info!(host = %address, "Metrics WebSocket requested");
    ws.on_upgrade(move |socket| handle_metrics_socket(socket, address, state))
}

async fn handle_metrics_socket(socket: WebSocket, address: String, state: Arc<AppState>) {
    let _guard = state.track_stream();
    let (mut sink, mut source) = split_socket(socket);

    let record = match state.store.get(&address) {
        Ok(record) => record,
        Err(e) => {
            warn!(host = %address, error = %e, "Metrics stream for unknown host");
            let _ = sink.send(ChannelMessage::Text(e.to_string())).await;
            sink.close().await;
            return;
        }
    };

    // Client messages are ignored; the stream ends when the client goes away
    let cancel = CancellationToken::new();
    let recv_task = {
        let cancel = cancel.clone();
        tokio::spawn(async move {
            while let Some(Ok(_)) = source.recv().await {}
            cancel.cancel();
        })
    };

    let result = state
        .collector()
        .start_polling(&record.host, &mut sink, &cancel)
        .await;

    recv_task.abort();
    match result {
        Ok(cycles) => info!(host = %address, cycles, "Metrics WebSocket closed"),
        Err(e) => info!(host = %address, error = %e, "Metrics WebSocket ended"),
    }
}

/// WebSocket handler for an interactive terminal on one host.
pub async fn terminal_ws_handler(
    State(state): State<Arc<AppState>>,
    Path(address): Path<String>,
    ws: WebSocketUpgrade,
) -> impl IntoResponse {
    info!(host = %address, "Terminal WebSocket requested");
    ws.on_upgrade(move |socket| handle_terminal_socket(socket, address, state))
}

async fn handle_terminal_socket(socket: WebSocket, address: String, state: Arc<AppState>) {
    let _guard = state.track_stream();
    let (mut sink, source) = split_socket(socket);

    let record = match state.store.get(&address) {
        Ok(record) => record,
        Err(e) => {
            warn!(host = %address, error = %e, "Terminal for unknown host");
            let _ = sink.send(ChannelMessage::Text(e.to_string())).await;
            sink.close().await;
            return;
        }
    };

    match state.terminal().run(&record.host, sink, source).await {
        Ok(summary) => info!(
            host = %address,
            exit = ?summary.exit,
            "Terminal WebSocket closed"
        ),
        Err(e) => info!(host = %address, error = %e, "Terminal WebSocket ended"),
    }
}
