//! Per-socket handling for WebSocket clients.
//!
//! Performs the handshake, hands the socket to the registry for admission and,
//! once admitted, pumps inbound frames into the [`Connection`] until the
//! socket closes.

use crate::connection::{Admission, Connection, ConnectionRegistry};
use crate::error::{Result, SessionError};
use crate::transport::WebSocketTransport;
use futures::StreamExt;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tokio::net::TcpStream;
use tokio::time::{interval, timeout, MissedTickBehavior};
use tokio_tungstenite::accept_async_with_config;
use tokio_tungstenite::tungstenite::{protocol::WebSocketConfig, Message};
use tracing::{debug, trace};

/// How long a refused socket is read from so the client can finish the
/// closing handshake.
const CLOSE_GRACE: Duration = Duration::from_secs(1);

/// Knobs the pump needs from the server configuration.
#[derive(Debug, Clone, Copy)]
pub(crate) struct PumpSettings {
    pub max_message_size: usize,
    pub heartbeat_interval: Duration,
    pub handshake_timeout: Duration,
}

impl PumpSettings {
    /// Protocol limits for the socket. A message or frame over
    /// `max_message_size` is a read error, so it is never fully buffered.
    fn websocket_config(&self) -> WebSocketConfig {
        WebSocketConfig::default()
            .max_message_size(Some(self.max_message_size))
            .max_frame_size(Some(self.max_message_size))
    }
}

/// Handles a single client socket from handshake to close.
///
/// A refused socket has already been sent its error descriptor by the
/// registry. An admitted one is read until the client goes away, with a ping
/// every heartbeat interval so idle clients keep answering with pongs.
pub(crate) async fn handle_connection(
    stream: TcpStream,
    addr: SocketAddr,
    registry: ConnectionRegistry,
    settings: PumpSettings,
) -> Result<()> {
    let ws_stream = timeout(
        settings.handshake_timeout,
        accept_async_with_config(stream, Some(settings.websocket_config())),
    )
    .await
    .map_err(|_| SessionError::Network(format!("WebSocket handshake from {addr} timed out")))?
    .map_err(|e| SessionError::Network(format!("WebSocket handshake failed: {e}")))?;

    let (ws_sender, mut ws_receiver) = ws_stream.split();
    let transport = Arc::new(WebSocketTransport::spawn(ws_sender, addr));

    let connection = match registry.on_connection_attempt(transport.clone()) {
        Admission::Approved(connection) => connection,
        Admission::Denied(_) => {
            let _ = timeout(CLOSE_GRACE, async {
                while let Some(Ok(_)) = ws_receiver.next().await {}
            })
            .await;
            return Ok(());
        }
    };

    let mut heartbeat = interval(settings.heartbeat_interval);
    heartbeat.set_missed_tick_behavior(MissedTickBehavior::Delay);
    heartbeat.tick().await;

    loop {
        tokio::select! {
            frame = ws_receiver.next() => match frame {
                Some(Ok(Message::Text(text))) => {
                    deliver(&connection, text.as_str().as_bytes());
                }
                Some(Ok(Message::Binary(data))) => {
                    deliver(&connection, &data);
                }
                Some(Ok(Message::Ping(_))) | Some(Ok(Message::Pong(_))) => {
                    connection.keepalive();
                }
                Some(Ok(Message::Close(_))) => {
                    debug!("🔌 Client {} requested close", connection.id());
                    break;
                }
                Some(Ok(Message::Frame(_))) => {}
                Some(Err(e)) => {
                    // Oversized messages land here too.
                    debug!("WebSocket error for connection {}: {}", connection.id(), e);
                    break;
                }
                None => break,
            },
            _ = heartbeat.tick() => {
                if !connection.has_transport() {
                    trace!("Connection {} was closed by the server", connection.id());
                    break;
                }
                transport.ping();
            }
        }
    }

    connection.handle_transport_closed();
    Ok(())
}

fn deliver(connection: &Connection, payload: &[u8]) {
    connection.keepalive();
    connection.handle_data(payload);
}
