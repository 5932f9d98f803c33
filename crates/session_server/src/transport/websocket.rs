//! WebSocket transport provider built on `tokio-tungstenite`.
//!
//! Writes are queued on an unbounded channel and drained by a dedicated writer
//! task that owns the sink half of the socket, so the synchronous
//! [`Transport`] calls never wait on the network.

use super::Transport;
use crate::error::ErrorDescriptor;
use futures_util::sink::{Sink, SinkExt};
use std::net::SocketAddr;
use tokio::sync::mpsc;
use tokio_tungstenite::tungstenite::protocol::frame::coding::CloseCode;
use tokio_tungstenite::tungstenite::protocol::CloseFrame;
use tokio_tungstenite::tungstenite::{Error as WsError, Message};
use tracing::{debug, trace};

/// Sending half of an accepted WebSocket.
#[derive(Debug)]
pub struct WebSocketTransport {
    outgoing: mpsc::UnboundedSender<Message>,
    remote_addr: SocketAddr,
}

impl WebSocketTransport {
    /// Wraps the sink half of an upgraded socket and spawns its writer task.
    ///
    /// Must be called from within a tokio runtime.
    pub fn spawn<S>(mut sink: S, remote_addr: SocketAddr) -> Self
    where
        S: Sink<Message, Error = WsError> + Unpin + Send + 'static,
    {
        let (outgoing, mut receiver) = mpsc::unbounded_channel::<Message>();

        tokio::spawn(async move {
            while let Some(message) = receiver.recv().await {
                let closing = matches!(message, Message::Close(_));
                if let Err(e) = sink.send(message).await {
                    debug!("Write to {} failed: {}", remote_addr, e);
                    break;
                }
                if closing {
                    break;
                }
            }
            let _ = sink.close().await;
            trace!("Writer for {} finished", remote_addr);
        });

        Self {
            outgoing,
            remote_addr,
        }
    }

    /// Queues a heartbeat ping. The client's pong counts as a keepalive.
    pub fn ping(&self) {
        self.enqueue(Message::Ping(Default::default()));
    }

    fn enqueue(&self, message: Message) {
        if self.outgoing.send(message).is_err() {
            trace!("Dropping frame for {}: writer already closed", self.remote_addr);
        }
    }
}

impl Transport for WebSocketTransport {
    fn write(&self, payload: &[u8]) {
        let message = match std::str::from_utf8(payload) {
            Ok(text) => Message::text(text.to_owned()),
            Err(_) => Message::binary(payload.to_vec()),
        };
        self.enqueue(message);
    }

    fn close(&self, error: &ErrorDescriptor) {
        let notice = serde_json::json!({ "error": error });
        self.enqueue(Message::text(notice.to_string()));
        self.enqueue(Message::Close(Some(CloseFrame {
            code: close_code_for(error.id),
            reason: error.msg.clone().into(),
        })));
    }

    fn remote_addr(&self) -> Option<SocketAddr> {
        Some(self.remote_addr)
    }
}

/// Maps a descriptor id onto a WebSocket close code.
///
/// Ids below 1000 land in the application range `4000..=4999`; anything else
/// is reported as a policy violation.
pub fn close_code_for(id: u32) -> CloseCode {
    if id < 1000 {
        CloseCode::from(4000 + id as u16)
    } else {
        CloseCode::Policy
    }
}
