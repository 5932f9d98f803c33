//! Transport provider boundary.
//!
//! The admission core never touches sockets directly. It talks to an accepted
//! socket through the narrow [`Transport`] trait: write a payload, close with
//! a descriptor, report the peer address. The WebSocket provider used by
//! [`SessionServer`](crate::SessionServer) lives in [`websocket`].

use crate::error::ErrorDescriptor;
use std::fmt::Debug;
use std::net::SocketAddr;

pub mod websocket;

pub use websocket::WebSocketTransport;

/// A raw, accepted transport socket.
///
/// Implementations must not block: `write` and `close` are called from the
/// synchronous admission path. Failures are logged and swallowed by the
/// implementation; the core never retries.
pub trait Transport: Send + Sync + Debug {
    /// Queues a payload for delivery to the peer.
    fn write(&self, payload: &[u8]);

    /// Closes the socket, forwarding the descriptor to the peer.
    fn close(&self, error: &ErrorDescriptor);

    /// The peer address, if the transport knows it.
    fn remote_addr(&self) -> Option<SocketAddr> {
        None
    }
}
