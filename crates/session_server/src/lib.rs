//! # Session Server - Connection Admission and Lifecycle
//!
//! The front door of a real-time server: it accepts inbound WebSocket
//! connections, decides through a synchronous voting protocol whether each one
//! is admitted, tracks the admitted ones and tells interested parties when
//! connections come and go.
//!
//! ## Admission
//!
//! Every accepted socket is wrapped in a [`Connection`] and offered to the
//! `CONNECTION_REQUEST` subscribers of its [`ConnectionRegistry`] through a
//! shared [`AdmissionRequest`]:
//!
//! * A connection is admitted only if some subscriber called `allow()` and
//!   nobody called `deny()`
//! * With no votes at all the attempt is refused with `Server Full`
//! * The last `deny()` decides the descriptor sent to the client
//!
//! ```rust
//! use session_server::ConnectionRegistry;
//!
//! let registry = ConnectionRegistry::new();
//! registry.on_connection_request(|request| {
//!     request.allow();
//! });
//! registry.on_connect(|connection| {
//!     println!("connection {} admitted", connection.id());
//! });
//! registry.on_disconnect(|connection| {
//!     println!("connection {} gone", connection.id());
//! });
//! ```
//!
//! ## Liveness
//!
//! Connections carry a keepalive timestamp refreshed by inbound traffic and
//! pongs. Nothing times out on its own: the [`LivenessReaper`] started by
//! [`SessionServer::start`] sweeps the live set and disconnects stale entries
//! with `Session Terminated`.
//!
//! ## Error Handling
//!
//! Misuse is reported as [`SessionError`]; refusals and terminations travel to
//! the client as an [`ErrorDescriptor`].

// Re-export core types and functions for easy access
pub use config::{SecurityConfig, ServerConfig};
pub use connection::{
    Admission, AdmissionRequest, Connection, ConnectionId, ConnectionRegistry, Credentials,
    PlayerId, RegistryEvent,
};
pub use error::{ErrorDescriptor, Result, SessionError};
pub use messaging::ClientMessage;
pub use security::{install_gates, CapacityGate, IpBanGate, RateLimitGate};
pub use server::{LivenessReaper, SessionServer};
pub use shutdown::ShutdownState;
pub use transport::{Transport, WebSocketTransport};
pub use utils::{create_server, create_server_with_config};

// Public module declarations
pub mod config;
pub mod connection;
pub mod error;
pub mod messaging;
pub mod security;
pub mod server;
pub mod shutdown;
pub mod transport;
pub mod utils;

#[cfg(test)]
mod test_support;
#[cfg(test)]
mod tests;
