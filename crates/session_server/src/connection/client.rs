//! Client connection representation and management.
//!
//! A [`Connection`] wraps exactly one accepted transport socket. It is created
//! by the registry before admission is decided and dies, permanently, the
//! first time its transport is cleared: either by an explicit
//! [`Connection::disconnect`] or by the transport reporting that it closed.

use super::{
    registry::{ConnectionRegistry, RegistryInner},
    ConnectionId, PlayerId,
};
use crate::error::{ErrorDescriptor, Result, SessionError};
use crate::messaging::{parse_frame, ClientMessage};
use crate::transport::Transport;
use std::fmt;
use std::net::SocketAddr;
use std::sync::{Arc, Mutex, MutexGuard, Weak};
use std::time::{Duration, Instant, SystemTime};
use tracing::{debug, trace};

/// Callback invoked for every parsed inbound message.
pub type MessageHandler = Arc<dyn Fn(&Connection, ClientMessage) + Send + Sync>;

/// Opaque credential slot.
///
/// Filled in by authentication collaborators after admission; the core only
/// stores it.
#[derive(Debug, Clone, PartialEq)]
pub struct Credentials(pub serde_json::Value);

struct ConnectionState {
    transport: Option<Arc<dyn Transport>>,
    registry: Option<Weak<RegistryInner>>,
    credentials: Option<Credentials>,
    player: Option<PlayerId>,
    keepalive: Instant,
    message_handler: Option<MessageHandler>,
}

/// Represents an individual client connection to the server.
pub struct Connection {
    id: ConnectionId,
    remote_addr: Option<SocketAddr>,
    connected_at: SystemTime,
    liveness_window: Duration,
    state: Mutex<ConnectionState>,
}

impl Connection {
    pub(crate) fn new(
        id: ConnectionId,
        transport: Arc<dyn Transport>,
        registry: Weak<RegistryInner>,
        liveness_window: Duration,
    ) -> Self {
        Self {
            id,
            remote_addr: transport.remote_addr(),
            connected_at: SystemTime::now(),
            liveness_window,
            state: Mutex::new(ConnectionState {
                transport: Some(transport),
                registry: Some(registry),
                credentials: None,
                player: None,
                keepalive: Instant::now(),
                message_handler: None,
            }),
        }
    }

    // Poisoning only happens if a panic unwound while the guard was held;
    // the state itself is still consistent, so keep going.
    fn lock(&self) -> MutexGuard<'_, ConnectionState> {
        self.state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    pub fn id(&self) -> ConnectionId {
        self.id
    }

    pub fn remote_addr(&self) -> Option<SocketAddr> {
        self.remote_addr
    }

    pub fn connected_at(&self) -> SystemTime {
        self.connected_at
    }

    pub fn liveness_window(&self) -> Duration {
        self.liveness_window
    }

    /// Writes a payload to the peer. Does nothing once the transport is gone.
    pub fn send(&self, payload: &[u8]) {
        let transport = self.lock().transport.clone();
        match transport {
            Some(transport) => transport.write(payload),
            None => trace!("Connection {} is dead, dropping {} bytes", self.id, payload.len()),
        }
    }

    /// Closes the transport with `error` and severs the link to the registry.
    ///
    /// If the connection was still registered it is removed from the live set,
    /// which raises exactly one `DISCONNECT`. Calling this again is a no-op.
    ///
    /// # Errors
    ///
    /// [`SessionError::InvalidArgument`] when no descriptor is given.
    pub fn disconnect(&self, error: impl Into<Option<ErrorDescriptor>>) -> Result<()> {
        let error = error
            .into()
            .ok_or(SessionError::InvalidArgument("disconnect requires an error descriptor"))?;
        self.close_with(&error);
        Ok(())
    }

    /// Closes the transport with `error` and returns whether this call was
    /// the one that detached it.
    pub(crate) fn close_with(&self, error: &ErrorDescriptor) -> bool {
        let (transport, registry) = {
            let mut state = self.lock();
            (state.transport.take(), state.registry.take())
        };

        let closed = match transport {
            Some(transport) => {
                debug!("🔌 Disconnecting connection {}: {}", self.id, error);
                transport.close(error);
                true
            }
            None => false,
        };

        if let Some(inner) = registry.and_then(|weak| weak.upgrade()) {
            ConnectionRegistry::from_inner(inner).remove_by_id(self.id);
        }
        closed
    }

    /// Records a liveness signal.
    pub fn keepalive(&self) {
        self.lock().keepalive = Instant::now();
    }

    pub fn last_keepalive(&self) -> Instant {
        self.lock().keepalive
    }

    /// Liveness estimate: the transport is present and a keepalive was seen
    /// within the liveness window.
    pub fn is_alive(&self) -> bool {
        self.is_alive_at(Instant::now())
    }

    /// [`is_alive`](Self::is_alive) evaluated at an arbitrary instant.
    pub fn is_alive_at(&self, now: Instant) -> bool {
        let state = self.lock();
        state.transport.is_some()
            && now.saturating_duration_since(state.keepalive) < self.liveness_window
    }

    /// Kills a connection that never made it into the live set. The registry
    /// has already closed the socket itself.
    pub(crate) fn detach(&self) {
        let mut state = self.lock();
        state.transport = None;
        state.registry = None;
    }

    /// Registers the callback that receives parsed inbound messages,
    /// replacing any previous one.
    pub fn on_message<F>(&self, handler: F)
    where
        F: Fn(&Connection, ClientMessage) + Send + Sync + 'static,
    {
        self.lock().message_handler = Some(Arc::new(handler));
    }

    /// Feeds one raw inbound frame into the connection.
    ///
    /// Frames that fail to parse are dropped, as is everything when no
    /// message callback is registered.
    pub fn handle_data(&self, raw: &[u8]) {
        let handler = self.lock().message_handler.clone();
        let Some(handler) = handler else {
            trace!("Connection {} has no message handler, discarding frame", self.id);
            return;
        };

        match parse_frame(raw) {
            Ok(message) => handler(self, message),
            Err(e) => debug!("Connection {} sent an unparseable frame: {}", self.id, e),
        }
    }

    /// Called by the transport provider when the socket closed underneath us.
    ///
    /// This is the only path by which a client-side drop reaches the registry.
    pub fn handle_transport_closed(&self) {
        let registry = {
            let mut state = self.lock();
            state.transport = None;
            state.registry.take()
        };

        if let Some(inner) = registry.and_then(|weak| weak.upgrade()) {
            debug!("Transport for connection {} closed", self.id);
            ConnectionRegistry::from_inner(inner).remove_by_id(self.id);
        }
    }

    pub fn credentials(&self) -> Option<Credentials> {
        self.lock().credentials.clone()
    }

    pub fn set_credentials(&self, credentials: Option<Credentials>) {
        self.lock().credentials = credentials;
    }

    pub fn player(&self) -> Option<PlayerId> {
        self.lock().player
    }

    pub fn set_player(&self, player: Option<PlayerId>) {
        self.lock().player = player;
    }

    /// Whether a transport is still attached. A detached connection never
    /// comes back.
    pub fn has_transport(&self) -> bool {
        self.lock().transport.is_some()
    }
}

impl fmt::Debug for Connection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Connection")
            .field("id", &self.id)
            .field("remote_addr", &self.remote_addr)
            .field("connected", &self.has_transport())
            .field("player", &self.player())
            .finish()
    }
}
