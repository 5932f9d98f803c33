//! Connection registry: admission arbitration and the live set.
//!
//! The registry is the single owner of live connections. It wraps every
//! accepted socket in a [`Connection`], asks its `CONNECTION_REQUEST`
//! subscribers for a verdict, and then either closes the socket or adds the
//! connection to the live set and raises `CONNECT`. Removal, from an explicit
//! disconnect or from the transport closing, raises `DISCONNECT` exactly once.
//!
//! # Concurrency
//!
//! Arbitration is synchronous and serialized per registry: the shared
//! [`AdmissionRequest`] is held behind a mutex for the whole attempt, so a
//! `CONNECTION_REQUEST` handler must never call
//! [`ConnectionRegistry::on_connection_attempt`] on the same registry.

use super::{
    events::{RegistryEvent, Subscribers},
    AdmissionRequest, Connection, ConnectionId, PlayerId,
};
use crate::error::{ErrorDescriptor, Result, SessionError};
use crate::transport::Transport;
use dashmap::DashMap;
use std::fmt;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, Weak};
use std::time::Duration;
use tracing::{debug, info, warn};

/// Default liveness window for new connections.
pub const DEFAULT_LIVENESS_WINDOW: Duration = Duration::from_secs(5);

/// Outcome of one connection attempt.
#[derive(Debug, Clone)]
pub enum Admission {
    /// The connection is now in the live set.
    Approved(Arc<Connection>),
    /// The socket was closed with this descriptor.
    Denied(ErrorDescriptor),
}

impl Admission {
    pub fn is_approved(&self) -> bool {
        matches!(self, Self::Approved(_))
    }

    /// The admitted connection, if any.
    pub fn approved(self) -> Option<Arc<Connection>> {
        match self {
            Self::Approved(connection) => Some(connection),
            Self::Denied(_) => None,
        }
    }

    /// The refusal descriptor, if any.
    pub fn denied(&self) -> Option<&ErrorDescriptor> {
        match self {
            Self::Approved(_) => None,
            Self::Denied(error) => Some(error),
        }
    }
}

pub(crate) struct RegistryInner {
    live: DashMap<ConnectionId, Arc<Connection>>,
    admission: Mutex<AdmissionRequest>,
    subscribers: Subscribers,
    next_id: AtomicUsize,
    liveness_window: Duration,
}

/// Central registry for all client connections.
///
/// Cloning is cheap and yields a handle to the same registry. Connections keep
/// only a weak link back to it.
#[derive(Clone)]
pub struct ConnectionRegistry {
    inner: Arc<RegistryInner>,
}

impl ConnectionRegistry {
    /// Creates a registry whose connections use the default 5 second
    /// liveness window.
    pub fn new() -> Self {
        Self::with_liveness_window(DEFAULT_LIVENESS_WINDOW)
    }

    pub fn with_liveness_window(liveness_window: Duration) -> Self {
        Self {
            inner: Arc::new(RegistryInner {
                live: DashMap::new(),
                admission: Mutex::new(AdmissionRequest::new()),
                subscribers: Subscribers::default(),
                next_id: AtomicUsize::new(1),
                liveness_window,
            }),
        }
    }

    pub(crate) fn from_inner(inner: Arc<RegistryInner>) -> Self {
        Self { inner }
    }

    /// Non-owning handle for subscribers that need to query the registry
    /// they are installed on.
    pub(crate) fn downgrade(&self) -> Weak<RegistryInner> {
        Arc::downgrade(&self.inner)
    }

    pub(crate) fn upgrade(weak: &Weak<RegistryInner>) -> Option<Self> {
        weak.upgrade().map(Self::from_inner)
    }

    /// Wraps a socket in a connection bound to this registry without
    /// admitting it.
    pub(crate) fn wrap(&self, transport: Arc<dyn Transport>) -> Arc<Connection> {
        let id = self.inner.next_id.fetch_add(1, Ordering::Relaxed);
        Arc::new(Connection::new(
            id,
            transport,
            self.downgrade(),
            self.inner.liveness_window,
        ))
    }

    /// Subscribes to `CONNECTION_REQUEST`. The handler votes on the attempt
    /// through the [`AdmissionRequest`] it receives.
    pub fn on_connection_request<F>(&self, handler: F)
    where
        F: Fn(&mut AdmissionRequest) + Send + Sync + 'static,
    {
        self.inner.subscribers.add_request(Arc::new(handler));
    }

    /// Subscribes to `CONNECT`.
    pub fn on_connect<F>(&self, handler: F)
    where
        F: Fn(&Arc<Connection>) + Send + Sync + 'static,
    {
        self.inner.subscribers.add_connect(Arc::new(handler));
    }

    /// Subscribes to `DISCONNECT`.
    pub fn on_disconnect<F>(&self, handler: F)
    where
        F: Fn(&Arc<Connection>) + Send + Sync + 'static,
    {
        self.inner.subscribers.add_disconnect(Arc::new(handler));
    }

    /// Number of handlers registered for `event`.
    pub fn handler_count(&self, event: RegistryEvent) -> usize {
        self.inner.subscribers.count(event)
    }

    /// Runs the admission protocol for a freshly accepted socket.
    ///
    /// Every `CONNECTION_REQUEST` subscriber has voted by the time this
    /// inspects the verdict. A refused socket is closed with the recorded
    /// descriptor and no further notification is raised for it; an admitted
    /// one joins the live set and `CONNECT` fires.
    pub fn on_connection_attempt(&self, socket: Arc<dyn Transport>) -> Admission {
        let connection = self.wrap(socket.clone());

        let verdict = {
            let mut request = self
                .inner
                .admission
                .lock()
                .unwrap_or_else(|poisoned| poisoned.into_inner());
            request.reset(connection.clone());
            self.inner.subscribers.emit_request(&mut request);

            let verdict = if request.is_denied() {
                Err(request.error().clone())
            } else if !connection.has_transport() {
                // A subscriber disconnected it mid-arbitration.
                Err(ErrorDescriptor::session_terminated())
            } else {
                // Insert before releasing the request so the next attempt
                // sees the updated live count.
                self.inner.live.insert(connection.id(), connection.clone());
                Ok(())
            };
            request.clear();
            verdict
        };

        match verdict {
            Ok(()) => {
                info!(
                    "🔗 Connection {} admitted from {}",
                    connection.id(),
                    display_addr(&connection)
                );
                self.inner.subscribers.emit_connect(&connection);
                Admission::Approved(connection)
            }
            Err(error) => {
                info!(
                    "🚫 Connection {} from {} denied: {}",
                    connection.id(),
                    display_addr(&connection),
                    error
                );
                if connection.has_transport() {
                    socket.close(&error);
                }
                connection.detach();
                Admission::Denied(error)
            }
        }
    }

    /// Removes a connection from the live set.
    ///
    /// Returns `Ok(true)` and raises one `DISCONNECT` when the connection was
    /// registered. An unregistered connection is logged and yields `Ok(false)`
    /// without a notification, which absorbs the race between an explicit
    /// disconnect and the transport closing.
    ///
    /// # Errors
    ///
    /// [`SessionError::InvalidArgument`] when no connection is given.
    pub fn remove_connection<'a>(
        &self,
        connection: impl Into<Option<&'a Arc<Connection>>>,
    ) -> Result<bool> {
        let connection = connection
            .into()
            .ok_or(SessionError::InvalidArgument("remove_connection requires a connection"))?;
        Ok(self.remove_by_id(connection.id()))
    }

    pub(crate) fn remove_by_id(&self, id: ConnectionId) -> bool {
        match self.inner.live.remove(&id) {
            Some((_, connection)) => {
                info!(
                    "❌ Connection {} from {} disconnected",
                    id,
                    display_addr(&connection)
                );
                self.inner.subscribers.emit_disconnect(&connection);
                true
            }
            None => {
                warn!("Ignoring removal: {}", SessionError::NotFound(id));
                false
            }
        }
    }

    /// Disconnects every live connection with `error` through the normal
    /// removal path. Returns how many were disconnected.
    pub fn disconnect_all(&self, error: &ErrorDescriptor) -> usize {
        let connections = self.connections();
        let count = connections.len();
        for connection in connections {
            if let Err(e) = connection.disconnect(error.clone()) {
                warn!("Failed to disconnect connection {}: {}", connection.id(), e);
            }
            if self.contains(connection.id()) {
                self.remove_by_id(connection.id());
            }
        }
        if count > 0 {
            info!("🧹 Disconnected {} connection(s): {}", count, error);
        }
        count
    }

    /// Number of live connections.
    pub fn len(&self) -> usize {
        self.inner.live.len()
    }

    pub fn is_empty(&self) -> bool {
        self.inner.live.is_empty()
    }

    pub fn contains(&self, id: ConnectionId) -> bool {
        self.inner.live.contains_key(&id)
    }

    pub fn get(&self, id: ConnectionId) -> Option<Arc<Connection>> {
        self.inner.live.get(&id).map(|entry| entry.value().clone())
    }

    /// Snapshot of the live set, oldest connection first.
    pub fn connections(&self) -> Vec<Arc<Connection>> {
        let mut connections: Vec<_> = self
            .inner
            .live
            .iter()
            .map(|entry| entry.value().clone())
            .collect();
        connections.sort_by_key(|connection| connection.id());
        connections
    }

    /// Finds the live connection bound to `player`.
    pub fn find_by_player(&self, player: PlayerId) -> Option<Arc<Connection>> {
        let found = self
            .inner
            .live
            .iter()
            .find(|entry| entry.value().player() == Some(player))
            .map(|entry| entry.value().clone());
        if found.is_none() {
            debug!("Player {} has no live connection", player);
        }
        found
    }

    pub fn liveness_window(&self) -> Duration {
        self.inner.liveness_window
    }
}

impl Default for ConnectionRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for ConnectionRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ConnectionRegistry")
            .field("live", &self.len())
            .field("liveness_window", &self.inner.liveness_window)
            .finish()
    }
}

fn display_addr(connection: &Connection) -> String {
    connection
        .remote_addr()
        .map(|addr| addr.to_string())
        .unwrap_or_else(|| "<unknown>".to_string())
}
