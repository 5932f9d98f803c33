//! Lifecycle notifications raised by the registry.
//!
//! Subscribers are plain callbacks kept in one list per notification kind and
//! invoked synchronously, in registration order. Lists are snapshotted before
//! dispatch so a handler may register further handlers without deadlocking;
//! those take effect from the next notification.

use super::{AdmissionRequest, Connection};
use std::fmt;
use std::sync::{Arc, RwLock};

/// Subscriber for `CONNECTION_REQUEST`.
pub type RequestHandler = Arc<dyn Fn(&mut AdmissionRequest) + Send + Sync>;

/// Subscriber for `CONNECT` and `DISCONNECT`.
pub type ConnectionHandler = Arc<dyn Fn(&Arc<Connection>) + Send + Sync>;

/// The three notification kinds a registry raises.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RegistryEvent {
    /// An attempt is being arbitrated. Payload: the [`AdmissionRequest`].
    ConnectionRequest,
    /// An attempt was admitted. Payload: the new [`Connection`].
    Connect,
    /// A connection left the live set. Payload: the removed [`Connection`].
    Disconnect,
}

impl RegistryEvent {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::ConnectionRequest => "connection_request",
            Self::Connect => "connect",
            Self::Disconnect => "disconnect",
        }
    }
}

impl fmt::Display for RegistryEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Default)]
pub(crate) struct Subscribers {
    request: RwLock<Vec<RequestHandler>>,
    connect: RwLock<Vec<ConnectionHandler>>,
    disconnect: RwLock<Vec<ConnectionHandler>>,
}

impl Subscribers {
    pub(crate) fn add_request(&self, handler: RequestHandler) {
        write(&self.request).push(handler);
    }

    pub(crate) fn add_connect(&self, handler: ConnectionHandler) {
        write(&self.connect).push(handler);
    }

    pub(crate) fn add_disconnect(&self, handler: ConnectionHandler) {
        write(&self.disconnect).push(handler);
    }

    pub(crate) fn emit_request(&self, request: &mut AdmissionRequest) {
        let handlers = read(&self.request).clone();
        for handler in handlers {
            handler(request);
        }
    }

    pub(crate) fn emit_connect(&self, connection: &Arc<Connection>) {
        let handlers = read(&self.connect).clone();
        for handler in handlers {
            handler(connection);
        }
    }

    pub(crate) fn emit_disconnect(&self, connection: &Arc<Connection>) {
        let handlers = read(&self.disconnect).clone();
        for handler in handlers {
            handler(connection);
        }
    }

    pub(crate) fn count(&self, event: RegistryEvent) -> usize {
        match event {
            RegistryEvent::ConnectionRequest => read(&self.request).len(),
            RegistryEvent::Connect => read(&self.connect).len(),
            RegistryEvent::Disconnect => read(&self.disconnect).len(),
        }
    }
}

fn read<T>(lock: &RwLock<T>) -> std::sync::RwLockReadGuard<'_, T> {
    lock.read().unwrap_or_else(|poisoned| poisoned.into_inner())
}

fn write<T>(lock: &RwLock<T>) -> std::sync::RwLockWriteGuard<'_, T> {
    lock.write().unwrap_or_else(|poisoned| poisoned.into_inner())
}
