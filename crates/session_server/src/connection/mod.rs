//! Connection admission and lifecycle management.
//!
//! This module handles the lifecycle of client connections: wrapping accepted
//! sockets, arbitrating whether each attempt is admitted, tracking the live
//! set and relaying lifecycle notifications to subscribers.

pub mod admission;
pub mod client;
pub mod events;
pub mod registry;

pub use admission::AdmissionRequest;
pub use client::{Connection, Credentials, MessageHandler};
pub use events::RegistryEvent;
pub use registry::{Admission, ConnectionRegistry};

use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

/// Type alias for connection identifiers.
///
/// Connection IDs are handed out by the registry in increasing order and are
/// never reused within one registry.
pub type ConnectionId = usize;

/// Application entity bound to a connection.
///
/// The core never interprets it; collaborators attach one after admission
/// and use [`ConnectionRegistry::find_by_player`] to route to it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct PlayerId(pub Uuid);

impl PlayerId {
    /// Creates a new random player ID using UUID v4.
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for PlayerId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for PlayerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}
