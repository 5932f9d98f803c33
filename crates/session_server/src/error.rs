//! Error types and handling for the session server.
//!
//! This module defines the error types that can occur during server operations
//! and the `{id, msg}` descriptors that are forwarded to clients when a
//! connection is refused or terminated.

use crate::connection::ConnectionId;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Enumeration of possible server errors.
///
/// Admission denial is deliberately absent: a refused connection is a normal
/// outcome of arbitration and is reported through [`ErrorDescriptor`], not
/// through this type.
#[derive(Debug, thiserror::Error)]
pub enum SessionError {
    /// A required argument was missing. Always fatal to the call.
    #[error("Invalid argument: {0}")]
    InvalidArgument(&'static str),

    /// The connection is not part of the live set.
    #[error("Connection {0} not found")]
    NotFound(ConnectionId),

    /// Network-related errors such as binding failures or connection issues
    #[error("Network error: {0}")]
    Network(String),

    /// Invalid or inconsistent configuration
    #[error("Configuration error: {0}")]
    Config(String),

    /// Internal server errors
    #[error("Internal error: {0}")]
    Internal(String),
}

/// Result alias used throughout the crate.
pub type Result<T> = std::result::Result<T, SessionError>;

/// Reason a connection was denied or terminated.
///
/// This is the `{id, msg}` pair that crosses the transport boundary. Ids
/// below 100 and above the reserved range are free for application use and
/// are passed through untouched.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ErrorDescriptor {
    /// Numeric reason code
    pub id: u32,
    /// Human readable reason
    pub msg: String,
}

impl ErrorDescriptor {
    /// Creates a descriptor from an id and message.
    pub fn new(id: u32, msg: impl Into<String>) -> Self {
        Self { id, msg: msg.into() }
    }

    /// Default denial: nobody allowed the attempt, or capacity is exhausted.
    pub fn server_full() -> Self {
        Self::new(SERVER_FULL, "Server Full")
    }

    /// Liveness reap or forced disconnect.
    pub fn session_terminated() -> Self {
        Self::new(SESSION_TERMINATED, "Session Terminated")
    }

    /// Remote address is on the ban list.
    pub fn banned() -> Self {
        Self::new(BANNED, "Banned")
    }

    /// Too many attempts from the same address.
    pub fn rate_limited() -> Self {
        Self::new(RATE_LIMITED, "Rate Limited")
    }
}

impl fmt::Display for ErrorDescriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} ({})", self.msg, self.id)
    }
}

/// Reserved id for [`ErrorDescriptor::server_full`].
pub const SERVER_FULL: u32 = 100;
/// Reserved id for [`ErrorDescriptor::session_terminated`].
pub const SESSION_TERMINATED: u32 = 101;
/// Id used by the built-in ban gate.
pub const BANNED: u32 = 102;
/// Id used by the built-in rate-limit gate.
pub const RATE_LIMITED: u32 = 103;
