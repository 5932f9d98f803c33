//! Server configuration types and defaults.
//!
//! This module contains the server configuration structure and default values
//! used to initialize and customize the session server behavior.

use crate::error::{Result, SessionError};
use serde::{Deserialize, Serialize};
use std::net::{IpAddr, SocketAddr};
use std::time::Duration;

/// Configuration structure for the session server.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    /// The socket address to bind the server to
    pub bind_address: SocketAddr,

    /// Maximum number of live connections admitted by the capacity gate
    pub max_connections: usize,

    /// How long a connection stays alive without a keepalive, in milliseconds
    pub liveness_window_ms: u64,

    /// How often the reaper sweeps for stale connections (0 to disable)
    pub reap_interval_ms: u64,

    /// Largest inbound message accepted, in bytes. Larger ones fail the
    /// socket at the protocol layer.
    pub max_message_size: usize,

    /// How long a freshly accepted TCP peer has to complete the WebSocket
    /// upgrade, in milliseconds
    pub handshake_timeout_ms: u64,

    /// Admission security settings
    pub security: SecurityConfig,
}

/// Security configuration for the built-in admission gates
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SecurityConfig {
    /// Addresses refused with the `Banned` descriptor
    pub banned_ips: Vec<IpAddr>,

    /// Enable per-IP rate limiting of connection attempts
    pub enable_rate_limiting: bool,

    /// Maximum connection attempts per minute per IP
    pub max_attempts_per_minute: u32,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind_address: SocketAddr::from(([127, 0, 0, 1], 8080)),
            max_connections: 1000,
            liveness_window_ms: 5_000,
            reap_interval_ms: 1_000,
            max_message_size: 64 * 1024, // 64KB
            handshake_timeout_ms: 10_000,
            security: SecurityConfig::default(),
        }
    }
}

impl Default for SecurityConfig {
    fn default() -> Self {
        Self {
            banned_ips: Vec::new(),
            enable_rate_limiting: true,
            max_attempts_per_minute: 60,
        }
    }
}

impl ServerConfig {
    pub fn liveness_window(&self) -> Duration {
        Duration::from_millis(self.liveness_window_ms)
    }

    pub fn handshake_timeout(&self) -> Duration {
        Duration::from_millis(self.handshake_timeout_ms)
    }

    /// `None` when reaping is disabled.
    pub fn reap_interval(&self) -> Option<Duration> {
        (self.reap_interval_ms > 0).then(|| Duration::from_millis(self.reap_interval_ms))
    }

    /// Heartbeat ping period: half the liveness window, so one lost pong does
    /// not get a connection reaped.
    pub fn heartbeat_interval(&self) -> Duration {
        (self.liveness_window() / 2).max(Duration::from_millis(1))
    }

    /// Checks the values that would make the server unusable.
    pub fn validate(&self) -> Result<()> {
        if self.liveness_window_ms == 0 {
            return Err(SessionError::Config("liveness_window_ms must be greater than 0".into()));
        }
        if self.max_message_size == 0 {
            return Err(SessionError::Config("max_message_size must be greater than 0".into()));
        }
        if self.handshake_timeout_ms == 0 {
            return Err(SessionError::Config("handshake_timeout_ms must be greater than 0".into()));
        }
        if self.security.enable_rate_limiting && self.security.max_attempts_per_minute == 0 {
            return Err(SessionError::Config(
                "max_attempts_per_minute must be greater than 0 when rate limiting is enabled".into(),
            ));
        }
        Ok(())
    }
}
