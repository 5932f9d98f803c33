//! Factory functions for creating server instances.

use crate::{config::ServerConfig, server::SessionServer};

/// Creates a session server with the default configuration and the default
/// admission gates.
///
/// # Example
///
/// ```rust
/// use session_server::create_server;
///
/// let server = create_server();
/// assert!(!server.is_active());
/// ```
pub fn create_server() -> SessionServer {
    SessionServer::with_default_gates(ServerConfig::default())
}

/// Creates a session server with the default admission gates configured from
/// `config`.
///
/// # Example
///
/// ```rust
/// use session_server::{create_server_with_config, ServerConfig};
///
/// let config = ServerConfig {
///     bind_address: "0.0.0.0:9000".parse().unwrap(),
///     max_connections: 5000,
///     ..Default::default()
/// };
///
/// let server = create_server_with_config(config);
/// assert_eq!(server.config().max_connections, 5000);
/// ```
pub fn create_server_with_config(config: ServerConfig) -> SessionServer {
    SessionServer::with_default_gates(config)
}
