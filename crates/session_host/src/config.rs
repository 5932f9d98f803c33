//! Configuration management for the session host.
//!
//! This module handles loading, validation, and conversion of the host
//! configuration from TOML files into the [`ServerConfig`] used by the
//! session server.

use serde::{Deserialize, Serialize};
use session_server::{SecurityConfig, ServerConfig};
use std::net::{IpAddr, SocketAddr};
use std::path::Path;
use tracing::info;

/// Application configuration loaded from TOML file.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppConfig {
    /// Server configuration settings
    pub server: ServerSettings,
    /// Admission gate settings
    #[serde(default)]
    pub security: SecuritySettings,
    /// Logging configuration settings
    pub logging: LoggingSettings,
}

/// Network and liveness settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerSettings {
    /// Network address to bind the server to (e.g., "127.0.0.1:8080")
    pub bind_address: String,
    /// Maximum number of live connections
    #[serde(default = "default_max_connections")]
    pub max_connections: usize,
    /// Keepalive window in milliseconds
    #[serde(default = "default_liveness_window_ms")]
    pub liveness_window_ms: u64,
    /// Liveness sweep interval in milliseconds (0 to disable)
    #[serde(default = "default_reap_interval_ms")]
    pub reap_interval_ms: u64,
    /// Largest inbound frame in bytes
    #[serde(default = "default_max_message_size")]
    pub max_message_size: usize,
    /// Time allowed for the WebSocket upgrade in milliseconds
    #[serde(default = "default_handshake_timeout_ms")]
    pub handshake_timeout_ms: u64,
}

fn default_max_connections() -> usize {
    1000
}

fn default_liveness_window_ms() -> u64 {
    5_000
}

fn default_reap_interval_ms() -> u64 {
    1_000
}

fn default_max_message_size() -> usize {
    64 * 1024
}

fn default_handshake_timeout_ms() -> u64 {
    10_000
}

/// Admission gate settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SecuritySettings {
    /// Remote addresses refused with the `Banned` descriptor
    #[serde(default)]
    pub banned_ips: Vec<String>,
    /// Enable per-IP rate limiting of connection attempts
    #[serde(default = "default_enable_rate_limiting")]
    pub enable_rate_limiting: bool,
    /// Connection attempts allowed per minute per IP
    #[serde(default = "default_max_attempts_per_minute")]
    pub max_attempts_per_minute: u32,
}

fn default_enable_rate_limiting() -> bool {
    true
}

fn default_max_attempts_per_minute() -> u32 {
    60
}

impl Default for SecuritySettings {
    fn default() -> Self {
        Self {
            banned_ips: Vec::new(),
            enable_rate_limiting: default_enable_rate_limiting(),
            max_attempts_per_minute: default_max_attempts_per_minute(),
        }
    }
}

/// Logging system configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingSettings {
    /// Log level filter (trace, debug, info, warn, error)
    pub level: String,
    /// Whether to output logs in JSON format
    pub json_format: bool,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            server: ServerSettings {
                bind_address: "127.0.0.1:8080".to_string(),
                max_connections: default_max_connections(),
                liveness_window_ms: default_liveness_window_ms(),
                reap_interval_ms: default_reap_interval_ms(),
                max_message_size: default_max_message_size(),
                handshake_timeout_ms: default_handshake_timeout_ms(),
            },
            security: SecuritySettings::default(),
            logging: LoggingSettings {
                level: "info".to_string(),
                json_format: false,
            },
        }
    }
}

impl AppConfig {
    /// Loads configuration from a TOML file.
    ///
    /// If the file doesn't exist, writes the default configuration there and
    /// returns it.
    pub async fn load_from_file(path: &Path) -> Result<Self, Box<dyn std::error::Error>> {
        if path.exists() {
            let content = tokio::fs::read_to_string(path).await?;
            let config: AppConfig = toml::from_str(&content)?;
            Ok(config)
        } else {
            let default_config = AppConfig::default();
            let toml_content = toml::to_string_pretty(&default_config)?;
            tokio::fs::write(path, toml_content).await?;
            info!("Created default configuration file: {}", path.display());
            Ok(default_config)
        }
    }

    /// Converts the file configuration into the session server's own
    /// configuration type.
    pub fn to_server_config(&self) -> Result<ServerConfig, Box<dyn std::error::Error>> {
        let bind_address: SocketAddr = self.server.bind_address.parse()?;
        let banned_ips = self
            .security
            .banned_ips
            .iter()
            .map(|ip| ip.parse::<IpAddr>())
            .collect::<Result<Vec<_>, _>>()?;

        let config = ServerConfig {
            bind_address,
            max_connections: self.server.max_connections,
            liveness_window_ms: self.server.liveness_window_ms,
            reap_interval_ms: self.server.reap_interval_ms,
            max_message_size: self.server.max_message_size,
            handshake_timeout_ms: self.server.handshake_timeout_ms,
            security: SecurityConfig {
                banned_ips,
                enable_rate_limiting: self.security.enable_rate_limiting,
                max_attempts_per_minute: self.security.max_attempts_per_minute,
            },
        };
        config.validate()?;
        Ok(config)
    }

    /// Validates the configuration for consistency and correctness.
    ///
    /// # Returns
    ///
    /// `Ok(())` if the configuration is valid, or an error string describing
    /// the issue.
    pub fn validate(&self) -> Result<(), String> {
        if self.server.bind_address.parse::<SocketAddr>().is_err() {
            return Err(format!("Invalid bind address: {}", &self.server.bind_address));
        }

        if self.server.liveness_window_ms == 0 {
            return Err("server.liveness_window_ms must be greater than 0".to_string());
        }

        if self.server.handshake_timeout_ms == 0 {
            return Err("server.handshake_timeout_ms must be greater than 0".to_string());
        }

        if let Some(ip) = self
            .security
            .banned_ips
            .iter()
            .find(|ip| ip.parse::<IpAddr>().is_err())
        {
            return Err(format!("Invalid banned IP address: {ip}"));
        }

        if self.security.enable_rate_limiting && self.security.max_attempts_per_minute == 0 {
            return Err("security.max_attempts_per_minute must be greater than 0".to_string());
        }

        let valid_levels = ["trace", "debug", "info", "warn", "error"];
        if !valid_levels.contains(&self.logging.level.as_str()) {
            return Err(format!(
                "Invalid log level: {}. Must be one of: {valid_levels:?}",
                &self.logging.level
            ));
        }

        Ok(())
    }
}
