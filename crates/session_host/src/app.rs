//! Main application logic and lifecycle management.
//!
//! This module contains the `Application` struct that orchestrates server
//! startup, monitoring, and shutdown.

use crate::{
    cli::CliArgs,
    config::AppConfig,
    logging::display_banner,
    signals::{shutdown_on, termination_signal},
};
use session_server::{ErrorDescriptor, SessionServer, ShutdownState};
use std::time::Duration;
use tracing::{error, info, warn};

/// How often the live connection count is reported.
const MONITORING_INTERVAL: Duration = Duration::from_secs(60);

/// Time given to writer tasks to flush the termination notices.
const DISCONNECT_FLUSH_GRACE: Duration = Duration::from_millis(500);

/// The session host application.
///
/// Owns the merged configuration and the session server, and decides what
/// happens to live connections when the process shuts down.
pub struct Application {
    /// Loaded application configuration
    config: AppConfig,
    /// Session server instance
    server: SessionServer,
}

impl Application {
    /// Creates a new application instance from an already loaded
    /// configuration.
    ///
    /// # Process
    ///
    /// 1. Apply command-line argument overrides
    /// 2. Validate merged configuration
    /// 3. Display startup banner
    /// 4. Create the session server with the default admission gates
    pub fn new(mut config: AppConfig, args: &CliArgs) -> Result<Self, Box<dyn std::error::Error>> {
        if let Some(bind_address) = &args.bind_address {
            config.server.bind_address = bind_address.clone();
        }

        if let Some(log_level) = &args.log_level {
            config.logging.level = log_level.clone();
        }

        if args.json_logs {
            config.logging.json_format = true;
        }

        if let Err(e) = config.validate() {
            return Err(format!("Configuration validation failed: {e}").into());
        }
        info!("✅ Configuration validated successfully");

        display_banner();

        let server = SessionServer::with_default_gates(config.to_server_config()?);

        info!("📂 Config: {}", args.config_path.display());

        Ok(Self { config, server })
    }

    /// Runs the server until a termination signal arrives, then shuts down.
    ///
    /// # Shutdown phases
    ///
    /// 1. Stop accepting new sockets and halt the reaper
    /// 2. Disconnect every live connection with `Session Terminated`
    /// 3. Give the writer tasks a moment to flush
    pub async fn run(self) -> Result<(), Box<dyn std::error::Error>> {
        info!("🌟 Starting Session Host Application");

        self.log_configuration_summary();

        let shutdown_state = ShutdownState::new();
        let local_addr = self
            .server
            .start_with_shutdown_state(shutdown_state.clone())
            .await?;

        let monitoring_handle = {
            let registry = self.server.registry().clone();
            tokio::spawn(async move {
                let mut interval = tokio::time::interval(MONITORING_INTERVAL);
                interval.tick().await;
                loop {
                    interval.tick().await;
                    info!("📊 System Health - {} live connection(s)", registry.len());
                }
            })
        };

        info!("✅ Session Host is now running!");
        info!("🎮 Ready to accept connections on {}", local_addr);
        info!("🛑 Press Ctrl+C to gracefully shutdown");

        if shutdown_on(termination_signal(), &shutdown_state).await? {
            info!("📡 Received shutdown signal - initiating graceful shutdown");
        }

        // A second signal skips the graceful path.
        tokio::spawn(async move {
            if let Err(e) = termination_signal().await {
                error!("Failed to set up merciless shutdown signal handler: {e}");
                return;
            }

            warn!("Shutdown handler received again! I'll make this quick.");
            std::process::exit(1);
        });

        monitoring_handle.abort();

        info!("📡 Phase 1: Stopping new connections...");
        self.server.stop().await;

        info!("🔌 Phase 2: Disconnecting live connections...");
        let disconnected = self
            .server
            .registry()
            .disconnect_all(&ErrorDescriptor::session_terminated());
        info!("✅ Disconnected {} connection(s)", disconnected);

        info!("⏳ Phase 3: Waiting for connections to close...");
        tokio::time::sleep(DISCONNECT_FLUSH_GRACE).await;

        shutdown_state.complete_shutdown();
        info!("✅ Session Host shutdown complete");

        Ok(())
    }

    /// Logs the configuration summary at startup.
    fn log_configuration_summary(&self) {
        info!("📋 Configuration Summary:");
        info!("  🌐 Bind address: {}", self.config.server.bind_address);
        info!("  👥 Max connections: {}", self.config.server.max_connections);
        info!("  💓 Liveness window: {}ms", self.config.server.liveness_window_ms);
        info!("  🧹 Reap interval: {}ms", self.config.server.reap_interval_ms);
        info!("  🚫 Banned addresses: {}", self.config.security.banned_ips.len());
        if self.config.security.enable_rate_limiting {
            info!(
                "  🚦 Rate limit: {} attempts/min per IP",
                self.config.security.max_attempts_per_minute
            );
        } else {
            info!("  🚦 Rate limit: disabled");
        }
    }

    pub fn server(&self) -> &SessionServer {
        &self.server
    }
}
