//! # Session Host - Main Entry Point
//!
//! Runs a [`session_server::SessionServer`] as a standalone process. This
//! entry point handles CLI parsing, configuration loading, logging setup and
//! the application lifecycle.
//!
//! ## Quick Start
//!
//! ```bash
//! # Run with default configuration
//! session-host
//!
//! # Specify custom configuration
//! session-host --config production.toml
//!
//! # Override specific settings
//! session-host --bind 0.0.0.0:8080 --log-level debug
//!
//! # JSON logging for production
//! session-host --json-logs
//! ```
//!
//! ## Configuration
//!
//! The host loads configuration from a TOML file (default: `config.toml`).
//! If the file doesn't exist, a default configuration will be created.
//!
//! ## Signal Handling
//!
//! SIGINT and SIGTERM stop the server and disconnect every live connection
//! with `Session Terminated`. A second signal exits immediately.

use tracing::{error, info};

mod app;
mod cli;
mod config;
mod logging;
mod signals;

pub use app::Application;
pub use cli::CliArgs;
pub use config::AppConfig;

/// Runs the host until shutdown.
///
/// # Exit Codes
///
/// * **0**: Successful execution and shutdown
/// * **1**: Error during startup, configuration, or runtime
///
/// Must be called from within a tokio runtime.
pub async fn init() -> Result<(), Box<dyn std::error::Error>> {
    let args = CliArgs::parse();

    // Logging settings come from the file, so read it before anything logs.
    let config = match AppConfig::load_from_file(&args.config_path).await {
        Ok(config) => config,
        Err(e) => {
            eprintln!("❌ Failed to load {}: {e}", args.config_path.display());
            std::process::exit(1);
        }
    };

    let mut logging_settings = config.logging.clone();
    if let Some(level) = &args.log_level {
        logging_settings.level = level.clone();
    }
    if let Err(e) = logging::setup_logging(&logging_settings, args.json_logs) {
        eprintln!("❌ Failed to setup logging: {e}");
        std::process::exit(1);
    }
    info!("🔧 Loaded configuration from: {}", args.config_path.display());

    match Application::new(config, &args) {
        Ok(app) => {
            if let Err(e) = app.run().await {
                error!("❌ Application error: {:?}", e);
                std::process::exit(1);
            }
        }
        Err(e) => {
            error!("❌ Failed to start application: {e:?}");
            std::process::exit(1);
        }
    }

    Ok(())
}

// Re-export main types for potential library usage
pub use config::{LoggingSettings, SecuritySettings, ServerSettings};
