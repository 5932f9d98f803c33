//! Core session server implementation.
//!
//! `SessionServer` owns the [`ConnectionRegistry`] and the network side around
//! it: the TCP listener, the accept loop and the background liveness reaper.
//! It contains no admission policy of its own; that lives in the
//! `CONNECTION_REQUEST` subscribers installed on the registry.

use super::handlers::{handle_connection, PumpSettings};
use super::reaper::LivenessReaper;
use crate::config::ServerConfig;
use crate::connection::ConnectionRegistry;
use crate::error::{Result, SessionError};
use crate::security::{install_gates, RateLimiter};
use crate::shutdown::ShutdownState;
use std::net::SocketAddr;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;
use tokio::net::TcpListener;
use tokio::sync::broadcast;
use tokio::task::JoinHandle;
use tokio::time::interval;
use tracing::{debug, error, info, trace};

/// How often idle rate-limit buckets are pruned.
const RATE_LIMIT_PRUNE_INTERVAL: Duration = Duration::from_secs(60);
/// Buckets untouched for this long are forgotten.
const RATE_LIMIT_MAX_AGE: Duration = Duration::from_secs(300);

/// Session server: accept loop plus the admission registry.
///
/// # Lifecycle
///
/// [`start`](Self::start) binds and spawns the background tasks;
/// [`stop`](Self::stop) ends them again. Stopping leaves live connections
/// alone. A host that wants them gone calls
/// [`ConnectionRegistry::disconnect_all`] itself.
pub struct SessionServer {
    /// Server configuration settings
    config: ServerConfig,

    /// Registry owning admission and the live set
    registry: ConnectionRegistry,

    /// Limiter behind the rate-limit gate, when installed through
    /// [`with_default_gates`](Self::with_default_gates)
    rate_limiter: Option<Arc<RateLimiter>>,

    /// Present while the server is active
    running: Mutex<Option<RunningServer>>,
}

struct RunningServer {
    local_addr: SocketAddr,
    shutdown_state: ShutdownState,
    shutdown_sender: broadcast::Sender<()>,
    accept_task: JoinHandle<()>,
    background: Vec<JoinHandle<()>>,
}

impl SessionServer {
    /// Creates a server with an empty registry.
    ///
    /// No admission gates are installed, so every attempt is refused with
    /// `Server Full` until something subscribes to `CONNECTION_REQUEST`.
    pub fn new(config: ServerConfig) -> Self {
        let registry = ConnectionRegistry::with_liveness_window(config.liveness_window());
        Self {
            config,
            registry,
            rate_limiter: None,
            running: Mutex::new(None),
        }
    }

    /// Creates a server with the capacity, ban and rate-limit gates from
    /// `config.security` already installed.
    pub fn with_default_gates(config: ServerConfig) -> Self {
        let mut server = Self::new(config);
        server.rate_limiter = install_gates(&server.registry, &server.config);
        server
    }

    pub fn config(&self) -> &ServerConfig {
        &self.config
    }

    /// Handle to the registry, for installing subscribers and querying the
    /// live set.
    pub fn registry(&self) -> &ConnectionRegistry {
        &self.registry
    }

    /// Binds the configured address and starts accepting connections.
    ///
    /// Returns the bound address, which differs from the configured one when
    /// binding port 0.
    ///
    /// # Errors
    ///
    /// [`SessionError::Config`] for an invalid configuration and
    /// [`SessionError::Network`] when already started or the bind fails.
    pub async fn start(&self) -> Result<SocketAddr> {
        self.start_with_shutdown_state(ShutdownState::new()).await
    }

    /// Like [`start`](Self::start), but the accept loop and reaper also stop
    /// once `shutdown_state` is initiated elsewhere.
    pub async fn start_with_shutdown_state(&self, shutdown_state: ShutdownState) -> Result<SocketAddr> {
        self.config.validate()?;
        if self.is_active() {
            return Err(SessionError::Network("already started".into()));
        }

        let listener = TcpListener::bind(self.config.bind_address)
            .await
            .map_err(|e| SessionError::Network(format!("Failed to bind {}: {e}", self.config.bind_address)))?;
        let local_addr = listener
            .local_addr()
            .map_err(|e| SessionError::Network(format!("Failed to read local address: {e}")))?;

        let mut running = self.running();
        if running.is_some() {
            // Lost a race with a concurrent start; the listener is dropped here.
            return Err(SessionError::Network("already started".into()));
        }

        info!("🚀 Starting session server on {}", local_addr);

        let (shutdown_sender, shutdown_receiver) = broadcast::channel(1);
        let settings = PumpSettings {
            max_message_size: self.config.max_message_size,
            heartbeat_interval: self.config.heartbeat_interval(),
            handshake_timeout: self.config.handshake_timeout(),
        };
        let accept_task = tokio::spawn(accept_loop(
            listener,
            self.registry.clone(),
            settings,
            shutdown_state.clone(),
            shutdown_receiver,
        ));

        let mut background = Vec::new();
        match self.config.reap_interval() {
            Some(period) => {
                background.push(LivenessReaper::spawn(
                    self.registry.clone(),
                    period,
                    shutdown_state.clone(),
                ));
                info!("🕒 Liveness reaper started with interval: {}ms", self.config.reap_interval_ms);
            }
            None => info!("⏸️ Liveness reaper disabled (interval: 0ms)"),
        }
        if let Some(limiter) = &self.rate_limiter {
            background.push(spawn_rate_limit_pruning(limiter.clone(), shutdown_state.clone()));
        }

        *running = Some(RunningServer {
            local_addr,
            shutdown_state,
            shutdown_sender,
            accept_task,
            background,
        });
        Ok(local_addr)
    }

    /// Stops accepting new sockets and halts the background tasks.
    ///
    /// Live connections keep running. Does nothing when not started.
    pub async fn stop(&self) {
        let Some(running) = self.running().take() else {
            return;
        };

        running.shutdown_state.initiate_shutdown();
        let _ = running.shutdown_sender.send(());
        for task in &running.background {
            task.abort();
        }
        if let Err(e) = running.accept_task.await {
            if !e.is_cancelled() {
                error!("Accept loop ended abnormally: {}", e);
            }
        }
        info!("Server stopped ({} connection(s) still live)", self.registry.len());
    }

    pub fn is_active(&self) -> bool {
        self.running().is_some()
    }

    /// Bound address while active.
    pub fn local_addr(&self) -> Option<SocketAddr> {
        self.running().as_ref().map(|running| running.local_addr)
    }

    fn running(&self) -> MutexGuard<'_, Option<RunningServer>> {
        self.running.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

impl std::fmt::Debug for SessionServer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SessionServer")
            .field("bind_address", &self.config.bind_address)
            .field("local_addr", &self.local_addr())
            .field("registry", &self.registry)
            .finish()
    }
}

async fn accept_loop(
    listener: TcpListener,
    registry: ConnectionRegistry,
    settings: PumpSettings,
    shutdown_state: ShutdownState,
    mut shutdown_receiver: broadcast::Receiver<()>,
) {
    loop {
        if shutdown_state.is_shutdown_initiated() {
            info!("🛑 Accept loop stopping - shutdown initiated");
            break;
        }

        tokio::select! {
            _ = shutdown_receiver.recv() => {
                info!("🛑 Accept loop stopping - server stopped");
                break;
            }
            accepted = listener.accept() => match accepted {
                Ok((stream, addr)) => {
                    trace!("Accepted TCP connection from {}", addr);
                    let registry = registry.clone();
                    tokio::spawn(async move {
                        if let Err(e) = handle_connection(stream, addr, registry, settings).await {
                            debug!("Connection from {} failed: {}", addr, e);
                        }
                    });
                }
                Err(e) => {
                    error!("Failed to accept connection: {}", e);
                }
            }
        }
    }
}

fn spawn_rate_limit_pruning(limiter: Arc<RateLimiter>, shutdown_state: ShutdownState) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut ticker = interval(RATE_LIMIT_PRUNE_INTERVAL);
        loop {
            ticker.tick().await;
            if shutdown_state.is_shutdown_initiated() {
                break;
            }
            limiter.cleanup_old_entries(RATE_LIMIT_MAX_AGE);
            trace!(
                "Rate limiter tracking {} address(es), {} attempt(s) blocked so far",
                limiter.tracked(),
                limiter.blocked_count()
            );
        }
    })
}
