//! Shutdown coordination for graceful server shutdown.
//!
//! Shared between the signal handler, the accept loop and the liveness
//! reaper so all of them stop together.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tracing::info;

/// Shared shutdown state for coordinating graceful shutdown across components.
#[derive(Debug, Clone)]
pub struct ShutdownState {
    /// Set once shutdown starts; no new connections are accepted after this
    shutdown_initiated: Arc<AtomicBool>,
    /// Set once the host finished its own cleanup
    shutdown_complete: Arc<AtomicBool>,
}

impl ShutdownState {
    pub fn new() -> Self {
        Self {
            shutdown_initiated: Arc::new(AtomicBool::new(false)),
            shutdown_complete: Arc::new(AtomicBool::new(false)),
        }
    }

    pub fn is_shutdown_initiated(&self) -> bool {
        self.shutdown_initiated.load(Ordering::Acquire)
    }

    pub fn is_shutdown_complete(&self) -> bool {
        self.shutdown_complete.load(Ordering::Acquire)
    }

    /// Initiates shutdown. Returns `false` if it was already initiated.
    pub fn initiate_shutdown(&self) -> bool {
        let first = !self.shutdown_initiated.swap(true, Ordering::AcqRel);
        if first {
            info!("🛑 Shutdown initiated - no new connections will be accepted");
        }
        first
    }

    pub fn complete_shutdown(&self) {
        self.shutdown_complete.store(true, Ordering::Release);
        info!("✅ Shutdown complete - ready for final cleanup");
    }
}

impl Default for ShutdownState {
    fn default() -> Self {
        Self::new()
    }
}
