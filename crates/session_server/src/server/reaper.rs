//! Periodic liveness sweep.
//!
//! Connections never time themselves out. The reaper polls
//! [`Connection::is_alive`](crate::connection::Connection::is_alive) for the
//! whole live set and disconnects the stale ones with `Session Terminated`.

use crate::connection::ConnectionRegistry;
use crate::error::ErrorDescriptor;
use crate::shutdown::ShutdownState;
use std::time::{Duration, Instant};
use tokio::task::JoinHandle;
use tokio::time::{interval, MissedTickBehavior};
use tracing::{debug, info, trace};

pub struct LivenessReaper;

impl LivenessReaper {
    /// Disconnects every live connection that is no longer alive and returns
    /// how many were reaped.
    pub fn sweep(registry: &ConnectionRegistry) -> usize {
        Self::sweep_at(registry, Instant::now())
    }

    pub(crate) fn sweep_at(registry: &ConnectionRegistry, now: Instant) -> usize {
        let error = ErrorDescriptor::session_terminated();
        let mut reaped = 0;
        for connection in registry.connections() {
            if connection.is_alive_at(now) {
                continue;
            }
            debug!(
                "💀 Connection {} missed its keepalive (last seen {:?} ago)",
                connection.id(),
                now.saturating_duration_since(connection.last_keepalive())
            );
            if connection.close_with(&error) {
                reaped += 1;
            } else {
                trace!("Connection {} closed before it could be reaped", connection.id());
            }
        }
        if reaped > 0 {
            info!("🧹 Reaped {} stale connection(s)", reaped);
        }
        reaped
    }

    /// Runs [`sweep`](Self::sweep) every `period` until `shutdown` is
    /// initiated.
    pub fn spawn(registry: ConnectionRegistry, period: Duration, shutdown: ShutdownState) -> JoinHandle<()> {
        tokio::spawn(async move {
            let mut ticker = interval(period);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
            loop {
                ticker.tick().await;
                if shutdown.is_shutdown_initiated() {
                    debug!("Liveness reaper stopping - shutdown initiated");
                    break;
                }
                Self::sweep(&registry);
            }
        })
    }
}
