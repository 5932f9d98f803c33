//! Termination signals for the host.
//!
//! SIGINT and SIGTERM on Unix, Ctrl+C elsewhere. The first signal initiates
//! the application's [`ShutdownState`], which the accept loop and the reaper
//! watch. The host waits for a second signal separately and exits on it.

use session_server::ShutdownState;
use std::future::Future;
use std::io;
use tokio::signal;

/// Resolves on the next termination signal.
pub async fn termination_signal() -> io::Result<()> {
    #[cfg(unix)]
    {
        use signal::unix::{signal, SignalKind};

        let mut interrupt = signal(SignalKind::interrupt())?;
        let mut terminate = signal(SignalKind::terminate())?;

        tokio::select! {
            _ = interrupt.recv() => (),
            _ = terminate.recv() => (),
        }
        Ok(())
    }

    #[cfg(not(unix))]
    {
        signal::ctrl_c().await
    }
}

/// Waits for `signal`, then initiates `shutdown`.
///
/// Returns `false` when the state had already been initiated by someone
/// else.
pub async fn shutdown_on<F>(signal: F, shutdown: &ShutdownState) -> io::Result<bool>
where
    F: Future<Output = io::Result<()>>,
{
    signal.await?;
    Ok(shutdown.initiate_shutdown())
}
