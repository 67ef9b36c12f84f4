//! OS signal → shutdown request.
//!
//! The accept loop never gets interrupted asynchronously.  Signals are
//! turned into a [`ShutdownTrigger::fire`] call that the loop observes at its
//! next suspension point.

use std::io;

use tracing::info;

use crate::infrastructure::shutdown::ShutdownTrigger;

/// Spawns a task that fires `trigger` on SIGINT or SIGTERM.
///
/// Must be called from within a Tokio runtime.
///
/// # Errors
///
/// Returns an error if a signal handler cannot be registered.
#[cfg(unix)]
pub fn install_signal_handlers(trigger: ShutdownTrigger) -> io::Result<()> {
    use tokio::signal::unix::{signal, SignalKind};

    let mut interrupt = signal(SignalKind::interrupt())?;
    let mut terminate = signal(SignalKind::terminate())?;

    tokio::spawn(async move {
        tokio::select! {
            _ = interrupt.recv() => info!("received SIGINT; initiating shutdown"),
            _ = terminate.recv() => info!("received SIGTERM; initiating shutdown"),
        }
        trigger.fire();
    });
    Ok(())
}

/// Spawns a task that fires `trigger` on Ctrl+C.
#[cfg(not(unix))]
pub fn install_signal_handlers(trigger: ShutdownTrigger) -> io::Result<()> {
    tokio::spawn(async move {
        match tokio::signal::ctrl_c().await {
            Ok(()) => {
                info!("received Ctrl+C; initiating shutdown");
                trigger.fire();
            }
            Err(e) => tracing::error!("failed to listen for Ctrl+C: {e}"),
        }
    });
    Ok(())
}
