//! Termination signal handling
//!
//! The listener only cancels the shutdown token. Cleanup and exit happen in
//! the daemon's main routine once the poll loop observes the token.

use crate::error::{LifecycleError, Result};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::info;

/// Register SIGTERM/SIGINT listeners that cancel `shutdown`.
///
/// Registration happens before this returns, so a failure is reported to
/// the caller rather than lost in a background task.
#[cfg(unix)]
pub fn listen_for_shutdown(shutdown: CancellationToken) -> Result<JoinHandle<()>> {
    use tokio::signal::unix::{signal, SignalKind};

    let register = |kind: SignalKind, name: &str| {
        signal(kind).map_err(|e| {
            LifecycleError::DetachFailed(format!("failed to register {} handler: {}", name, e))
        })
    };
    let mut sigterm = register(SignalKind::terminate(), "SIGTERM")?;
    let mut sigint = register(SignalKind::interrupt(), "SIGINT")?;

    Ok(tokio::spawn(async move {
        tokio::select! {
            _ = sigterm.recv() => info!("Received SIGTERM, shutting down..."),
            _ = sigint.recv() => info!("Received SIGINT, shutting down..."),
            _ = shutdown.cancelled() => return,
        }
        shutdown.cancel();
    }))
}

#[cfg(not(unix))]
pub fn listen_for_shutdown(shutdown: CancellationToken) -> Result<JoinHandle<()>> {
    Ok(tokio::spawn(async move {
        tokio::select! {
            res = tokio::signal::ctrl_c() => {
                if res.is_ok() {
                    info!("Received Ctrl+C, shutting down...");
                }
            }
            _ = shutdown.cancelled() => return,
        }
        shutdown.cancel();
    }))
}

/// Ask the process `pid` to terminate gracefully
#[cfg(unix)]
pub fn send_terminate(pid: u32) -> Result<()> {
    let raw = libc::pid_t::try_from(pid)
        .ok()
        .filter(|p| *p > 0)
        .ok_or_else(|| LifecycleError::SignalDeliveryFailed {
            pid,
            reason: "not a valid process id".to_string(),
        })?;

    // SAFETY: plain kill(2) on a single positive PID.
    let rc = unsafe { libc::kill(raw, libc::SIGTERM) };
    if rc != 0 {
        return Err(LifecycleError::SignalDeliveryFailed {
            pid,
            reason: std::io::Error::last_os_error().to_string(),
        });
    }
    Ok(())
}

#[cfg(not(unix))]
pub fn send_terminate(pid: u32) -> Result<()> {
    Err(LifecycleError::SignalDeliveryFailed {
        pid,
        reason: "signals are only supported on unix".to_string(),
    })
}
