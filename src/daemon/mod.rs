//! Daemon process lifecycle
//!
//! `Starting -> Running -> Stopping -> Stopped`:
//! - [`start`] detaches a child running [`run`] and waits until it owns the PID file
//! - [`run`] installs logging and signal listeners, claims the PID file and polls
//! - a termination signal cancels the shutdown token; the loop exits at its
//!   next checkpoint and [`DaemonState::finish`] removes the PID file
//! - [`stop`] signals the process holding the PID file

pub mod detach;
pub mod log;
pub mod pid;
pub mod signals;

use crate::error::{LifecycleError, Result};
use crate::task_source::{HttpTaskSource, TaskSource};
use crate::worker::{LoggingProcessor, PollConfig, PollRunner, TaskProcessor};
use std::path::Path;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};
use tracing_appender::non_blocking::WorkerGuard;

use self::pid::{PidFile, PidStatus};

/// State owned by the daemon's main routine for its whole lifetime
pub struct DaemonState {
    pid_file: PidFile,
    shutdown: CancellationToken,
    // Dropped last so shutdown events still reach the log file
    log_guard: Option<WorkerGuard>,
}

impl DaemonState {
    /// Claim the PID file and enter the running state
    pub fn acquire(config: &PollConfig, shutdown: CancellationToken) -> Result<Self> {
        let pid_file = PidFile::acquire(&config.pid_file_path)?;
        Ok(Self {
            pid_file,
            shutdown,
            log_guard: None,
        })
    }

    /// Keep the log writer alive until [`finish`](Self::finish)
    pub fn with_log_guard(mut self, guard: WorkerGuard) -> Self {
        self.log_guard = Some(guard);
        self
    }

    pub fn pid(&self) -> u32 {
        self.pid_file.pid()
    }

    /// False once shutdown has been requested
    pub fn is_running(&self) -> bool {
        !self.shutdown.is_cancelled()
    }

    pub fn shutdown_handle(&self) -> CancellationToken {
        self.shutdown.clone()
    }

    /// Drive the poll loop until shutdown is requested
    pub async fn poll(
        &self,
        config: &PollConfig,
        source: Arc<dyn TaskSource>,
        processor: Arc<dyn TaskProcessor>,
    ) {
        PollRunner::new(source, processor, config.clone())
            .with_shutdown(self.shutdown_handle())
            .run()
            .await;
    }

    /// Log `err`, give up the PID file and hand `err` back
    fn abort(self, err: LifecycleError) -> LifecycleError {
        error!("{}", err);
        let _ = self.finish();
        err
    }

    /// Remove the PID file and flush the log
    pub fn finish(self) -> Result<()> {
        let pid = self.pid();
        let path = self.pid_file.path().to_path_buf();
        let released = self.pid_file.release();
        match &released {
            Ok(()) => info!("workflowd stopped (pid {})", pid),
            Err(e) => error!("Failed to remove PID file {}: {}", path.display(), e),
        }
        drop(self.log_guard);
        released.map_err(|e| LifecycleError::PidFileWriteFailed {
            path,
            reason: e.to_string(),
        })
    }
}

/// Start the daemon in the background and return its PID.
///
/// Refuses to start while a live instance holds the PID file.
pub async fn start(config: &PollConfig) -> Result<u32> {
    if let PidStatus::Running { pid } = pid::probe(&config.pid_file_path)? {
        return Err(LifecycleError::StaleInstance {
            pid,
            path: config.pid_file_path.clone(),
        });
    }

    let mut child = detach::spawn_detached(config)?;
    detach::wait_for_handoff(&mut child, config).await
}

/// Foreground body of the daemon (`workflowd run`)
///
/// The PID file is claimed first, so a rejected second instance leaves the
/// running daemon's logs alone.
pub async fn run(config: PollConfig, echo_stderr: bool) -> Result<()> {
    let shutdown = CancellationToken::new();
    let state = DaemonState::acquire(&config, shutdown.clone())?;

    let state = match log::init_daemon_logging(&config, echo_stderr) {
        Ok(guard) => state.with_log_guard(guard),
        Err(e) => {
            let _ = state.finish();
            return Err(e);
        }
    };
    info!(
        "workflowd started (pid {}, PID file {})",
        state.pid(),
        config.pid_file_path.display()
    );

    if let Some(layout) = log::LogFileLayout::from_path(&config.log_file_path) {
        let pruned = log::prune_rotated_logs(&layout, config.log_retention_count);
        if pruned > 0 {
            info!("Pruned {} old log file(s)", pruned);
        }
    }

    let source = match HttpTaskSource::new(config.task_source()) {
        Ok(source) => source,
        Err(e) => return Err(state.abort(LifecycleError::DetachFailed(e.to_string()))),
    };

    let listener = match signals::listen_for_shutdown(shutdown) {
        Ok(listener) => listener,
        Err(e) => return Err(state.abort(e)),
    };

    state
        .poll(&config, Arc::new(source), Arc::new(LoggingProcessor))
        .await;

    // wakes the listener if the loop ended for another reason
    state.shutdown_handle().cancel();
    if let Err(e) = listener.await {
        warn!("Signal listener ended abnormally: {}", e);
    }

    state.finish()
}

/// Signal the running daemon to stop and return its PID
pub fn stop(pid_file_path: &Path) -> Result<u32> {
    match pid::probe(pid_file_path)? {
        PidStatus::Missing => Err(LifecycleError::PidFileReadFailed {
            path: pid_file_path.to_path_buf(),
            reason: "no such file (is workflowd running?)".to_string(),
        }),
        PidStatus::Stale { pid: Some(pid) } => Err(LifecycleError::SignalDeliveryFailed {
            pid,
            reason: "no running workflowd holds the PID file (stale PID file)".to_string(),
        }),
        PidStatus::Stale { pid: None } => Err(LifecycleError::PidFileReadFailed {
            path: pid_file_path.to_path_buf(),
            reason: "PID file is empty or malformed".to_string(),
        }),
        PidStatus::Running { pid } => {
            signals::send_terminate(pid)?;
            info!("Sent SIGTERM to workflowd (pid {})", pid);
            Ok(pid)
        }
    }
}
