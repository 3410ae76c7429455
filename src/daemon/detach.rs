//! Run the daemon detached from the controlling terminal
//!
//! Forking a process that already runs a tokio runtime is unsound, so the
//! daemon is started by re-executing the current binary with the hidden
//! `run` subcommand in a new session, with `/` as working directory and
//! all standard streams on the null device.

use crate::daemon::pid::{self, PidStatus};
use crate::error::{LifecycleError, Result};
use crate::worker::config::{PollConfig, CONFIG_PATH_ENV};
use std::process::Stdio;
use std::time::{Duration, Instant};
use tokio::process::{Child, Command};
use tracing::debug;

/// How long `start` waits for the detached daemon to claim its PID file
pub const HANDOFF_TIMEOUT: Duration = Duration::from_secs(5);

const HANDOFF_POLL: Duration = Duration::from_millis(50);

/// Spawn the detached daemon process.
///
/// The fully resolved `config` is handed over through `WORKFLOWD_*`
/// variables so the child needs no config file of its own.
#[cfg(unix)]
pub fn spawn_detached(config: &PollConfig) -> Result<Child> {
    let exe = std::env::current_exe()
        .map_err(|e| LifecycleError::DetachFailed(format!("cannot locate executable: {}", e)))?;

    let mut command = Command::new(exe);
    command
        .arg("run")
        .env_remove(CONFIG_PATH_ENV)
        .envs(config.to_env())
        .current_dir("/")
        .stdin(Stdio::null())
        .stdout(Stdio::null())
        .stderr(Stdio::null());

    // SAFETY: setsid is async-signal-safe and touches no memory of the parent.
    unsafe {
        command.pre_exec(|| {
            if libc::setsid() == -1 {
                return Err(std::io::Error::last_os_error());
            }
            Ok(())
        });
    }

    command
        .spawn()
        .map_err(|e| LifecycleError::DetachFailed(format!("failed to spawn daemon: {}", e)))
}

#[cfg(not(unix))]
pub fn spawn_detached(_config: &PollConfig) -> Result<Child> {
    Err(LifecycleError::DetachFailed(
        "detaching is only supported on unix; run `workflowd run` under a service manager"
            .to_string(),
    ))
}

/// Wait until the detached child holds the PID file and return its PID.
///
/// Fails if the child exits first or does not claim the file within
/// [`HANDOFF_TIMEOUT`].
pub async fn wait_for_handoff(child: &mut Child, config: &PollConfig) -> Result<u32> {
    let child_pid = child.id();
    let deadline = Instant::now() + HANDOFF_TIMEOUT;

    loop {
        match child.try_wait() {
            Ok(Some(status)) => {
                return Err(LifecycleError::DetachFailed(format!(
                    "daemon exited during startup ({}); see {}",
                    status,
                    config.log_file_path.display()
                )));
            }
            Ok(None) => {}
            Err(e) => {
                return Err(LifecycleError::DetachFailed(format!(
                    "cannot query daemon process: {}",
                    e
                )))
            }
        }

        match pid::probe(&config.pid_file_path) {
            Ok(PidStatus::Running { pid }) if Some(pid) == child_pid => return Ok(pid),
            Ok(status) => debug!("Waiting for daemon to claim PID file ({:?})", status),
            Err(e) => debug!("Waiting for daemon to claim PID file ({})", e),
        }

        if Instant::now() >= deadline {
            return Err(LifecycleError::PidFileWriteFailed {
                path: config.pid_file_path.clone(),
                reason: format!(
                    "daemon did not record its PID within {:?}",
                    HANDOFF_TIMEOUT
                ),
            });
        }
        tokio::time::sleep(HANDOFF_POLL).await;
    }
}
