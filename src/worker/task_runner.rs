//! Poll runner - main daemon loop

use crate::error::FetchError;
use crate::task_source::TaskSource;
use crate::worker::{PollConfig, TaskProcessor};
use std::sync::Arc;
use tokio::time::{sleep, Duration};
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

/// Result of a single poll cycle
#[derive(Debug)]
pub enum PollOutcome {
    /// Tasks were received and handed to the processor
    Dispatched { received: usize, failed: usize },
    /// The service had nothing for us
    Empty,
    /// The fetch failed; the loop will try again
    Failed(FetchError),
}

/// Polls the task source and dispatches tasks until shutdown is requested
pub struct PollRunner {
    source: Arc<dyn TaskSource>,
    processor: Arc<dyn TaskProcessor>,
    config: PollConfig,
    shutdown: CancellationToken,
}

impl PollRunner {
    /// Create a new poll runner
    pub fn new(
        source: Arc<dyn TaskSource>,
        processor: Arc<dyn TaskProcessor>,
        config: PollConfig,
    ) -> Self {
        Self {
            source,
            processor,
            config,
            shutdown: CancellationToken::new(),
        }
    }

    /// Use an externally owned shutdown token
    pub fn with_shutdown(mut self, shutdown: CancellationToken) -> Self {
        self.shutdown = shutdown;
        self
    }

    /// Get a handle to signal shutdown
    pub fn shutdown_handle(&self) -> CancellationToken {
        self.shutdown.clone()
    }

    /// Main poll loop
    ///
    /// Shutdown is observed at the top of each cycle and during the sleep;
    /// an in-flight fetch or dispatch is allowed to finish.
    pub async fn run(&self) {
        info!("Starting poll loop against {}", self.config.base_url);
        info!("Poll interval: {:?}", self.config.poll_interval());
        if let Some(max) = self.config.max_backoff() {
            info!("Backoff on failure enabled, capped at {:?}", max);
        }

        let mut consecutive_failures: u32 = 0;

        loop {
            if self.shutdown.is_cancelled() {
                break;
            }

            match self.poll_once().await {
                PollOutcome::Dispatched { received, failed } => {
                    consecutive_failures = 0;
                    if failed > 0 {
                        warn!("{} of {} task(s) failed processing", failed, received);
                    } else {
                        info!("Processed {} task(s)", received);
                    }
                }
                PollOutcome::Empty => {
                    consecutive_failures = 0;
                }
                PollOutcome::Failed(e) => {
                    consecutive_failures = consecutive_failures.saturating_add(1);
                    warn!(
                        kind = ?e.kind(),
                        failures = consecutive_failures,
                        "Fetch failed: {}",
                        e
                    );
                }
            }

            let delay = self.next_delay(consecutive_failures);
            tokio::select! {
                _ = self.shutdown.cancelled() => break,
                _ = sleep(delay) => {}
            }
        }

        info!("Poll loop stopped");
    }

    /// Run a single fetch and dispatch cycle
    pub async fn poll_once(&self) -> PollOutcome {
        let tasks = match self
            .source
            .list_workflow_tasks(&self.config.task_status)
            .await
        {
            Ok(tasks) => tasks,
            Err(e) => return PollOutcome::Failed(e),
        };

        if tasks.is_empty() {
            info!("No {} tasks found", self.config.task_status.to_lowercase());
            return PollOutcome::Empty;
        }

        info!("Received {} {} task(s)", tasks.len(), self.config.task_status.to_lowercase());

        let mut failed = 0;
        for task in &tasks {
            if let Err(e) = self.processor.process(task).await {
                error!("Task {} failed: {:#}", task.task_id, e);
                failed += 1;
            }
        }

        PollOutcome::Dispatched {
            received: tasks.len(),
            failed,
        }
    }

    /// Delay before the next cycle
    ///
    /// Fixed interval unless backoff is configured, in which case the
    /// interval doubles per consecutive failure up to the cap.
    fn next_delay(&self, consecutive_failures: u32) -> Duration {
        let interval = self.config.poll_interval();
        match self.config.max_backoff() {
            Some(max) if consecutive_failures > 0 => {
                let factor = 2u32.saturating_pow(consecutive_failures - 1);
                std::cmp::max(std::cmp::min(interval.saturating_mul(factor), max), interval)
            }
            _ => interval,
        }
    }
}
