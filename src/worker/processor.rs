//! Processing hook invoked for every task a poll returns

use crate::models::Task;
use async_trait::async_trait;
use tracing::info;

/// Handles one task of a poll cycle.
///
/// Tasks are dispatched sequentially; a failing task is logged and the
/// runner moves on to the next one.
#[async_trait]
pub trait TaskProcessor: Send + Sync {
    async fn process(&self, task: &Task) -> anyhow::Result<()>;
}

/// Default processor: records the task in the log and nothing else
#[derive(Debug, Default, Clone, Copy)]
pub struct LoggingProcessor;

#[async_trait]
impl TaskProcessor for LoggingProcessor {
    async fn process(&self, task: &Task) -> anyhow::Result<()> {
        info!(
            task_id = task.task_id,
            workflow_task_id = ?task.workflow_task_id,
            status = %task.status,
            priority = task.priority,
            "Processing task {}",
            task.task_id
        );
        Ok(())
    }
}
