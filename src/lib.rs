//! workflowd - a daemon that polls a workflow service for waiting tasks
//!
//! The daemon periodically asks the workflow service for tasks in a given
//! status (`Waiting` by default) and hands every task to a processing hook.
//! Fetch failures are logged and retried on the next cycle; the process
//! itself is managed through a locked PID file and termination signals.
//!
//! - [`task_source`]: HTTP client for the workflow service
//! - [`worker`]: configuration, poll loop and processing hook
//! - [`daemon`]: detaching, PID file, signals and log rotation

pub mod daemon;
pub mod error;
pub mod models;
pub mod task_source;
pub mod worker;

pub use error::{ConfigError, FetchError, FetchErrorKind, LifecycleError, Result};
pub use models::{Task, TaskDefinition, TaskStatus};
pub use task_source::{HttpTaskSource, TaskSource, TaskSourceConfig};
pub use worker::{LoggingProcessor, PollConfig, PollOutcome, PollRunner, TaskProcessor};
