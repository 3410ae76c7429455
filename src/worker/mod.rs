//! Worker module for polling and dispatching workflow tasks
//!
//! This module provides:
//! - PollRunner: Main loop that polls the task source
//! - TaskProcessor: Hook invoked for each received task
//! - PollConfig: Configuration for the daemon

pub mod config;
pub mod processor;
pub mod task_runner;

pub use config::PollConfig;
pub use processor::{LoggingProcessor, TaskProcessor};
pub use task_runner::{PollOutcome, PollRunner};
