//! Error types for workflowd

use std::path::PathBuf;
use thiserror::Error;

/// Failure of a single call against the workflow service.
///
/// Always recoverable: the poll loop logs it and tries again next interval.
#[derive(Error, Debug)]
pub enum FetchError {
    #[error("Request to {url} failed: {reason}")]
    Transport { url: String, reason: String },

    #[error("HTTP error {status} for URL: {url}")]
    HttpStatus { url: String, status: u16 },

    #[error("Failed to decode response from {url}: {reason}")]
    Decode { url: String, reason: String },
}

/// Coarse classification of a [`FetchError`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FetchErrorKind {
    Transport,
    HttpStatus(u16),
    Decode,
}

impl FetchError {
    pub fn kind(&self) -> FetchErrorKind {
        match self {
            FetchError::Transport { .. } => FetchErrorKind::Transport,
            FetchError::HttpStatus { status, .. } => FetchErrorKind::HttpStatus(*status),
            FetchError::Decode { .. } => FetchErrorKind::Decode,
        }
    }

    pub(crate) fn transport(url: impl Into<String>, err: &reqwest::Error) -> Self {
        let reason = if err.is_timeout() {
            format!("timed out ({})", err)
        } else {
            err.to_string()
        };
        FetchError::Transport {
            url: url.into(),
            reason,
        }
    }
}

/// Errors raised while starting, running or stopping the daemon process.
///
/// These are fatal to the command that raised them.
#[derive(Error, Debug)]
pub enum LifecycleError {
    #[error("Failed to detach daemon process: {0}")]
    DetachFailed(String),

    #[error("Failed to write PID file {}: {reason}", path.display())]
    PidFileWriteFailed { path: PathBuf, reason: String },

    #[error("Failed to read PID file {}: {reason}", path.display())]
    PidFileReadFailed { path: PathBuf, reason: String },

    #[error("Failed to signal daemon (pid {pid}): {reason}")]
    SignalDeliveryFailed { pid: u32, reason: String },

    #[error("Daemon is already running (pid {pid}, PID file {})", path.display())]
    StaleInstance { pid: u32, path: PathBuf },
}

/// Invalid or unloadable configuration.
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Failed to load configuration: {0}")]
    Load(#[from] Box<figment::Error>),

    #[error("Invalid configuration: {0}")]
    Invalid(String),
}

impl From<figment::Error> for ConfigError {
    fn from(err: figment::Error) -> Self {
        ConfigError::Load(Box::new(err))
    }
}

pub type FetchResult<T> = std::result::Result<T, FetchError>;

pub type Result<T> = std::result::Result<T, LifecycleError>;
