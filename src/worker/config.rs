//! Poll daemon configuration
//!
//! Resolved once at start from, in increasing precedence:
//! built-in defaults, an optional TOML file, and `WORKFLOWD_*` environment
//! variables. Immutable afterwards.

use crate::error::ConfigError;
use crate::task_source::TaskSourceConfig;
use figment::providers::{Env, Format, Serialized, Toml};
use figment::Figment;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Prefix of the environment variables that override config keys
pub const ENV_PREFIX: &str = "WORKFLOWD_";

/// Environment variable naming a TOML config file
pub const CONFIG_PATH_ENV: &str = "WORKFLOWD_CONFIG";

/// Poll daemon configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PollConfig {
    /// Base URL of the workflow service
    pub base_url: String,

    /// Wait between two polls
    pub poll_interval_seconds: u64,

    /// Where the running daemon records its PID
    pub pid_file_path: PathBuf,

    /// Active log file; rotated copies are dated siblings
    pub log_file_path: PathBuf,

    /// Number of rotated log files kept besides the active one
    pub log_retention_count: usize,

    /// Per-request timeout against the workflow service
    pub request_timeout_seconds: u64,

    /// TCP connect timeout against the workflow service
    pub connect_timeout_seconds: u64,

    /// Cap for exponential backoff after consecutive fetch failures.
    /// `None` keeps the fixed poll interval.
    pub max_backoff_seconds: Option<u64>,

    /// Status whose tasks the daemon polls for
    pub task_status: String,
}

impl Default for PollConfig {
    fn default() -> Self {
        Self {
            base_url: "http://localhost:8000".to_string(),
            poll_interval_seconds: 10,
            pid_file_path: PathBuf::from("/tmp/workflowd.pid"),
            log_file_path: PathBuf::from("/tmp/workflowd.log"),
            log_retention_count: 10,
            request_timeout_seconds: 10,
            connect_timeout_seconds: 5,
            max_backoff_seconds: None,
            task_status: "Waiting".to_string(),
        }
    }
}

impl PollConfig {
    /// Create a new config builder
    pub fn builder() -> PollConfigBuilder {
        PollConfigBuilder::default()
    }

    /// Load defaults, then `config_file` (if any), then the environment
    pub fn load(config_file: Option<&Path>) -> Result<Self, ConfigError> {
        let mut figment = Figment::from(Serialized::defaults(PollConfig::default()));
        if let Some(path) = config_file {
            if !path.exists() {
                return Err(ConfigError::Invalid(format!(
                    "config file {} does not exist",
                    path.display()
                )));
            }
            figment = figment.merge(Toml::file(path));
        }
        let config: PollConfig = figment
            .merge(Env::prefixed(ENV_PREFIX).ignore(&["config"]))
            .extract()?;
        config.validate()?;
        Ok(config)
    }

    /// Reject values the daemon cannot run with
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.base_url.trim().is_empty() {
            return Err(ConfigError::Invalid("base_url must not be empty".to_string()));
        }
        if self.poll_interval_seconds == 0 {
            return Err(ConfigError::Invalid(
                "poll_interval_seconds must be at least 1".to_string(),
            ));
        }
        if self.log_retention_count == 0 {
            return Err(ConfigError::Invalid(
                "log_retention_count must be at least 1".to_string(),
            ));
        }
        if self.task_status.trim().is_empty() {
            return Err(ConfigError::Invalid("task_status must not be empty".to_string()));
        }
        if self.log_file_path.file_name().is_none() {
            return Err(ConfigError::Invalid(format!(
                "log_file_path {} has no file name",
                self.log_file_path.display()
            )));
        }
        if self.pid_file_path.file_name().is_none() {
            return Err(ConfigError::Invalid(format!(
                "pid_file_path {} has no file name",
                self.pid_file_path.display()
            )));
        }
        Ok(())
    }

    /// Make file paths absolute against `base`
    ///
    /// The detached daemon runs with `/` as working directory, so relative
    /// paths must be pinned before it is spawned.
    pub fn absolutize(mut self, base: &Path) -> Self {
        if self.pid_file_path.is_relative() {
            self.pid_file_path = base.join(&self.pid_file_path);
        }
        if self.log_file_path.is_relative() {
            self.log_file_path = base.join(&self.log_file_path);
        }
        self
    }

    /// Render as `WORKFLOWD_*` variables, the inverse of the env layer of [`load`](Self::load)
    pub fn to_env(&self) -> Vec<(String, String)> {
        let mut vars = vec![
            env_var("BASE_URL", self.base_url.clone()),
            env_var("POLL_INTERVAL_SECONDS", self.poll_interval_seconds.to_string()),
            env_var("PID_FILE_PATH", self.pid_file_path.display().to_string()),
            env_var("LOG_FILE_PATH", self.log_file_path.display().to_string()),
            env_var("LOG_RETENTION_COUNT", self.log_retention_count.to_string()),
            env_var("REQUEST_TIMEOUT_SECONDS", self.request_timeout_seconds.to_string()),
            env_var("CONNECT_TIMEOUT_SECONDS", self.connect_timeout_seconds.to_string()),
            env_var("TASK_STATUS", self.task_status.clone()),
        ];
        if let Some(max) = self.max_backoff_seconds {
            vars.push(env_var("MAX_BACKOFF_SECONDS", max.to_string()));
        }
        vars
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_secs(self.poll_interval_seconds)
    }

    pub fn max_backoff(&self) -> Option<Duration> {
        self.max_backoff_seconds.map(Duration::from_secs)
    }

    pub fn task_source(&self) -> TaskSourceConfig {
        TaskSourceConfig {
            base_url: self.base_url.clone(),
            connect_timeout: Duration::from_secs(self.connect_timeout_seconds),
            request_timeout: Duration::from_secs(self.request_timeout_seconds),
        }
    }
}

fn env_var(key: &str, value: String) -> (String, String) {
    (format!("{}{}", ENV_PREFIX, key), value)
}

/// Builder for PollConfig
#[derive(Default)]
pub struct PollConfigBuilder {
    config: PollConfig,
}

impl PollConfigBuilder {
    /// Set the service base URL
    pub fn base_url(mut self, url: &str) -> Self {
        self.config.base_url = url.to_string();
        self
    }

    /// Set poll interval in seconds
    pub fn poll_interval_secs(mut self, secs: u64) -> Self {
        self.config.poll_interval_seconds = secs;
        self
    }

    pub fn pid_file_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.config.pid_file_path = path.into();
        self
    }

    pub fn log_file_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.config.log_file_path = path.into();
        self
    }

    pub fn log_retention_count(mut self, count: usize) -> Self {
        self.config.log_retention_count = count;
        self
    }

    /// Set request timeout in seconds
    pub fn request_timeout_secs(mut self, secs: u64) -> Self {
        self.config.request_timeout_seconds = secs;
        self
    }

    /// Enable exponential backoff capped at `secs`
    pub fn max_backoff_secs(mut self, secs: u64) -> Self {
        self.config.max_backoff_seconds = Some(secs);
        self
    }

    pub fn task_status(mut self, status: &str) -> Self {
        self.config.task_status = status.to_string();
        self
    }

    /// Build the config
    pub fn build(self) -> PollConfig {
        self.config
    }
}
