//! Rotating log sink of the daemon
//!
//! `log_file_path = /tmp/workflowd.log` produces daily files named
//! `/tmp/workflowd.YYYY-MM-DD.log`. The active file plus
//! `log_retention_count` older ones are kept.

use crate::error::{LifecycleError, Result};
use crate::worker::PollConfig;
use chrono::NaiveDate;
use std::path::{Path, PathBuf};
use tracing::info;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_appender::rolling::{InitError, RollingFileAppender, Rotation};
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::EnvFilter;

const DEFAULT_DIRECTIVE: &str = "workflowd=info";

/// Directory and file name parts of the rotated log files
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LogFileLayout {
    pub dir: PathBuf,
    pub prefix: String,
    pub suffix: Option<String>,
}

impl LogFileLayout {
    /// Split `log_file_path` into directory, prefix and suffix
    pub fn from_path(path: &Path) -> Option<Self> {
        let dir = match path.parent() {
            Some(p) if !p.as_os_str().is_empty() => p.to_path_buf(),
            _ => PathBuf::from("."),
        };
        let prefix = path.file_stem()?.to_string_lossy().into_owned();
        let suffix = path
            .extension()
            .map(|ext| ext.to_string_lossy().into_owned());
        Some(Self {
            dir,
            prefix,
            suffix,
        })
    }

    /// Name of the file for `date`
    pub fn file_name(&self, date: NaiveDate) -> String {
        let date = date.format("%Y-%m-%d");
        match &self.suffix {
            Some(suffix) => format!("{}.{}.{}", self.prefix, date, suffix),
            None => format!("{}.{}", self.prefix, date),
        }
    }

    /// `"{prefix}.YYYY-MM-DD[.suffix]"` → date
    fn parse_date(&self, filename: &str) -> Option<NaiveDate> {
        let rest = filename.strip_prefix(&self.prefix)?.strip_prefix('.')?;
        let date_part = match &self.suffix {
            Some(suffix) => rest.strip_suffix(suffix.as_str())?.strip_suffix('.')?,
            None => rest,
        };
        // YYYY-MM-DD = 10 chars
        if date_part.len() != 10 {
            return None;
        }
        NaiveDate::parse_from_str(date_part, "%Y-%m-%d").ok()
    }
}

/// Install the global subscriber for the daemon process.
///
/// Events go to the rotating file; with `echo_stderr` they are also
/// mirrored to stderr (the null device once detached). The returned guard
/// must live until exit to flush the non-blocking writer.
pub fn init_daemon_logging(config: &PollConfig, echo_stderr: bool) -> Result<WorkerGuard> {
    let layout = LogFileLayout::from_path(&config.log_file_path).ok_or_else(|| {
        LifecycleError::DetachFailed(format!(
            "invalid log file path {}",
            config.log_file_path.display()
        ))
    })?;
    std::fs::create_dir_all(&layout.dir).map_err(|e| {
        LifecycleError::DetachFailed(format!(
            "failed to create log directory {}: {}",
            layout.dir.display(),
            e
        ))
    })?;

    let file_appender = rolling_appender(&layout, config.log_retention_count)
        .map_err(|e| LifecycleError::DetachFailed(format!("failed to open log file: {}", e)))?;

    let (non_blocking, guard) = tracing_appender::non_blocking(file_appender);

    tracing_subscriber::registry()
        .with(env_filter())
        .with(
            tracing_subscriber::fmt::layer()
                .with_ansi(false)
                .with_writer(non_blocking),
        )
        .with(echo_stderr.then(|| tracing_subscriber::fmt::layer().with_writer(std::io::stderr)))
        .try_init()
        .map_err(|e| LifecycleError::DetachFailed(format!("failed to install logger: {}", e)))?;

    Ok(guard)
}

/// Daily appender keeping the active file plus `retention_count` older ones.
///
/// Files beyond that are pruned, oldest first, when the appender is built
/// and at every rotation.
pub fn rolling_appender(
    layout: &LogFileLayout,
    retention_count: usize,
) -> std::result::Result<RollingFileAppender, InitError> {
    let mut builder = RollingFileAppender::builder()
        .rotation(Rotation::DAILY)
        .filename_prefix(&layout.prefix)
        .max_log_files(retention_count + 1);
    if let Some(suffix) = &layout.suffix {
        builder = builder.filename_suffix(suffix);
    }
    builder.build(&layout.dir)
}

/// Stderr-only logging for the short-lived control commands
pub fn init_cli_logging() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(env_filter())
        .with_writer(std::io::stderr)
        .with_target(false)
        .try_init();
}

fn env_filter() -> EnvFilter {
    EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(DEFAULT_DIRECTIVE))
}

/// Delete rotated log files beyond `retention_count`, oldest first.
///
/// Today's file is the active one and never counts against retention.
/// Returns the number of deleted files.
pub fn prune_rotated_logs(layout: &LogFileLayout, retention_count: usize) -> usize {
    // the appender names files by UTC date
    let today = chrono::Utc::now().date_naive();
    prune_rotated_logs_with_today(layout, retention_count, today)
}

fn prune_rotated_logs_with_today(
    layout: &LogFileLayout,
    retention_count: usize,
    today: NaiveDate,
) -> usize {
    let entries = match std::fs::read_dir(&layout.dir) {
        Ok(e) => e,
        Err(_) => return 0,
    };

    let mut historical: Vec<(NaiveDate, PathBuf)> = entries
        .filter_map(|entry| entry.ok())
        .filter_map(|entry| {
            let name = entry.file_name();
            let date = layout.parse_date(&name.to_string_lossy())?;
            (date < today).then(|| (date, entry.path()))
        })
        .collect();

    // newest first
    historical.sort_by(|a, b| b.0.cmp(&a.0));

    let mut deleted = 0;
    for (_, path) in historical.into_iter().skip(retention_count) {
        if std::fs::remove_file(&path).is_ok() {
            info!("Deleted old log: {}", path.display());
            deleted += 1;
        }
    }
    deleted
}
