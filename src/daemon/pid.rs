//! PID file handling
//!
//! The running daemon holds an exclusive advisory lock on its PID file for
//! its whole lifetime. A PID file whose lock nobody holds is stale, no
//! matter what the PID inside it currently belongs to.

use crate::error::{LifecycleError, Result};
use fs2::FileExt;
use std::fs::{File, OpenOptions};
use std::io::{self, Read, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};
use std::time::Duration;

// A probe holds its shared lock for a moment only; a daemon holds the
// exclusive lock for its lifetime.
const LOCK_ATTEMPTS: u32 = 5;
const LOCK_RETRY_DELAY: Duration = Duration::from_millis(25);

/// What a PID file tells us about the daemon
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PidStatus {
    /// No PID file
    Missing,
    /// PID file left behind by a process that no longer holds it
    Stale { pid: Option<u32> },
    /// A live daemon holds the PID file
    Running { pid: u32 },
}

/// PID file owned by the running daemon
#[derive(Debug)]
pub struct PidFile {
    path: PathBuf,
    file: File,
    pid: u32,
}

impl PidFile {
    /// Lock the PID file at `path` and record the current process in it.
    ///
    /// Fails with [`LifecycleError::StaleInstance`] when another live daemon
    /// holds the file. A stale file is reclaimed.
    pub fn acquire(path: &Path) -> Result<Self> {
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent).map_err(|e| write_failed(path, e))?;
        }

        // A stopping daemon may unlink the file between our open and lock.
        for _ in 0..3 {
            let mut file = OpenOptions::new()
                .read(true)
                .write(true)
                .create(true)
                .truncate(false)
                .open(path)
                .map_err(|e| write_failed(path, e))?;

            match lock_exclusive(&file) {
                Ok(()) => {}
                Err(e) if is_contended(&e) => {
                    let pid = read_from(&mut file).ok().flatten().unwrap_or(0);
                    return Err(LifecycleError::StaleInstance {
                        pid,
                        path: path.to_path_buf(),
                    });
                }
                Err(e) => return Err(write_failed(path, e)),
            }

            if !is_same_file(&file, path) {
                continue;
            }

            let pid = std::process::id();
            file.set_len(0)
                .and_then(|_| file.seek(SeekFrom::Start(0)))
                .and_then(|_| writeln!(file, "{}", pid))
                .and_then(|_| file.sync_all())
                .map_err(|e| write_failed(path, e))?;

            return Ok(Self {
                path: path.to_path_buf(),
                file,
                pid,
            });
        }

        Err(LifecycleError::PidFileWriteFailed {
            path: path.to_path_buf(),
            reason: "PID file kept being replaced while locking it".to_string(),
        })
    }

    pub fn pid(&self) -> u32 {
        self.pid
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Remove the PID file, then drop the lock
    pub fn release(self) -> io::Result<()> {
        let removed = std::fs::remove_file(&self.path);
        drop(self.file);
        match removed {
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(()),
            other => other,
        }
    }
}

/// Inspect the PID file at `path` without modifying it
pub fn probe(path: &Path) -> Result<PidStatus> {
    let mut file = match File::open(path) {
        Ok(f) => f,
        Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(PidStatus::Missing),
        Err(e) => return Err(read_failed(path, e.to_string())),
    };

    let held = match FileExt::try_lock_shared(&file) {
        Ok(()) => {
            let _ = FileExt::unlock(&file);
            false
        }
        Err(e) if is_contended(&e) => true,
        Err(e) => return Err(read_failed(path, e.to_string())),
    };

    let pid = read_from(&mut file).map_err(|e| read_failed(path, e.to_string()))?;

    match (held, pid) {
        (true, Some(pid)) => Ok(PidStatus::Running { pid }),
        (true, None) => Err(read_failed(
            path,
            "PID file is locked but holds no valid PID".to_string(),
        )),
        (false, pid) => Ok(PidStatus::Stale { pid }),
    }
}

/// Parse a PID file body: decimal PID, optional trailing newline
pub fn parse_pid(contents: &str) -> Option<u32> {
    let pid: u32 = contents.trim().parse().ok()?;
    // 0 and values beyond pid_t would address process groups in kill(2)
    if pid == 0 || pid > i32::MAX as u32 {
        return None;
    }
    Some(pid)
}

fn read_from(file: &mut File) -> io::Result<Option<u32>> {
    let mut contents = String::new();
    file.seek(SeekFrom::Start(0))?;
    file.read_to_string(&mut contents)?;
    Ok(parse_pid(&contents))
}

/// Exclusive lock, retried briefly while contended
fn lock_exclusive(file: &File) -> io::Result<()> {
    let mut attempt = 1;
    loop {
        match FileExt::try_lock_exclusive(file) {
            Err(e) if is_contended(&e) && attempt < LOCK_ATTEMPTS => {
                attempt += 1;
                std::thread::sleep(LOCK_RETRY_DELAY);
            }
            other => return other,
        }
    }
}

fn is_contended(err: &io::Error) -> bool {
    err.kind() == io::ErrorKind::WouldBlock
        || err.raw_os_error() == fs2::lock_contended_error().raw_os_error()
}

#[cfg(unix)]
fn is_same_file(file: &File, path: &Path) -> bool {
    use std::os::unix::fs::MetadataExt;
    match (file.metadata(), std::fs::metadata(path)) {
        (Ok(a), Ok(b)) => a.dev() == b.dev() && a.ino() == b.ino(),
        _ => false,
    }
}

#[cfg(not(unix))]
fn is_same_file(_file: &File, path: &Path) -> bool {
    path.exists()
}

fn write_failed(path: &Path, err: io::Error) -> LifecycleError {
    LifecycleError::PidFileWriteFailed {
        path: path.to_path_buf(),
        reason: err.to_string(),
    }
}

fn read_failed(path: &Path, reason: String) -> LifecycleError {
    LifecycleError::PidFileReadFailed {
        path: path.to_path_buf(),
        reason,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn parse_pid_valid() {
        assert_eq!(parse_pid("12345\n"), Some(12345));
        assert_eq!(parse_pid("  77  "), Some(77));
    }

    #[test]
    fn parse_pid_rejects_group_addresses() {
        assert_eq!(parse_pid("0"), None);
        assert_eq!(parse_pid("4294967295"), None);
        assert_eq!(parse_pid("-1"), None);
    }

    #[test]
    fn parse_pid_rejects_garbage() {
        assert_eq!(parse_pid(""), None);
        assert_eq!(parse_pid("abc"), None);
    }

    #[test]
    fn acquire_writes_pid_with_newline() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("wf.pid");

        let pid_file = PidFile::acquire(&path).unwrap();

        let contents = std::fs::read_to_string(&path).unwrap();
        assert_eq!(contents, format!("{}\n", std::process::id()));
        assert_eq!(pid_file.pid(), std::process::id());
    }

    #[test]
    fn acquire_creates_parent_dirs() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("run/nested/wf.pid");

        let pid_file = PidFile::acquire(&path).unwrap();
        assert!(path.exists());
        pid_file.release().unwrap();
    }

    #[test]
    fn probe_missing() {
        let tmp = TempDir::new().unwrap();
        assert_eq!(
            probe(&tmp.path().join("none.pid")).unwrap(),
            PidStatus::Missing
        );
    }

    #[test]
    fn probe_reports_held_file_as_running() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("wf.pid");
        let _pid_file = PidFile::acquire(&path).unwrap();

        assert_eq!(
            probe(&path).unwrap(),
            PidStatus::Running {
                pid: std::process::id()
            }
        );
    }

    #[test]
    fn second_acquire_is_rejected_as_stale_instance() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("wf.pid");
        let _first = PidFile::acquire(&path).unwrap();

        match PidFile::acquire(&path) {
            Err(LifecycleError::StaleInstance { pid, .. }) => {
                assert_eq!(pid, std::process::id())
            }
            other => panic!("expected StaleInstance, got {:?}", other),
        }
        // the holder's PID is untouched
        assert_eq!(
            std::fs::read_to_string(&path).unwrap(),
            format!("{}\n", std::process::id())
        );
    }

    #[test]
    fn unlocked_file_is_stale_and_reclaimed() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("wf.pid");
        std::fs::write(&path, "999999\n").unwrap();

        assert_eq!(
            probe(&path).unwrap(),
            PidStatus::Stale { pid: Some(999999) }
        );

        let pid_file = PidFile::acquire(&path).unwrap();
        assert_eq!(
            std::fs::read_to_string(&path).unwrap(),
            format!("{}\n", pid_file.pid())
        );
    }

    #[test]
    fn momentary_shared_lock_does_not_block_acquire() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("wf.pid");
        std::fs::write(&path, "424242\n").unwrap();

        let reader = File::open(&path).unwrap();
        FileExt::try_lock_shared(&reader).unwrap();
        let unlocker = std::thread::spawn(move || {
            std::thread::sleep(Duration::from_millis(30));
            FileExt::unlock(&reader).unwrap();
        });

        let pid_file = PidFile::acquire(&path).unwrap();
        unlocker.join().unwrap();

        assert_eq!(
            std::fs::read_to_string(&path).unwrap(),
            format!("{}\n", pid_file.pid())
        );
    }

    #[test]
    fn malformed_unlocked_file_is_stale() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("wf.pid");
        std::fs::write(&path, "not-a-pid").unwrap();

        assert_eq!(probe(&path).unwrap(), PidStatus::Stale { pid: None });
    }

    #[test]
    fn release_removes_file_and_unlocks() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("wf.pid");
        let pid_file = PidFile::acquire(&path).unwrap();

        pid_file.release().unwrap();

        assert!(!path.exists());
        assert_eq!(probe(&path).unwrap(), PidStatus::Missing);
        // and the path can be claimed again
        PidFile::acquire(&path).unwrap().release().unwrap();
    }
}
