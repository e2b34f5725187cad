//! Shared/exclusive file-based locks with timeout.
//!
//! One lock file per session (`metadata.json.lock`) serializes operations
//! across processes. Acquisition polls a non-blocking flock until success
//! or deadline. The guard releases on drop, so a lock acquired for an
//! operation cannot outlive it on any exit path, including unwinding.

use std::fs::{File, OpenOptions};
use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};

use fs2::FileExt;
use tracing::trace;

use crate::error::Error;

/// Default acquisition timeout.
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(10);

/// Interval between non-blocking acquisition attempts.
const POLL_INTERVAL: Duration = Duration::from_millis(100);

/// Lock mode.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LockMode {
    /// Any number of concurrent holders.
    Shared,
    /// Sole holder; excludes shared and exclusive alike.
    Exclusive,
}

/// A held file lock; released on drop.
#[derive(Debug)]
pub struct LockFile {
    file: Option<File>,
    path: PathBuf,
    mode: LockMode,
}

impl LockFile {
    /// Acquires a shared lock, polling until success or `timeout`.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Locked`] on timeout, or an I/O error when the lock
    /// file cannot be opened.
    pub fn acquire_shared(path: &Path, timeout: Duration) -> Result<Self, Error> {
        Self::acquire(path, timeout, LockMode::Shared)
    }

    /// Acquires an exclusive lock, polling until success or `timeout`.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Locked`] on timeout, or an I/O error when the lock
    /// file cannot be opened.
    pub fn acquire_exclusive(path: &Path, timeout: Duration) -> Result<Self, Error> {
        Self::acquire(path, timeout, LockMode::Exclusive)
    }

    fn acquire(path: &Path, timeout: Duration, mode: LockMode) -> Result<Self, Error> {
        let file = open_lock_file(path)?;

        let deadline = Instant::now() + timeout;
        loop {
            // Qualified calls: std's own `File::try_lock_*` methods would
            // otherwise shadow the fs2 trait on newer toolchains.
            let attempt = match mode {
                LockMode::Shared => FileExt::try_lock_shared(&file),
                LockMode::Exclusive => FileExt::try_lock_exclusive(&file),
            };
            match attempt {
                Ok(()) => {
                    trace!(path = %path.display(), ?mode, "lock acquired");
                    return Ok(Self {
                        file: Some(file),
                        path: path.to_path_buf(),
                        mode,
                    });
                }
                Err(err) if is_contended(&err) => {
                    if Instant::now() >= deadline {
                        return Err(Error::Locked {
                            path: path.to_path_buf(),
                        });
                    }
                    std::thread::sleep(POLL_INTERVAL);
                }
                Err(err) => {
                    return Err(Error::io(format!("locking {}", path.display()), err));
                }
            }
        }
    }

    /// The lock file path.
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// The held mode.
    #[must_use]
    pub const fn mode(&self) -> LockMode {
        self.mode
    }

    /// Releases the lock explicitly, reporting unlock failures.
    ///
    /// Dropping the guard releases too; this form exists for callers that
    /// need deterministic sequencing of the release.
    ///
    /// # Errors
    ///
    /// Returns an I/O error when the unlock fails.
    pub fn release(mut self) -> Result<(), Error> {
        if let Some(file) = self.file.take() {
            FileExt::unlock(&file)
                .map_err(|err| Error::io(format!("unlocking {}", self.path.display()), err))?;
        }
        Ok(())
    }
}

impl Drop for LockFile {
    fn drop(&mut self) {
        if let Some(file) = self.file.take() {
            let _ = FileExt::unlock(&file);
            trace!(path = %self.path.display(), "lock released");
        }
    }
}

fn open_lock_file(path: &Path) -> Result<File, Error> {
    let mut options = OpenOptions::new();
    options.read(true).write(true).create(true);
    #[cfg(unix)]
    {
        use std::os::unix::fs::OpenOptionsExt;
        options.mode(0o600);
    }
    options
        .open(path)
        .map_err(|err| Error::io(format!("opening lock file {}", path.display()), err))
}

fn is_contended(err: &std::io::Error) -> bool {
    err.kind() == std::io::ErrorKind::WouldBlock
        || err.raw_os_error() == fs2::lock_contended_error().raw_os_error()
}
