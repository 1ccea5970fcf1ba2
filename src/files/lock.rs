//! Single-instance lock for batch runs.
//!
//! Two batch runs over the same tree would race on renames and the ledger.
//! [`ProcessLock`] creates a lock file with `create_new` (atomic on every
//! platform we target) and writes the holder's PID into it. The file is
//! removed when the guard drops, which covers normal exit, `?` returns and
//! unwinding panics.

use crate::error::LockError;
use std::fs::OpenOptions;
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use tracing::{debug, warn};

#[derive(Debug)]
pub struct ProcessLock {
    path: PathBuf,
}

impl ProcessLock {
    /// Take the lock at `path`, failing if another holder exists.
    pub fn acquire(path: impl AsRef<Path>) -> Result<Self, LockError> {
        let path = path.as_ref().to_path_buf();

        let mut file = match OpenOptions::new().write(true).create_new(true).open(&path) {
            Ok(f) => f,
            Err(e) if e.kind() == io::ErrorKind::AlreadyExists => {
                let holder = std::fs::read_to_string(&path)
                    .ok()
                    .and_then(|s| s.trim().parse::<u32>().ok());
                return Err(LockError::AlreadyHeld { path, holder });
            }
            Err(source) => return Err(LockError::Io { path, source }),
        };

        let lock = Self { path };
        write!(file, "{}", std::process::id()).map_err(|source| LockError::Io {
            path: lock.path.clone(),
            source,
        })?;
        debug!("Acquired lock {}", lock.path.display());
        Ok(lock)
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl Drop for ProcessLock {
    fn drop(&mut self) {
        match std::fs::remove_file(&self.path) {
            Ok(()) => debug!("Released lock {}", self.path.display()),
            Err(e) => warn!("Failed to remove lock file {}: {}", self.path.display(), e),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn second_acquire_fails_with_holder_pid() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join(".docclass.lock");

        let _held = ProcessLock::acquire(&path).unwrap();
        match ProcessLock::acquire(&path) {
            Err(LockError::AlreadyHeld { holder, .. }) => {
                assert_eq!(holder, Some(std::process::id()))
            }
            other => panic!("expected AlreadyHeld, got {other:?}"),
        }
    }

    #[test]
    fn drop_releases_lock() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join(".docclass.lock");

        {
            let lock = ProcessLock::acquire(&path).unwrap();
            assert!(lock.path().exists());
        }
        assert!(!path.exists());
        assert!(ProcessLock::acquire(&path).is_ok());
    }

    #[test]
    fn released_on_panic() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join(".docclass.lock");
        let p = path.clone();

        let result = std::panic::catch_unwind(move || {
            let _lock = ProcessLock::acquire(&p).unwrap();
            panic!("batch blew up");
        });
        assert!(result.is_err());
        assert!(!path.exists());
    }

    #[test]
    fn missing_directory_is_io_error() {
        let dir = tempfile::tempdir().unwrap();
        let err = ProcessLock::acquire(dir.path().join("no/such/dir/lock")).unwrap_err();
        assert!(matches!(err, LockError::Io { .. }));
    }
}
