//! Advisory file locking for the file backend.
//!
//! A lock is a marker file next to the entry file, created with the
//! filesystem's atomic create-new operation so exactly one contender wins.
//! Losers poll until the marker disappears or the timeout elapses. The
//! marker is removed on drop, so a lock cannot outlive its guard within a
//! healthy process; a crashed holder leaves a stale marker behind, which
//! operators clear by deleting the `.lock` file.

use std::fs::OpenOptions;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};

use memoir_core::{CacheError, CacheResult};

const POLL_INTERVAL: Duration = Duration::from_millis(100);
const LOCK_SUFFIX: &str = ".lock";

/// RAII guard over an advisory file lock.
///
/// Held for the duration of one read or write of the guarded file;
/// releasing is dropping.
#[derive(Debug)]
pub struct FileLock {
    marker_path: PathBuf,
}

impl FileLock {
    /// Acquire the lock guarding `target`, waiting up to `timeout`.
    ///
    /// Fails with [`CacheError::LockTimeout`] when the marker is still
    /// held at the deadline. The timeout error is recoverable: callers
    /// may retry the whole operation.
    pub fn acquire(target: &Path, timeout: Duration) -> CacheResult<Self> {
        let marker_path = Self::marker_path(target);
        let started = Instant::now();

        loop {
            match OpenOptions::new()
                .write(true)
                .create_new(true)
                .open(&marker_path)
            {
                Ok(_) => {
                    return Ok(Self { marker_path });
                }
                Err(err) if err.kind() == ErrorKind::AlreadyExists => {
                    if started.elapsed() >= timeout {
                        return Err(CacheError::LockTimeout {
                            path: target.to_path_buf(),
                            timeout,
                        });
                    }
                    std::thread::sleep(POLL_INTERVAL);
                }
                Err(err) => return Err(err.into()),
            }
        }
    }

    /// Path of the marker file guarding `target`.
    pub fn marker_path(target: &Path) -> PathBuf {
        let mut name = target
            .file_name()
            .map(|n| n.to_os_string())
            .unwrap_or_default();
        name.push(LOCK_SUFFIX);
        target.with_file_name(name)
    }
}

impl Drop for FileLock {
    fn drop(&mut self) {
        // Best effort; a failed removal behaves like a stale marker.
        let _ = std::fs::remove_file(&self.marker_path);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_acquire_and_release() {
        let dir = tempfile::tempdir().unwrap();
        let target = dir.path().join("cache_fetch_a1b2c3d4e5.json");

        let lock = FileLock::acquire(&target, Duration::from_secs(1)).unwrap();
        assert!(FileLock::marker_path(&target).exists());
        drop(lock);
        assert!(!FileLock::marker_path(&target).exists());
    }

    #[test]
    fn test_contention_times_out() {
        let dir = tempfile::tempdir().unwrap();
        let target = dir.path().join("cache_fetch_a1b2c3d4e5.json");

        let _held = FileLock::acquire(&target, Duration::from_secs(1)).unwrap();
        let err = FileLock::acquire(&target, Duration::from_millis(250)).unwrap_err();
        match err {
            CacheError::LockTimeout { path, timeout } => {
                assert_eq!(path, target);
                assert_eq!(timeout, Duration::from_millis(250));
            }
            other => panic!("expected LockTimeout, got {other:?}"),
        }
    }

    #[test]
    fn test_reacquire_after_release() {
        let dir = tempfile::tempdir().unwrap();
        let target = dir.path().join("cache_fetch_a1b2c3d4e5.json");

        drop(FileLock::acquire(&target, Duration::from_secs(1)).unwrap());
        FileLock::acquire(&target, Duration::from_secs(1)).unwrap();
    }

    #[test]
    fn test_waits_for_holder_to_release() {
        let dir = tempfile::tempdir().unwrap();
        let target = dir.path().join("cache_fetch_a1b2c3d4e5.json");

        let held = FileLock::acquire(&target, Duration::from_secs(1)).unwrap();
        let waiter = {
            let target = target.clone();
            std::thread::spawn(move || FileLock::acquire(&target, Duration::from_secs(5)))
        };
        std::thread::sleep(Duration::from_millis(200));
        drop(held);
        waiter.join().unwrap().unwrap();
    }
}
