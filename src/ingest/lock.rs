//! Cross-process writer lock
//!
//! Hook invocations run as separate processes, so the in-process mutex alone
//! cannot stop two of them from interleaving read-modify-write cycles. An
//! advisory `flock` on a sibling lock file serializes them.

use super::IngestError;
use std::fs::{File, OpenOptions};
use std::path::Path;
use std::time::{Duration, Instant};

const RETRY_INTERVAL: Duration = Duration::from_millis(10);

/// Held while a notification is applied; released on drop
pub struct WriterLock {
    file: File,
}

impl Drop for WriterLock {
    fn drop(&mut self) {
        unlock(&self.file);
    }
}

/// Acquire the exclusive writer lock, polling until `timeout` elapses
pub fn acquire(lock_path: &Path, timeout: Duration) -> Result<WriterLock, IngestError> {
    if let Some(parent) = lock_path.parent().filter(|p| !p.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent)?;
    }

    let file = OpenOptions::new()
        .create(true)
        .truncate(false)
        .write(true)
        .open(lock_path)?;

    let deadline = Instant::now() + timeout;

    loop {
        if try_lock(&file) {
            return Ok(WriterLock { file });
        }

        if Instant::now() >= deadline {
            return Err(IngestError::LockTimeout {
                path: lock_path.to_path_buf(),
                waited_ms: timeout.as_millis() as u64,
            });
        }

        std::thread::sleep(RETRY_INTERVAL);
    }
}

#[cfg(unix)]
fn try_lock(file: &File) -> bool {
    let fd = std::os::unix::io::AsRawFd::as_raw_fd(file);
    unsafe { libc::flock(fd, libc::LOCK_EX | libc::LOCK_NB) == 0 }
}

#[cfg(unix)]
fn unlock(file: &File) {
    let fd = std::os::unix::io::AsRawFd::as_raw_fd(file);
    unsafe {
        libc::flock(fd, libc::LOCK_UN);
    }
}

// No advisory locking here: writers are serialized in-process only.
#[cfg(not(unix))]
fn try_lock(_file: &File) -> bool {
    true
}

#[cfg(not(unix))]
fn unlock(_file: &File) {}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_acquire_and_release() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("state.lock");

        let lock = acquire(&path, Duration::from_millis(100)).unwrap();
        drop(lock);

        assert!(acquire(&path, Duration::from_millis(100)).is_ok());
        assert!(path.exists());
    }

    #[cfg(unix)]
    #[test]
    fn test_second_holder_times_out() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("state.lock");

        let _held = acquire(&path, Duration::from_millis(100)).unwrap();
        let result = acquire(&path, Duration::from_millis(50));

        assert!(matches!(result, Err(IngestError::LockTimeout { .. })));
    }
}
