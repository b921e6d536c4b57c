//! Exclusive run lock so two convergence runs never touch a node at once.

use std::fs::{File, OpenOptions};
use std::io::Write;
use std::os::unix::io::AsRawFd;
use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};

use tracing::{debug, warn};

use crate::error::ConvergeError;

const POLL: Duration = Duration::from_millis(50);

/// Holds the flock until dropped.
#[derive(Debug)]
pub struct LockGuard {
    file: File,
    path: PathBuf,
}

impl LockGuard {
    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl Drop for LockGuard {
    fn drop(&mut self) {
        // SAFETY: the descriptor is owned by `self.file` and still open.
        unsafe {
            libc::flock(self.file.as_raw_fd(), libc::LOCK_UN);
        }
        debug!(path = %self.path.display(), "released run lock");
    }
}

/// Take an exclusive lock on `path`, polling until `timeout_ms` runs out.
/// The lock file is left in place; only the flock matters.
pub fn acquire(path: &Path, timeout_ms: u64) -> Result<LockGuard, ConvergeError> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent).map_err(|e| {
            ConvergeError::Lock(format!("cannot create {}: {}", parent.display(), e))
        })?;
    }
    let mut file = OpenOptions::new()
        .create(true)
        .truncate(false)
        .write(true)
        .open(path)
        .map_err(|e| ConvergeError::Lock(format!("cannot open {}: {}", path.display(), e)))?;

    let deadline = Instant::now() + Duration::from_millis(timeout_ms);
    let mut waited = false;
    loop {
        // SAFETY: flock on a descriptor we own.
        let rc = unsafe { libc::flock(file.as_raw_fd(), libc::LOCK_EX | libc::LOCK_NB) };
        if rc == 0 {
            break;
        }
        if Instant::now() >= deadline {
            return Err(ConvergeError::Lock(format!(
                "timed out acquiring {} after {}ms",
                path.display(),
                timeout_ms
            )));
        }
        if !waited {
            warn!(path = %path.display(), "another run holds the lock, waiting");
            waited = true;
        }
        std::thread::sleep(POLL);
    }

    // Best effort; the pid is only informational.
    let _ = file.set_len(0);
    let _ = writeln!(file, "{}", std::process::id());
    debug!(path = %path.display(), "acquired run lock");
    Ok(LockGuard {
        file,
        path: path.to_path_buf(),
    })
}
