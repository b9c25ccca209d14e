// Single-writer lock next to a file that is rewritten in place.

use std::ffi::OsString;
use std::fs::OpenOptions;
use std::io::{Read, Write};
use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};

use log::{debug, warn};

pub const LOCK_WAIT_TIMEOUT: Duration = Duration::from_secs(10);
const LOCK_RETRY_DELAY: Duration = Duration::from_millis(50);

/// Removes the lock file when dropped.
#[derive(Debug)]
pub struct WriteLockGuard {
    path: PathBuf,
}

impl WriteLockGuard {
    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl Drop for WriteLockGuard {
    fn drop(&mut self) {
        let _ = std::fs::remove_file(&self.path);
    }
}

#[derive(Debug, PartialEq, Eq)]
pub enum LockState {
    HeldBy(i32),
    Stale,
    Unknown,
}

/// The lock of `store.json` is `store.json.lock`.
pub fn lock_path_for(path: &Path) -> PathBuf {
    let mut s: OsString = path.as_os_str().to_owned();
    s.push(".lock");
    PathBuf::from(s)
}

/// Waits for the lock, reclaiming it from dead processes.
pub fn acquire(lock_path: &Path, timeout: Duration) -> Result<WriteLockGuard, LockState> {
    let started = Instant::now();

    loop {
        match try_acquire(lock_path) {
            Ok(guard) => {
                debug!("acquire: locked {:?}", lock_path);
                return Ok(guard);
            }
            Err(LockState::Stale) => {
                warn!("acquire: removing stale lock {:?}", lock_path);
                let _ = std::fs::remove_file(lock_path);
            }
            Err(state) => {
                if started.elapsed() >= timeout {
                    return Err(state);
                }
                std::thread::sleep(LOCK_RETRY_DELAY);
            }
        }
    }
}

fn try_acquire(lock_path: &Path) -> Result<WriteLockGuard, LockState> {
    match OpenOptions::new()
        .create_new(true)
        .write(true)
        .open(lock_path)
    {
        Ok(mut file) => {
            let pid = std::process::id();
            let _ = writeln!(file, "{pid}");
            Ok(WriteLockGuard {
                path: lock_path.to_path_buf(),
            })
        }
        Err(err) if err.kind() == std::io::ErrorKind::AlreadyExists => {
            let mut pid_buf = String::new();
            if OpenOptions::new()
                .read(true)
                .open(lock_path)
                .and_then(|mut file| file.read_to_string(&mut pid_buf))
                .is_err()
            {
                return Err(LockState::Unknown);
            }

            match pid_buf.trim().parse::<i32>().ok() {
                Some(pid) if is_process_running(pid) => Err(LockState::HeldBy(pid)),
                Some(_) => Err(LockState::Stale),
                None => Err(LockState::Unknown),
            }
        }
        Err(_) => Err(LockState::Unknown),
    }
}

fn is_process_running(pid: i32) -> bool {
    std::process::Command::new("kill")
        .arg("-0")
        .arg(pid.to_string())
        .status()
        .map(|status| status.success())
        .unwrap_or(false)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn acquires_and_releases_lock_file() {
        let temp = tempfile::tempdir().unwrap();
        let lock_path = lock_path_for(&temp.path().join("credentials.json"));
        assert!(lock_path.ends_with("credentials.json.lock"));

        let guard = try_acquire(&lock_path).unwrap();
        assert!(lock_path.is_file());
        drop(guard);
        assert!(!lock_path.exists());
    }

    #[test]
    fn garbage_lock_is_unknown() {
        let temp = tempfile::tempdir().unwrap();
        let lock_path = temp.path().join("store.lock");
        std::fs::write(&lock_path, "not a pid").unwrap();
        assert_eq!(
            acquire(&lock_path, Duration::from_millis(60)).unwrap_err(),
            LockState::Unknown
        );
    }
}
