// crates/core/src/lock.rs
//! Cross-process write lock over an index directory.
//!
//! Acquisition is an atomic create-exclusive of `write.lock`. The file records
//! the holder's pid, host and acquisition time. A lock left behind by a
//! crashed process is never cleared automatically: callers see
//! `LockError::Held` with `holder_alive = false` and must run an explicit
//! [`force_unlock`]. Liveness is only checked for holders on this host.

use std::fs::{self, OpenOptions};
use std::io::{ErrorKind, Write};
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use sysinfo::System;

use crate::error::LockError;
use crate::paths;

/// Contents of the lock marker file.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LockInfo {
    pub pid: u32,
    /// RFC 3339 UTC.
    pub acquired_at: String,
    /// Empty in markers written without a host.
    #[serde(default)]
    pub hostname: String,
}

/// Holder of a lock, as observed by another process.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct LockHolder {
    pub pid: u32,
    pub acquired_at: String,
    pub hostname: String,
    /// False only when the holder ran on this host and its pid is gone.
    pub alive: bool,
}

/// RAII guard for the index write lock. Dropping it releases the lock.
#[derive(Debug)]
pub struct WriteLock {
    path: PathBuf,
    pid: u32,
    released: bool,
}

impl WriteLock {
    /// Take the lock for `index_dir`, failing fast if another process holds it.
    pub fn acquire(index_dir: &Path) -> Result<Self, LockError> {
        let path = paths::lock_path(index_dir);
        let pid = std::process::id();

        let mut file = match OpenOptions::new().write(true).create_new(true).open(&path) {
            Ok(file) => file,
            Err(e) if e.kind() == ErrorKind::AlreadyExists => {
                let holder = read_holder(index_dir)?.unwrap_or_else(unknown_holder);
                tracing::warn!(
                    holder_pid = holder.pid,
                    holder_host = %holder.hostname,
                    holder_alive = holder.alive,
                    "write lock held by another process"
                );
                return Err(LockError::Held {
                    pid: holder.pid,
                    hostname: holder.hostname,
                    acquired_at: holder.acquired_at,
                    holder_alive: holder.alive,
                });
            }
            Err(e) => return Err(LockError::io(&path, e)),
        };

        let info = LockInfo {
            pid,
            acquired_at: chrono::Utc::now().to_rfc3339_opts(chrono::SecondsFormat::Secs, true),
            hostname: local_hostname(),
        };
        let body = serde_json::to_string(&info).map_err(|e| {
            LockError::io(&path, std::io::Error::new(ErrorKind::InvalidData, e))
        })?;
        if let Err(e) = file.write_all(body.as_bytes()).and_then(|_| file.sync_all()) {
            let _ = fs::remove_file(&path);
            return Err(LockError::io(&path, e));
        }

        tracing::debug!(pid, path = %path.display(), "write lock acquired");
        Ok(Self {
            path,
            pid,
            released: false,
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Release explicitly. Never fails; a marker already removed externally
    /// or replaced by another holder is left alone.
    pub fn release(mut self) {
        self.release_inner();
    }

    fn release_inner(&mut self) {
        if self.released {
            return;
        }
        self.released = true;

        match read_info(&self.path) {
            Ok(Some(info)) if info.pid == self.pid => {
                let _ = fs::remove_file(&self.path);
                tracing::debug!(pid = self.pid, "write lock released");
            }
            Ok(Some(info)) => {
                tracing::warn!(
                    ours = self.pid,
                    found = info.pid,
                    "write lock now belongs to another process; leaving it"
                );
            }
            _ => {}
        }
    }
}

impl Drop for WriteLock {
    fn drop(&mut self) {
        self.release_inner();
    }
}

/// Report who holds the lock, or `None` if the index is unlocked.
pub fn read_holder(index_dir: &Path) -> Result<Option<LockHolder>, LockError> {
    let path = paths::lock_path(index_dir);
    match read_info(&path) {
        Ok(Some(info)) => Ok(Some(LockHolder {
            alive: holder_alive(&info),
            pid: info.pid,
            acquired_at: info.acquired_at,
            hostname: info.hostname,
        })),
        Ok(None) => Ok(None),
        // Marker exists but is empty or mid-write.
        Err(e) if e.kind() == ErrorKind::InvalidData => Ok(Some(unknown_holder())),
        Err(e) => Err(LockError::io(path, e)),
    }
}

/// Remove the lock marker unconditionally. Returns the previous holder.
pub fn force_unlock(index_dir: &Path) -> Result<Option<LockHolder>, LockError> {
    let holder = read_holder(index_dir)?;
    let path = paths::lock_path(index_dir);
    match fs::remove_file(&path) {
        Ok(()) => {
            tracing::warn!(previous_pid = ?holder.as_ref().map(|h| h.pid), "write lock force-removed");
            Ok(holder)
        }
        Err(e) if e.kind() == ErrorKind::NotFound => Ok(None),
        Err(e) => Err(LockError::io(path, e)),
    }
}

fn read_info(path: &Path) -> std::io::Result<Option<LockInfo>> {
    let contents = match fs::read_to_string(path) {
        Ok(c) => c,
        Err(e) if e.kind() == ErrorKind::NotFound => return Ok(None),
        Err(e) => return Err(e),
    };
    serde_json::from_str(&contents)
        .map(Some)
        .map_err(|e| std::io::Error::new(ErrorKind::InvalidData, e))
}

fn unknown_holder() -> LockHolder {
    LockHolder {
        pid: 0,
        acquired_at: "unknown".into(),
        hostname: "unknown".into(),
        alive: true,
    }
}

pub(crate) fn local_hostname() -> String {
    System::host_name().unwrap_or_default()
}

/// A pid can only be checked on the host that recorded it; holders on other
/// hosts sharing the index directory are taken as alive.
fn holder_alive(info: &LockInfo) -> bool {
    if info.hostname.is_empty() || info.hostname == local_hostname() {
        is_process_alive(info.pid)
    } else {
        true
    }
}

#[cfg(target_os = "linux")]
fn is_process_alive(pid: u32) -> bool {
    // Zombies keep /proc/{pid} but lose a readable stat.
    Path::new(&format!("/proc/{pid}/stat")).exists()
}

#[cfg(all(unix, not(target_os = "linux")))]
fn is_process_alive(pid: u32) -> bool {
    std::process::Command::new("kill")
        .args(["-0", &pid.to_string()])
        .output()
        .map(|o| o.status.success())
        .unwrap_or(true)
}

#[cfg(not(unix))]
fn is_process_alive(_pid: u32) -> bool {
    true
}
