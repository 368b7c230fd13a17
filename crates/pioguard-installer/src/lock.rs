use anyhow::{Context, Result};
use std::fs;
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::time::{SystemTime, UNIX_EPOCH};
use tracing::{debug, warn};

use crate::fs_utils::remove_file_if_exists;
use crate::{CacheLayout, HolderIdentity, LockStatus};

/// Filesystem marker that stakes the exclusive right to install.
///
/// Presence of the file means "claimed", not "claimed by a live process".
/// [`InstallLock::is_held`] only answers the former; [`InstallLock::inspect`]
/// probes the recorded holder for the latter.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InstallLock {
    path: PathBuf,
}

/// Scoped claim on an [`InstallLock`]. Dropping it releases the lock.
#[derive(Debug)]
pub struct LockGuard<'a> {
    lock: &'a InstallLock,
    holder: HolderIdentity,
    released: bool,
}

impl InstallLock {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn for_layout(layout: &CacheLayout) -> Self {
        Self::new(layout.lock_path())
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn is_held(&self) -> bool {
        self.path.exists()
    }

    /// Claims the lock for the current process.
    ///
    /// Returns `Ok(None)` when another live process created the file first. A
    /// file left behind by a dead holder, or one that cannot be parsed, is
    /// taken over.
    pub fn acquire(&self) -> Result<Option<LockGuard<'_>>> {
        let holder = HolderIdentity::current()?;
        let payload = serialize_holder(&holder)?;
        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent)
                .with_context(|| format!("failed to create {}", parent.display()))?;
        }

        match fs::OpenOptions::new()
            .write(true)
            .create_new(true)
            .open(&self.path)
        {
            Ok(mut file) => {
                file.write_all(payload.as_bytes())
                    .and_then(|()| file.flush())
                    .with_context(|| {
                        format!("failed to write install lock: {}", self.path.display())
                    })?;
            }
            Err(err) if err.kind() == io::ErrorKind::AlreadyExists => match self.inspect()? {
                LockStatus::Held(existing) if existing.pid != holder.pid => {
                    debug!(
                        pid = existing.pid,
                        path = %self.path.display(),
                        "install lock claimed by a live process"
                    );
                    return Ok(None);
                }
                status => {
                    warn!(
                        status = status.as_str(),
                        path = %self.path.display(),
                        "taking over leftover install lock"
                    );
                    fs::write(&self.path, payload.as_bytes()).with_context(|| {
                        format!("failed to take over install lock: {}", self.path.display())
                    })?;
                }
            },
            Err(err) => {
                return Err(err).with_context(|| {
                    format!("failed to claim install lock: {}", self.path.display())
                });
            }
        }

        debug!(pid = holder.pid, path = %self.path.display(), "install lock acquired");
        Ok(Some(LockGuard {
            lock: self,
            holder,
            released: false,
        }))
    }

    /// Removes the lock file unless it has been taken over by another process.
    pub fn release(&self) -> Result<()> {
        if let Ok(Some(holder)) = self.read_holder() {
            if holder.pid != std::process::id() {
                debug!(
                    pid = holder.pid,
                    "install lock now belongs to another process; leaving it"
                );
                return Ok(());
            }
        }
        remove_file_if_exists(&self.path)
            .with_context(|| format!("failed to release install lock: {}", self.path.display()))
    }

    /// Removes the lock file regardless of who wrote it.
    pub fn clear(&self) -> Result<()> {
        remove_file_if_exists(&self.path)
            .with_context(|| format!("failed to clear install lock: {}", self.path.display()))
    }

    pub fn read_holder(&self) -> Result<Option<HolderIdentity>> {
        let Some(raw) = self.read_raw()? else {
            return Ok(None);
        };
        serde_json::from_str(raw.trim())
            .map(Some)
            .with_context(|| format!("failed to parse install lock: {}", self.path.display()))
    }

    pub fn inspect(&self) -> Result<LockStatus> {
        let Some(raw) = self.read_raw()? else {
            return Ok(LockStatus::Absent);
        };
        let Ok(holder) = serde_json::from_str::<HolderIdentity>(raw.trim()) else {
            return Ok(LockStatus::Stale(None));
        };

        let foreign_host = match (&holder.hostname, current_hostname()) {
            (Some(recorded), Some(ours)) => *recorded != ours,
            _ => false,
        };
        if foreign_host || pid_alive(holder.pid) {
            Ok(LockStatus::Held(holder))
        } else {
            Ok(LockStatus::Stale(Some(holder)))
        }
    }

    fn read_raw(&self) -> Result<Option<String>> {
        match fs::read_to_string(&self.path) {
            Ok(raw) => Ok(Some(raw)),
            Err(err) if err.kind() == io::ErrorKind::NotFound => Ok(None),
            Err(err) => Err(err)
                .with_context(|| format!("failed to read install lock: {}", self.path.display())),
        }
    }
}

impl LockGuard<'_> {
    pub fn holder(&self) -> &HolderIdentity {
        &self.holder
    }

    pub fn release(mut self) -> Result<()> {
        self.released = true;
        self.lock.release()
    }
}

impl Drop for LockGuard<'_> {
    fn drop(&mut self) {
        if self.released {
            return;
        }
        if let Err(err) = self.lock.release() {
            warn!(error = %err, "failed to release install lock on drop");
        }
    }
}

impl HolderIdentity {
    pub fn current() -> Result<Self> {
        Ok(Self {
            pid: std::process::id(),
            acquired_at_unix: current_unix_timestamp()?,
            hostname: current_hostname(),
        })
    }
}

pub fn current_unix_timestamp() -> Result<u64> {
    Ok(SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .context("system time is before unix epoch")?
        .as_secs())
}

fn serialize_holder(holder: &HolderIdentity) -> Result<String> {
    let mut payload =
        serde_json::to_string(holder).context("failed to serialize install lock holder")?;
    payload.push('\n');
    Ok(payload)
}

/// Machine name from the OS, independent of how the process was launched.
pub(crate) fn current_hostname() -> Option<String> {
    let raw = match hostname::get() {
        Ok(raw) => raw,
        Err(err) => {
            debug!(error = %err, "failed to read hostname");
            return None;
        }
    };
    raw.into_string()
        .ok()
        .map(|value| value.trim().to_string())
        .filter(|value| !value.is_empty())
}

fn pid_alive(pid: u32) -> bool {
    if pid == 0 {
        return false;
    }
    if pid == std::process::id() {
        return true;
    }
    #[cfg(target_os = "linux")]
    {
        Path::new("/proc").join(pid.to_string()).exists()
    }
    // kill -0 probes for existence without delivering a signal
    #[cfg(all(unix, not(target_os = "linux")))]
    {
        let result = std::process::Command::new("kill")
            .args(["-0", &pid.to_string()])
            .stdout(std::process::Stdio::null())
            .stderr(std::process::Stdio::null())
            .status();
        matches!(result, Ok(status) if status.success())
    }
    #[cfg(not(unix))]
    {
        true
    }
}
