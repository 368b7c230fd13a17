use anyhow::{anyhow, Result};
use serde::{Deserialize, Serialize};
use std::path::Path;

/// Result of one `ensure_ready` pass.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum InstallationOutcome {
    AlreadyCurrent,
    SuspendedByOther,
    InstalledSuccessfully,
    InstallationFailed(String),
}

impl InstallationOutcome {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::AlreadyCurrent => "already-current",
            Self::SuspendedByOther => "suspended-by-other",
            Self::InstalledSuccessfully => "installed",
            Self::InstallationFailed(_) => "failed",
        }
    }

    /// True when dependent features may assume the toolchain exists.
    pub fn is_ready(&self) -> bool {
        matches!(self, Self::AlreadyCurrent | Self::InstalledSuccessfully)
    }

    pub fn failure_reason(&self) -> Option<&str> {
        match self {
            Self::InstallationFailed(reason) => Some(reason),
            _ => None,
        }
    }

    /// Turns a failed installation into an error so callers can abort the
    /// rest of their activation with `?`.
    pub fn into_result(self) -> Result<Self> {
        match self {
            Self::InstallationFailed(reason) => {
                Err(anyhow!("toolchain installation failed: {reason}"))
            }
            other => Ok(other),
        }
    }
}

/// Identity written into the lock file by the process that claimed it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HolderIdentity {
    pub pid: u32,
    pub acquired_at_unix: u64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub hostname: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LockStatus {
    Absent,
    Held(HolderIdentity),
    /// The file exists but nobody alive is behind it. The holder is `None`
    /// when the file content could not be parsed.
    Stale(Option<HolderIdentity>),
}

impl LockStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Absent => "absent",
            Self::Held(_) => "held",
            Self::Stale(_) => "stale",
        }
    }
}

/// Inputs handed to the opaque toolchain install operation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct InstallContext<'a> {
    pub cache_dir: &'a Path,
    pub prerelease_channel: bool,
}
