use anyhow::{Context, Result};
use std::collections::BTreeMap;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use crate::fs_utils::write_replace;

pub const INSTALL_COMPLETED_KEY: &str = "toolchain.install_completed";
pub const INSTALLED_VERSION_KEY: &str = "toolchain.installed_version";
pub const LAST_FAILURE_KEY: &str = "toolchain.last_failure";

/// Small key/value markers shared by every process on the machine.
///
/// Values are advisory: concurrent writers race with last-write-wins and no
/// correctness decision may depend on them.
pub trait FlagStore {
    fn get(&self, key: &str) -> Result<Option<String>>;
    fn set(&self, key: &str, value: &str) -> Result<()>;
    fn snapshot(&self) -> Result<BTreeMap<String, String>>;
}

/// Flags persisted as `key=value` lines in a single file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileFlagStore {
    path: PathBuf,
}

impl FileFlagStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn read_all(&self) -> Result<BTreeMap<String, String>> {
        let raw = match fs::read_to_string(&self.path) {
            Ok(raw) => raw,
            Err(err) if err.kind() == io::ErrorKind::NotFound => return Ok(BTreeMap::new()),
            Err(err) => {
                return Err(err)
                    .with_context(|| format!("failed to read flags: {}", self.path.display()));
            }
        };
        Ok(parse_flags(&raw))
    }
}

impl FlagStore for FileFlagStore {
    fn get(&self, key: &str) -> Result<Option<String>> {
        Ok(self.read_all()?.remove(key))
    }

    fn set(&self, key: &str, value: &str) -> Result<()> {
        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent)
                .with_context(|| format!("failed to create flag dir: {}", parent.display()))?;
        }

        // Re-read right before writing so flags set by other processes survive.
        let mut flags = self.read_all()?;
        flags.insert(key.to_string(), sanitize_value(value));
        write_replace(&self.path, serialize_flags(&flags).as_bytes())
            .with_context(|| format!("failed to write flags: {}", self.path.display()))
    }

    fn snapshot(&self) -> Result<BTreeMap<String, String>> {
        self.read_all()
    }
}

#[derive(Debug, Default)]
pub struct MemoryFlagStore {
    flags: Mutex<BTreeMap<String, String>>,
}

impl MemoryFlagStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl FlagStore for MemoryFlagStore {
    fn get(&self, key: &str) -> Result<Option<String>> {
        Ok(self.snapshot()?.remove(key))
    }

    fn set(&self, key: &str, value: &str) -> Result<()> {
        let mut flags = self
            .flags
            .lock()
            .map_err(|_| anyhow::anyhow!("flag store mutex poisoned"))?;
        flags.insert(key.to_string(), sanitize_value(value));
        Ok(())
    }

    fn snapshot(&self) -> Result<BTreeMap<String, String>> {
        let flags = self
            .flags
            .lock()
            .map_err(|_| anyhow::anyhow!("flag store mutex poisoned"))?;
        Ok(flags.clone())
    }
}

pub(crate) fn parse_flags(raw: &str) -> BTreeMap<String, String> {
    raw.lines()
        .map(str::trim)
        .filter(|line| !line.is_empty() && !line.starts_with('#'))
        .filter_map(|line| line.split_once('='))
        .map(|(k, v)| (k.trim().to_string(), v.trim().to_string()))
        .filter(|(k, _)| !k.is_empty())
        .collect()
}

fn serialize_flags(flags: &BTreeMap<String, String>) -> String {
    let mut payload = String::new();
    for (key, value) in flags {
        payload.push_str(&format!("{key}={value}\n"));
    }
    payload
}

fn sanitize_value(value: &str) -> String {
    value.replace(['\r', '\n'], " ").trim().to_string()
}
