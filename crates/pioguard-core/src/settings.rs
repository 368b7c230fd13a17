use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use anyhow::{anyhow, Context};
use semver::VersionReq;
use serde::{Deserialize, Serialize};

pub const DEFAULT_SUSPENDED_MESSAGE: &str = "Toolchain installation has been suspended, because the \
     installer is already started in another window.";

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct Settings {
    #[serde(default)]
    pub toolchain: ToolchainSettings,
    #[serde(default)]
    pub installer: InstallerSettings,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ToolchainSettings {
    #[serde(default = "default_requirement")]
    pub requirement: VersionReq,
    #[serde(default = "default_version_command")]
    pub version_command: Vec<String>,
    #[serde(default = "default_install_command")]
    pub install_command: Vec<String>,
    /// Directories prepended to `PATH` in shells prepared for the toolchain.
    #[serde(default)]
    pub bin_dirs: Vec<PathBuf>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct InstallerSettings {
    /// Notice shown when another process already claimed the installation.
    #[serde(default = "default_suspended_message")]
    pub suspended_message: String,
}

impl Default for ToolchainSettings {
    fn default() -> Self {
        Self {
            requirement: default_requirement(),
            version_command: default_version_command(),
            install_command: default_install_command(),
            bin_dirs: Vec::new(),
        }
    }
}

impl Default for InstallerSettings {
    fn default() -> Self {
        Self {
            suspended_message: default_suspended_message(),
        }
    }
}

impl Settings {
    pub fn from_toml_str(input: &str) -> anyhow::Result<Self> {
        let settings: Self = toml::from_str(input).context("failed to parse pioguard settings")?;
        validate_command("toolchain.version_command", &settings.toolchain.version_command)?;
        validate_command("toolchain.install_command", &settings.toolchain.install_command)?;
        if settings.installer.suspended_message.trim().is_empty() {
            return Err(anyhow!("installer.suspended_message must not be empty"));
        }
        Ok(settings)
    }

    /// Loads settings from `path`, falling back to defaults when the file does
    /// not exist.
    pub fn load(path: &Path) -> anyhow::Result<Self> {
        let raw = match fs::read_to_string(path) {
            Ok(raw) => raw,
            Err(err) if err.kind() == io::ErrorKind::NotFound => return Ok(Self::default()),
            Err(err) => {
                return Err(err)
                    .with_context(|| format!("failed to read settings: {}", path.display()));
            }
        };
        Self::from_toml_str(&raw)
            .with_context(|| format!("invalid settings file: {}", path.display()))
    }
}

fn validate_command(field: &str, command: &[String]) -> anyhow::Result<()> {
    let Some(program) = command.first() else {
        return Err(anyhow!("{field} must name a program"));
    };
    if program.trim().is_empty() {
        return Err(anyhow!("{field} program must not be blank"));
    }
    Ok(())
}

fn default_requirement() -> VersionReq {
    VersionReq::parse(">=6.0.0").unwrap_or(VersionReq::STAR)
}

fn default_version_command() -> Vec<String> {
    vec!["pio".to_string(), "--version".to_string()]
}

fn default_install_command() -> Vec<String> {
    vec![
        "python3".to_string(),
        "-m".to_string(),
        "platformio_installer".to_string(),
    ]
}

fn default_suspended_message() -> String {
    DEFAULT_SUSPENDED_MESSAGE.to_string()
}
