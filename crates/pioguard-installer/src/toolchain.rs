use anyhow::{anyhow, Context, Result};
use pioguard_core::{parse_reported_version, ToolchainSettings};
use std::process::{Command, Stdio};
use tracing::debug;

use crate::InstallContext;

pub const CACHE_DIR_ENV: &str = "PIOGUARD_CACHE_DIR";
pub const PRERELEASE_ENV: &str = "PIOGUARD_PRERELEASE";

/// The external toolchain whose presence the coordinator guarantees.
///
/// `install` is opaque: it owns downloads, environments, and any retry or
/// timeout policy of its own.
pub trait Toolchain {
    /// Locally discoverable installed version, if any. Must not touch the
    /// network.
    fn installed_version(&self) -> Option<String>;

    fn install(&self, ctx: &InstallContext<'_>) -> Result<()>;
}

/// Toolchain driven by external commands from the settings file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommandToolchain {
    version_command: Vec<String>,
    install_command: Vec<String>,
}

impl CommandToolchain {
    pub fn new(version_command: Vec<String>, install_command: Vec<String>) -> Self {
        Self {
            version_command,
            install_command,
        }
    }

    pub fn from_settings(settings: &ToolchainSettings) -> Self {
        Self::new(
            settings.version_command.clone(),
            settings.install_command.clone(),
        )
    }
}

impl Toolchain for CommandToolchain {
    fn installed_version(&self) -> Option<String> {
        let mut command = build_command(&self.version_command).ok()?;
        let output = match command.stdin(Stdio::null()).output() {
            Ok(output) => output,
            Err(err) => {
                debug!(error = %err, "toolchain version probe failed to start");
                return None;
            }
        };
        if !output.status.success() {
            debug!(status = %output.status, "toolchain version probe exited unsuccessfully");
            return None;
        }

        // Some tools print their banner on stderr.
        let stdout = String::from_utf8_lossy(&output.stdout);
        let stderr = String::from_utf8_lossy(&output.stderr);
        parse_reported_version(&stdout)
            .or_else(|| parse_reported_version(&stderr))
            .map(|version| version.to_string())
    }

    fn install(&self, ctx: &InstallContext<'_>) -> Result<()> {
        let mut command = build_command(&self.install_command)?;
        command
            .stdin(Stdio::null())
            .env(CACHE_DIR_ENV, ctx.cache_dir)
            .env(PRERELEASE_ENV, if ctx.prerelease_channel { "1" } else { "0" })
            .current_dir(ctx.cache_dir);
        run_command(&mut command, "toolchain install command failed")
    }
}

fn build_command(argv: &[String]) -> Result<Command> {
    let (program, args) = argv
        .split_first()
        .ok_or_else(|| anyhow!("toolchain command must name a program"))?;
    let mut command = Command::new(program);
    command.args(args);
    Ok(command)
}

fn run_command(command: &mut Command, context_message: &str) -> Result<()> {
    let output = command
        .output()
        .with_context(|| format!("{context_message}: command failed to start"))?;
    if output.status.success() {
        return Ok(());
    }

    let stderr = String::from_utf8_lossy(&output.stderr);
    let stdout = String::from_utf8_lossy(&output.stdout);
    Err(anyhow!(
        "{context_message}: status={} stdout='{}' stderr='{}'",
        output.status,
        stdout.trim(),
        stderr.trim()
    ))
}
