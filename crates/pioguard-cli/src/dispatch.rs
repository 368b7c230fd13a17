use std::collections::BTreeMap;
use std::io::Write;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use clap::CommandFactory;
use pioguard_core::{Settings, VersionOracle, VersionVerdict};
use pioguard_installer::{
    current_unix_timestamp, default_user_prefix, CacheLayout, CommandToolchain, Coordinator,
    FileFlagStore, FlagStore, HolderIdentity, InstallLock, LockStatus, PrefixLayout, Toolchain,
};
use tracing::{debug, info};

use crate::render::{
    current_output_style, render_section_header, render_status_line, OutputStyle,
    TerminalReporter,
};
use crate::shell::{render_path_export_lines, resolve_init_shell, toolchain_search_path};
use crate::{Cli, Commands};

/// Filesystem locations one invocation works against.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct CliPaths {
    pub(crate) layout: PrefixLayout,
    pub(crate) cache_dir: PathBuf,
    pub(crate) config_path: PathBuf,
}

impl CliPaths {
    pub(crate) fn flags_path(&self) -> PathBuf {
        self.layout.flags_path()
    }
}

pub(crate) fn resolve_cli_paths(
    prefix: Option<&Path>,
    cache_dir: Option<&Path>,
    config: Option<&Path>,
) -> Result<CliPaths> {
    let prefix = match prefix {
        Some(prefix) => prefix.to_path_buf(),
        None => default_user_prefix()?,
    };
    let layout = PrefixLayout::new(prefix);
    let cache_dir = cache_dir
        .map(Path::to_path_buf)
        .unwrap_or_else(|| layout.cache_dir());
    let config_path = config
        .map(Path::to_path_buf)
        .unwrap_or_else(|| layout.config_path());
    Ok(CliPaths {
        layout,
        cache_dir,
        config_path,
    })
}

pub(crate) fn run_cli(cli: Cli) -> Result<()> {
    let output_style = current_output_style(cli.plain);

    match cli.command {
        Commands::EnsureReady => {
            let paths = resolve_cli_paths(
                cli.prefix.as_deref(),
                cli.cache_dir.as_deref(),
                cli.config.as_deref(),
            )?;
            let settings = Settings::load(&paths.config_path)?;
            let flags = FileFlagStore::new(paths.flags_path());
            let toolchain = CommandToolchain::from_settings(&settings.toolchain);
            let coordinator =
                Coordinator::new(&flags, &settings, &paths.cache_dir, &cli.extension_version);
            debug!(
                cache_dir = %paths.cache_dir.display(),
                extension_version = %cli.extension_version,
                prerelease_channel = coordinator.state().prerelease_channel(),
                "starting ensure-ready"
            );
            let reporter = TerminalReporter::new(output_style);

            let outcome = coordinator.ensure_ready(&toolchain, &reporter);
            drop(reporter);
            info!(outcome = outcome.as_str(), "ensure-ready finished");
            outcome.into_result()?;
        }
        Commands::Status => {
            let paths = resolve_cli_paths(
                cli.prefix.as_deref(),
                cli.cache_dir.as_deref(),
                cli.config.as_deref(),
            )?;
            let settings = Settings::load(&paths.config_path)?;
            let oracle = VersionOracle::new(
                &cli.extension_version,
                settings.toolchain.requirement.clone(),
            );
            let toolchain = CommandToolchain::from_settings(&settings.toolchain);
            let installed_version = toolchain.installed_version();
            let verdict = oracle.verdict(installed_version.as_deref());

            let lock = InstallLock::for_layout(&CacheLayout::new(&paths.cache_dir));
            let lock_status = lock.inspect()?;
            let flags = FileFlagStore::new(paths.flags_path()).snapshot()?;

            let report = StatusReport {
                cache_dir: paths.cache_dir.clone(),
                lock_path: lock.path().to_path_buf(),
                lock_status,
                requirement: oracle.requirement().to_string(),
                installed_version,
                verdict,
                flags,
                now_unix: current_unix_timestamp()?,
            };
            if let Some(header) = render_section_header(output_style, "pioguard status") {
                println!("{header}");
            }
            for line in format_status_lines(output_style, &report) {
                println!("{line}");
            }
        }
        Commands::ClearLock => {
            let paths = resolve_cli_paths(
                cli.prefix.as_deref(),
                cli.cache_dir.as_deref(),
                cli.config.as_deref(),
            )?;
            let lock = InstallLock::for_layout(&CacheLayout::new(&paths.cache_dir));
            let previous = lock.inspect()?;
            lock.clear()?;
            println!(
                "{}",
                render_status_line(
                    output_style,
                    "ok",
                    &format_clear_lock_message(&previous, lock.path())
                )
            );
        }
        Commands::InitShell { shell } => {
            let paths = resolve_cli_paths(
                cli.prefix.as_deref(),
                cli.cache_dir.as_deref(),
                cli.config.as_deref(),
            )?;
            let settings = Settings::load(&paths.config_path)?;
            let shell_env = std::env::var("SHELL").ok();
            let shell = resolve_init_shell(shell, shell_env.as_deref(), cfg!(windows));
            let entries =
                toolchain_search_path(&settings.toolchain.bin_dirs, std::env::var_os("PATH"));
            for line in render_path_export_lines(shell, &entries) {
                println!("{line}");
            }
        }
        Commands::Completions { shell } => {
            let mut stdout = std::io::stdout();
            write_completions_script(shell, &mut stdout)?;
        }
    }

    Ok(())
}

pub(crate) fn write_completions_script<W: Write>(
    shell: clap_complete::Shell,
    writer: &mut W,
) -> Result<()> {
    let mut command = Cli::command();
    let mut generated = Vec::new();
    clap_complete::generate(shell, &mut command, "pioguard", &mut generated);
    writer
        .write_all(&generated)
        .context("failed writing completion script")
}

pub(crate) struct StatusReport {
    pub(crate) cache_dir: PathBuf,
    pub(crate) lock_path: PathBuf,
    pub(crate) lock_status: LockStatus,
    pub(crate) requirement: String,
    pub(crate) installed_version: Option<String>,
    pub(crate) verdict: VersionVerdict,
    pub(crate) flags: BTreeMap<String, String>,
    pub(crate) now_unix: u64,
}

pub(crate) fn format_status_lines(style: OutputStyle, report: &StatusReport) -> Vec<String> {
    let mut lines = vec![
        format!("cache: {}", report.cache_dir.display()),
        format!("lock: {}", report.lock_path.display()),
    ];

    let (lock_badge, lock_line) = match &report.lock_status {
        LockStatus::Absent => ("ok", "lock-status: absent".to_string()),
        LockStatus::Held(holder) => (
            "warn",
            format!(
                "lock-status: held {}",
                format_holder(holder, report.now_unix)
            ),
        ),
        LockStatus::Stale(Some(holder)) => (
            "warn",
            format!(
                "lock-status: stale {}",
                format_holder(holder, report.now_unix)
            ),
        ),
        LockStatus::Stale(None) => ("warn", "lock-status: stale (unreadable holder)".to_string()),
    };
    lines.push(render_status_line(style, lock_badge, &lock_line));

    lines.push(format!(
        "channel: {}",
        if report.verdict.prerelease_channel {
            "prerelease"
        } else {
            "stable"
        }
    ));
    lines.push(format!("requirement: {}", report.requirement));
    lines.push(format!(
        "installed: {}",
        report.installed_version.as_deref().unwrap_or("none")
    ));
    let (verdict_badge, verdict_line) = if report.verdict.current {
        ("ok", "toolchain: current")
    } else {
        ("warn", "toolchain: needs install")
    };
    lines.push(render_status_line(style, verdict_badge, verdict_line));

    for (key, value) in &report.flags {
        lines.push(format!("flag {key}={value}"));
    }
    lines
}

fn format_holder(holder: &HolderIdentity, now_unix: u64) -> String {
    let age = now_unix.saturating_sub(holder.acquired_at_unix);
    match &holder.hostname {
        Some(hostname) => format!("pid={} host={hostname} age={age}s", holder.pid),
        None => format!("pid={} age={age}s", holder.pid),
    }
}

pub(crate) fn format_clear_lock_message(previous: &LockStatus, path: &Path) -> String {
    match previous {
        LockStatus::Absent => format!("no install lock at {}", path.display()),
        LockStatus::Held(holder) => format!(
            "cleared install lock held by pid {}: {}",
            holder.pid,
            path.display()
        ),
        LockStatus::Stale(_) => format!("cleared stale install lock: {}", path.display()),
    }
}
