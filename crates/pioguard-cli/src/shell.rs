use std::ffi::OsString;
use std::path::{Path, PathBuf};

use clap::ValueEnum;

#[derive(Copy, Clone, Debug, Eq, PartialEq, ValueEnum)]
pub(crate) enum InitShell {
    Bash,
    Zsh,
    Fish,
    Powershell,
    Cmd,
}

pub(crate) fn detect_shell_from_env(shell_env: Option<&str>) -> Option<InitShell> {
    let shell_value = shell_env?;
    let shell_token = Path::new(shell_value)
        .file_name()
        .and_then(|value| value.to_str())
        .unwrap_or(shell_value)
        .to_ascii_lowercase();
    match shell_token.as_str() {
        "bash" | "sh" => Some(InitShell::Bash),
        "zsh" => Some(InitShell::Zsh),
        "fish" => Some(InitShell::Fish),
        "powershell" | "pwsh" => Some(InitShell::Powershell),
        "cmd" | "cmd.exe" => Some(InitShell::Cmd),
        // some shells report e.g. "/usr/local/bin/fish-3.7"
        token if token.contains("fish") => Some(InitShell::Fish),
        _ => None,
    }
}

pub(crate) fn resolve_init_shell(
    requested_shell: Option<InitShell>,
    shell_env: Option<&str>,
    is_windows: bool,
) -> InitShell {
    if let Some(shell) = requested_shell {
        return shell;
    }
    if is_windows {
        return InitShell::Cmd;
    }
    detect_shell_from_env(shell_env).unwrap_or(InitShell::Bash)
}

/// Joins the toolchain bin dirs in front of the inherited search path.
pub(crate) fn toolchain_search_path(
    bin_dirs: &[PathBuf],
    inherited: Option<OsString>,
) -> Vec<PathBuf> {
    let mut entries: Vec<PathBuf> = bin_dirs.to_vec();
    if let Some(inherited) = inherited {
        for entry in std::env::split_paths(&inherited) {
            if !entry.as_os_str().is_empty() && !entries.contains(&entry) {
                entries.push(entry);
            }
        }
    }
    entries
}

/// Lines that make a fresh terminal see the toolchain, one statement each.
pub(crate) fn render_path_export_lines(shell: InitShell, entries: &[PathBuf]) -> Vec<String> {
    let rendered = entries
        .iter()
        .map(|entry| entry.display().to_string())
        .collect::<Vec<_>>();
    match shell {
        InitShell::Bash | InitShell::Zsh => {
            vec![format!("export PATH='{}'", escape_single_quote_shell(&rendered.join(":")))]
        }
        InitShell::Fish => {
            let quoted = rendered
                .iter()
                .map(|entry| format!("'{}'", escape_single_quote_shell(entry)))
                .collect::<Vec<_>>();
            vec![format!("set -gx PATH {}", quoted.join(" "))]
        }
        InitShell::Powershell => vec![format!(
            "$env:PATH = '{}'",
            escape_ps_single_quote(&rendered.join(";"))
        )],
        InitShell::Cmd => vec![format!("set PATH={}", rendered.join(";"))],
    }
}

fn escape_single_quote_shell(value: &str) -> String {
    value.replace('\'', "'\"'\"'")
}

fn escape_ps_single_quote(value: &str) -> String {
    value.replace('\'', "''")
}
