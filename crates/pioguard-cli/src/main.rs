use std::path::PathBuf;

use anyhow::Result;
use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

mod dispatch;
mod render;
mod shell;

use shell::InitShell;

const LOG_ENV: &str = "PIOGUARD_LOG";

#[derive(Parser, Debug)]
#[command(name = "pioguard")]
#[command(
    about = "Install the embedded toolchain once per machine, even with many editor windows open",
    long_about = None
)]
struct Cli {
    /// Root for settings, flags and the default cache directory.
    #[arg(long, global = true)]
    prefix: Option<PathBuf>,
    /// Shared cache directory holding the install lock.
    #[arg(long, global = true)]
    cache_dir: Option<PathBuf>,
    #[arg(long, global = true)]
    config: Option<PathBuf>,
    /// Version of the host extension; a prerelease suffix selects the prerelease channel.
    #[arg(long, global = true, default_value = env!("CARGO_PKG_VERSION"))]
    extension_version: String,
    #[arg(long, global = true)]
    plain: bool,
    #[arg(short, long, global = true, action = clap::ArgAction::Count)]
    verbose: u8,
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Make sure a current toolchain is installed, installing it if nobody else is.
    EnsureReady,
    /// Show lock, flag and version state without changing anything.
    Status,
    /// Remove the install lock file unconditionally.
    ClearLock,
    /// Print PATH setup for a terminal that should see the toolchain.
    InitShell {
        #[arg(long, value_enum)]
        shell: Option<InitShell>,
    },
    /// Generate a completion script for the given shell.
    Completions {
        #[arg(value_enum)]
        shell: clap_complete::Shell,
    },
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    setup_tracing(cli.verbose);
    dispatch::run_cli(cli)
}

fn setup_tracing(verbose: u8) {
    let level = match verbose {
        0 => tracing::Level::WARN,
        1 => tracing::Level::INFO,
        2 => tracing::Level::DEBUG,
        _ => tracing::Level::TRACE,
    };
    let filter = EnvFilter::try_from_env(LOG_ENV)
        .unwrap_or_else(|_| EnvFilter::new(level.as_str().to_ascii_lowercase()));

    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .try_init();
}
