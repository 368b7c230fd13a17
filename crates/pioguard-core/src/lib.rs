mod settings;
mod version;

pub use settings::{InstallerSettings, Settings, ToolchainSettings, DEFAULT_SUSPENDED_MESSAGE};
pub use version::{is_prerelease, parse_reported_version, VersionOracle, VersionVerdict};
