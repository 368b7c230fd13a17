use semver::{Prerelease, Version, VersionReq};

/// Outcome of comparing the installed toolchain against the requirement.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct VersionVerdict {
    pub current: bool,
    pub prerelease_channel: bool,
}

/// Decides whether a locally installed toolchain is good enough for the
/// running extension. Never touches the filesystem or the network.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VersionOracle {
    requirement: VersionReq,
    prerelease_channel: bool,
    extension_version_valid: bool,
}

impl VersionOracle {
    /// Builds an oracle for the running extension, deriving the prerelease
    /// channel from its version. A malformed extension version makes every
    /// verdict "not current".
    pub fn new(extension_version: &str, requirement: VersionReq) -> Self {
        let extension_version = parse_loose(extension_version);
        Self {
            requirement,
            prerelease_channel: extension_version
                .as_ref()
                .is_some_and(|version| !version.pre.is_empty()),
            extension_version_valid: extension_version.is_some(),
        }
    }

    pub fn prerelease_channel(&self) -> bool {
        self.prerelease_channel
    }

    pub fn requirement(&self) -> &VersionReq {
        &self.requirement
    }

    pub fn verdict(&self, installed: Option<&str>) -> VersionVerdict {
        VersionVerdict {
            current: self.is_current(installed),
            prerelease_channel: self.prerelease_channel,
        }
    }

    fn is_current(&self, installed: Option<&str>) -> bool {
        if !self.extension_version_valid {
            return false;
        }
        let Some(installed) = installed.and_then(parse_loose) else {
            return false;
        };

        if self.prerelease_channel {
            let mut release = installed;
            release.pre = Prerelease::EMPTY;
            return self.requirement.matches(&release);
        }
        self.requirement.matches(&installed)
    }
}

/// Returns true when `version` carries a semver pre-release suffix.
pub fn is_prerelease(version: &str) -> bool {
    parse_loose(version).is_some_and(|version| !version.pre.is_empty())
}

/// Extracts the first version-looking token from a toolchain's `--version`
/// output, e.g. `PlatformIO Core, version 6.1.11`.
pub fn parse_reported_version(output: &str) -> Option<Version> {
    output
        .split(|ch: char| ch.is_whitespace() || ch == ',')
        .filter(|token| !token.is_empty())
        .find_map(|token| {
            let token = token.trim_end_matches(['.', ')']).trim_start_matches('(');
            parse_loose(token).or_else(|| parse_two_component(token))
        })
}

fn parse_loose(raw: &str) -> Option<Version> {
    let trimmed = raw.trim();
    let trimmed = trimmed.strip_prefix('v').unwrap_or(trimmed);
    Version::parse(trimmed).ok()
}

fn parse_two_component(raw: &str) -> Option<Version> {
    let trimmed = raw.strip_prefix('v').unwrap_or(raw);
    let (major, minor) = trimmed.split_once('.')?;
    if minor.contains('.') {
        return None;
    }
    Some(Version::new(major.parse().ok()?, minor.parse().ok()?, 0))
}
