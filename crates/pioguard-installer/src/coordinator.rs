use pioguard_core::{Settings, VersionOracle};
use std::any::Any;
use std::collections::BTreeMap;
use std::panic::{self, AssertUnwindSafe};
use std::path::PathBuf;
use tracing::{debug, warn};

use crate::flags::{FlagStore, INSTALLED_VERSION_KEY, INSTALL_COMPLETED_KEY, LAST_FAILURE_KEY};
use crate::{
    CacheLayout, InstallContext, InstallLock, InstallationOutcome, ProgressEvent, ProgressPhase,
    ProgressReporter, Toolchain,
};

enum ExclusiveRun {
    Installed,
    LostRace,
    Failed(String),
}

const KEEP_WINDOW_OPEN_NOTICE: &str =
    "Please don't close this window and don't open other folders until this process is completed.";

/// Per-process state fixed at activation.
pub struct InstallationState<'a> {
    flags: &'a dyn FlagStore,
    settings: &'a Settings,
    layout: CacheLayout,
    prerelease_channel: bool,
    persisted_flags: BTreeMap<String, String>,
}

impl InstallationState<'_> {
    pub fn layout(&self) -> &CacheLayout {
        &self.layout
    }

    pub fn prerelease_channel(&self) -> bool {
        self.prerelease_channel
    }

    /// Flags as they were read when the coordinator was constructed.
    pub fn persisted_flags(&self) -> &BTreeMap<String, String> {
        &self.persisted_flags
    }

    fn previously_installed(&self) -> bool {
        self.persisted_flags
            .get(INSTALL_COMPLETED_KEY)
            .is_some_and(|value| value == "true")
    }
}

/// Makes sure exactly one process on the machine installs the toolchain.
pub struct Coordinator<'a> {
    state: InstallationState<'a>,
    oracle: VersionOracle,
    lock: InstallLock,
}

impl<'a> Coordinator<'a> {
    /// The prerelease channel is derived from `extension_version` here and
    /// never changes afterwards. A malformed version keeps the toolchain
    /// "not current" for the lifetime of the coordinator.
    pub fn new(
        flags: &'a dyn FlagStore,
        settings: &'a Settings,
        cache_dir: impl Into<PathBuf>,
        extension_version: &str,
    ) -> Self {
        let layout = CacheLayout::new(cache_dir);
        let persisted_flags = flags.snapshot().unwrap_or_else(|err| {
            warn!(error = %err, "failed to read persisted flags; continuing without them");
            BTreeMap::new()
        });
        let oracle =
            VersionOracle::new(extension_version, settings.toolchain.requirement.clone());
        let prerelease_channel = oracle.prerelease_channel();
        let lock = InstallLock::for_layout(&layout);

        Self {
            state: InstallationState {
                flags,
                settings,
                layout,
                prerelease_channel,
                persisted_flags,
            },
            oracle,
            lock,
        }
    }

    pub fn state(&self) -> &InstallationState<'a> {
        &self.state
    }

    pub fn lock(&self) -> &InstallLock {
        &self.lock
    }

    /// Runs the inspect, decide, install, report protocol once.
    ///
    /// Every failure is turned into [`InstallationOutcome::InstallationFailed`];
    /// nothing escapes as an error or a panic. Whenever the fast path is not
    /// taken the lock file is gone by the time this returns.
    pub fn ensure_ready(
        &self,
        toolchain: &dyn Toolchain,
        reporter: &dyn ProgressReporter,
    ) -> InstallationOutcome {
        emit(
            reporter,
            ProgressPhase::Verifying,
            "Verifying toolchain installation...",
        );

        if let Err(err) = self.state.layout.ensure_cache_dir() {
            self.clear_lock();
            return self.fail(reporter, format!("{err:#}"));
        }

        let installed = toolchain.installed_version();
        let verdict = self.oracle.verdict(installed.as_deref());
        debug!(
            installed = installed.as_deref().unwrap_or("none"),
            requirement = %self.oracle.requirement(),
            prerelease_channel = verdict.prerelease_channel,
            current = verdict.current,
            "toolchain version verdict"
        );
        if verdict.current {
            emit(reporter, ProgressPhase::Ready, "Toolchain is up to date.");
            return InstallationOutcome::AlreadyCurrent;
        }

        if self.lock.is_held() {
            let outcome = self.suspend(reporter);
            self.clear_lock();
            return outcome;
        }

        let outcome = self.install_exclusive(toolchain, reporter);
        self.clear_lock();

        match outcome {
            ExclusiveRun::Installed => self.succeed(toolchain, reporter),
            ExclusiveRun::LostRace => self.suspend(reporter),
            ExclusiveRun::Failed(reason) => self.fail(reporter, reason),
        }
    }

    fn install_exclusive(
        &self,
        toolchain: &dyn Toolchain,
        reporter: &dyn ProgressReporter,
    ) -> ExclusiveRun {
        let message = if self.state.previously_installed() {
            "Upgrading toolchain..."
        } else {
            "Installing toolchain..."
        };
        emit(reporter, ProgressPhase::Installing, message);

        let guard = match self.lock.acquire() {
            Ok(Some(guard)) => guard,
            Ok(None) => return ExclusiveRun::LostRace,
            Err(err) => return ExclusiveRun::Failed(format!("{err:#}")),
        };
        emit(reporter, ProgressPhase::Installing, KEEP_WINDOW_OPEN_NOTICE);

        let ctx = InstallContext {
            cache_dir: self.state.layout.cache_dir(),
            prerelease_channel: self.state.prerelease_channel,
        };
        let result = match panic::catch_unwind(AssertUnwindSafe(|| toolchain.install(&ctx))) {
            Ok(Ok(())) => ExclusiveRun::Installed,
            Ok(Err(err)) => ExclusiveRun::Failed(format!("{err:#}")),
            Err(payload) => ExclusiveRun::Failed(format!(
                "toolchain installer panicked: {}",
                panic_message(payload.as_ref())
            )),
        };

        if let Err(err) = guard.release() {
            warn!(error = %err, "failed to release install lock");
        }
        result
    }

    fn succeed(
        &self,
        toolchain: &dyn Toolchain,
        reporter: &dyn ProgressReporter,
    ) -> InstallationOutcome {
        self.record_flag(INSTALL_COMPLETED_KEY, "true");
        if let Some(version) = toolchain.installed_version() {
            self.record_flag(INSTALLED_VERSION_KEY, &version);
        }
        emit(
            reporter,
            ProgressPhase::Installed,
            "Toolchain installed successfully.",
        );
        InstallationOutcome::InstalledSuccessfully
    }

    fn suspend(&self, reporter: &dyn ProgressReporter) -> InstallationOutcome {
        emit(
            reporter,
            ProgressPhase::Suspended,
            self.state.settings.installer.suspended_message.as_str(),
        );
        InstallationOutcome::SuspendedByOther
    }

    fn fail(&self, reporter: &dyn ProgressReporter, reason: String) -> InstallationOutcome {
        self.record_flag(LAST_FAILURE_KEY, &reason);
        emit(
            reporter,
            ProgressPhase::Failed,
            format!("Failed to install toolchain: {reason}"),
        );
        InstallationOutcome::InstallationFailed(reason)
    }

    fn clear_lock(&self) {
        if let Err(err) = self.lock.clear() {
            warn!(error = %err, "failed to clear install lock");
        }
    }

    fn record_flag(&self, key: &str, value: &str) {
        if let Err(err) = self.state.flags.set(key, value) {
            warn!(key, error = %err, "failed to persist flag");
        }
    }
}

fn emit(reporter: &dyn ProgressReporter, phase: ProgressPhase, message: impl Into<String>) {
    reporter.report(&ProgressEvent::new(phase, message));
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(message) = payload.downcast_ref::<&str>() {
        return (*message).to_string();
    }
    if let Some(message) = payload.downcast_ref::<String>() {
        return message.clone();
    }
    "unknown panic".to_string()
}
