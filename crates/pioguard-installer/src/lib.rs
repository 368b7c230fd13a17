mod coordinator;
mod flags;
mod fs_utils;
mod layout;
mod lock;
mod reporter;
mod toolchain;
mod types;

pub use coordinator::{Coordinator, InstallationState};
pub use flags::{
    FileFlagStore, FlagStore, MemoryFlagStore, INSTALLED_VERSION_KEY, INSTALL_COMPLETED_KEY,
    LAST_FAILURE_KEY,
};
pub use layout::{default_user_prefix, CacheLayout, PrefixLayout, LOCK_FILE_NAME};
pub use lock::{current_unix_timestamp, InstallLock, LockGuard};
pub use reporter::{LogReporter, NullReporter, ProgressEvent, ProgressPhase, ProgressReporter};
pub use toolchain::{CommandToolchain, Toolchain, CACHE_DIR_ENV, PRERELEASE_ENV};
pub use types::{HolderIdentity, InstallContext, InstallationOutcome, LockStatus};
