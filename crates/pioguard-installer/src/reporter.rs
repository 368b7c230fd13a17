use tracing::{error, info};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProgressPhase {
    Verifying,
    Ready,
    Suspended,
    Installing,
    Installed,
    Failed,
}

impl ProgressPhase {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Verifying => "verifying",
            Self::Ready => "ready",
            Self::Suspended => "suspended",
            Self::Installing => "installing",
            Self::Installed => "installed",
            Self::Failed => "failed",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProgressEvent {
    pub phase: ProgressPhase,
    pub message: String,
}

impl ProgressEvent {
    pub fn new(phase: ProgressPhase, message: impl Into<String>) -> Self {
        Self {
            phase,
            message: message.into(),
        }
    }
}

/// Receives coordinator state transitions.
///
/// Reporting is infallible from the coordinator's point of view;
/// implementations swallow their own output failures.
pub trait ProgressReporter {
    fn report(&self, event: &ProgressEvent);
}

#[derive(Debug, Default, Clone, Copy)]
pub struct NullReporter;

impl ProgressReporter for NullReporter {
    fn report(&self, _event: &ProgressEvent) {}
}

/// Forwards progress to `tracing`.
#[derive(Debug, Default, Clone, Copy)]
pub struct LogReporter;

impl ProgressReporter for LogReporter {
    fn report(&self, event: &ProgressEvent) {
        match event.phase {
            ProgressPhase::Failed => error!(phase = event.phase.as_str(), "{}", event.message),
            _ => info!(phase = event.phase.as_str(), "{}", event.message),
        }
    }
}
