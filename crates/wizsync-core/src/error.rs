//! Aggregate error of the coordinator

use crate::config::ConfigError;
use wizsync_draft::StorageError;
use wizsync_guard::LoadError;
use wizsync_model::StepIndex;
use wizsync_session::SessionError;

/// Any failure surfaced by [`crate::WizardCoordinator`]
#[derive(Debug, thiserror::Error)]
pub enum WizsyncError {
    /// Session server interaction
    #[error(transparent)]
    Session(#[from] SessionError),

    /// Local storage (manual save only)
    #[error(transparent)]
    Storage(#[from] StorageError),

    /// Guarded load
    #[error(transparent)]
    Load(#[from] LoadError),

    /// Configuration
    #[error(transparent)]
    Config(#[from] ConfigError),

    /// Step index outside the wizard layout
    #[error("no step at index {0}")]
    UnknownStep(StepIndex),

    /// Action needs a value the wizard does not have yet
    #[error("missing {0}")]
    Missing(&'static str),

    /// Action output without an expected field
    #[error("action output lacks '{0}'")]
    MalformedOutput(&'static str),
}

/// Result alias
pub type Result<T> = std::result::Result<T, WizsyncError>;

impl WizsyncError {
    /// Check if the user can carry on (retry, pick another step, fix input)
    #[must_use]
    pub fn is_recoverable(&self) -> bool {
        match self {
            Self::Session(e) => e.is_prerequisite() || e.is_revision_conflict() || e.is_unreachable(),
            Self::Load(e) => e.is_retryable(),
            Self::Storage(_) | Self::Missing(_) => true,
            Self::Config(_) | Self::UnknownStep(_) | Self::MalformedOutput(_) => false,
        }
    }
}
