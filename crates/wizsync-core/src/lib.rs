//! Wizsync Core
//!
//! Wizard session synchronization and reconciliation, assembled:
//! - [`WizardCoordinator`]: UI state, session client, drafts, reconciliation, documents and scans
//! - [`WizsyncConfig`]: TOML configuration with defaults and an environment override
//! - [`WizsyncError`]: aggregate error of the coordinator
//!
//! # Example
//!
//! ```rust,ignore
//! use wizsync_core::prelude::*;
//!
//! let wizard = WizardCoordinator::from_config(WizsyncConfig::load(None)?)?;
//! let verdict = wizard.start().await?;
//! if verdict.has_conflict {
//!     wizard.resolve(ConflictResolution::MergeDrafts).await;
//! }
//! wizard.edit(|ui| ui.onderwerp = "fietsparkeren".into());
//! wizard.create_query().await?;
//! ```

#![warn(missing_docs)]
#![warn(unreachable_pub)]

pub mod config;
mod coordinator;
mod error;

pub use config::{ConfigError, WizsyncConfig};
pub use coordinator::{Backends, NavigationOutcome, WizardCoordinator};
pub use error::{Result, WizsyncError};

/// Commonly used types
pub mod prelude {
    pub use crate::config::WizsyncConfig;
    pub use crate::coordinator::{Backends, NavigationOutcome, WizardCoordinator};
    pub use crate::error::WizsyncError;
    pub use wizsync_draft::{DraftStore, LocalStore};
    pub use wizsync_guard::{LoadOutcome, ScanView};
    pub use wizsync_model::{LocalDraft, SessionId, StepIndex, WizardSession};
    pub use wizsync_reconcile::{ConflictResolution, ReconciliationResult, ResolvedState};
    pub use wizsync_session::{SessionError, WizardSessionClient};
}

/// Version of this crate
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
