//! Wizsync Reconcile
//!
//! Detects divergence between the local draft and the server session when a
//! session is (re)attached, and applies one of four user-chosen resolutions:
//! - [`ConflictResolution::UseClientDraft`]
//! - [`ConflictResolution::UseServerState`]
//! - [`ConflictResolution::MergeDrafts`] (server wins per field)
//! - [`ConflictResolution::IgnoreConflict`] (never fails)
//!
//! # Example
//!
//! ```rust,ignore
//! let verdict = engine.attach(drafts.check_for_restore()).await;
//! if verdict.has_conflict {
//!     let resolved = engine.use_server_state().expect("pending conflict");
//!     ui.load(resolved.draft);
//! }
//! ```

#![warn(missing_docs)]
#![warn(unreachable_pub)]

mod engine;
mod verdict;

pub use engine::{ConflictResolution, ReconciliationEngine, ResolvedState};
pub use verdict::{detect, ReconciliationResult};

/// Version of this crate
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
