//! Wizsync Draft
//!
//! Local persistence for the wizard:
//! - [`DraftStore`]: debounced autosave, synchronous unload flush, restore offers
//! - [`SelectionCache`]: selected websites per query
//! - [`ProgressSnapshots`]: last applied scan progress per run
//! - [`LocalStore`]: the key/value seam, with [`MemoryStore`] and [`FileStore`]
//!
//! Storage failures degrade to "no draft"; only [`DraftStore::save_draft_now`]
//! reports them.
//!
//! # Example
//!
//! ```rust,ignore
//! use std::sync::Arc;
//! use wizsync_draft::{DraftStore, DraftStoreConfig, MemoryStore};
//!
//! let drafts = DraftStore::new(Arc::new(MemoryStore::new()), DraftStoreConfig::default(), move || ui.snapshot());
//! drafts.save_draft();       // on every edit
//! drafts.save_draft_sync();  // on unload
//! ```

#![warn(missing_docs)]
#![warn(unreachable_pub)]

mod draft_store;
mod error;
pub mod keys;
mod progress;
mod selection;
mod store;

pub use draft_store::{
    DraftStore, DraftStoreConfig, SnapshotFn, DEFAULT_DEBOUNCE, DEFAULT_INSTANCE,
    DEFAULT_MAX_AGE_HOURS,
};
pub use error::StorageError;
pub use progress::{ProgressSnapshot, ProgressSnapshots};
pub use selection::SelectionCache;
pub use store::{read_json, write_json, FileStore, LocalStore, MemoryStore};

/// Version of this crate
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
