//! Wizsync Guard
//!
//! Race-safe delivery of asynchronous results:
//! - [`AsyncLoadGuard`]: apply by issuance, drop stale and duplicate responses
//! - [`ResourceLoader`]: shared state fed only through guarded loads, with [`RetryHandle`]
//! - [`DocumentLoader`]: documents per query, array-shape checked
//! - [`ScanMonitor`]: push + polling progress with a cap and a stop path
//!
//! # Example
//!
//! ```rust,ignore
//! use wizsync_guard::AsyncLoadGuard;
//!
//! let guard = AsyncLoadGuard::default();
//! let a = guard.issue("q1").unwrap();
//! let b = guard.issue("q2").unwrap();
//! assert!(!guard.accept(&a).is_applied()); // user moved on
//! assert!(guard.accept(&b).is_applied());
//! ```

#![warn(missing_docs)]
#![warn(unreachable_pub)]

mod documents;
mod error;
mod guard;
mod loader;
mod progress;

pub use documents::{parse_documents, DocumentLoader, DocumentSource, HttpDocumentSource};
pub use error::LoadError;
pub use guard::{AsyncLoadGuard, Resolution, Ticket, DEFAULT_DEDUP_WINDOW};
pub use loader::{Fetcher, LoadOutcome, LoadState, ResourceLoader, RetryHandle};
pub use progress::{
    CompletionFn, HttpProgressSource, ProgressSource, ScanMonitor, ScanMonitorConfig, ScanView,
    DEFAULT_MAX_POLLS, DEFAULT_POLL_INTERVAL,
};

/// Version of this crate
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
