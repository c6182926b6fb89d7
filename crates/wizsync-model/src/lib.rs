//! Wizsync Model
//!
//! Data model shared by every wizsync crate:
//! - [`WizardSession`]: the server-owned session record with its [`Revision`]
//! - [`LocalDraft`]: the client-owned draft with view-only state
//! - [`SessionStateCodec`]: pure mapping between the two
//! - [`has_meaningful_state`]: the gate deciding whether a draft is worth keeping
//!
//! # Example
//!
//! ```rust,ignore
//! use wizsync_model::{SessionStateCodec, has_meaningful_state};
//!
//! let codec = SessionStateCodec::default();
//! let draft = codec.draft_from_session(&session);
//! assert_eq!(has_meaningful_state(&draft), session.context.has_usable_fields());
//! ```

#![warn(missing_docs)]
#![warn(unreachable_pub)]

mod codec;
mod context;
mod document;
mod draft;
mod ids;
mod meaningful;
mod session;
pub mod steps;

pub use codec::SessionStateCodec;
pub use context::{fields, SessionContext};
pub use document::{Document, ReviewStatus, ScanProgress, ScanStatus};
pub use draft::{
    DateFilter, DocumentFilter, DocumentSort, DocumentView, LocalDraft, StepIndex, WebsiteSort,
    WebsiteView,
};
pub use ids::{ActionId, QueryId, RunId, SessionId, StepId};
pub use meaningful::{
    document_step_is_meaningful, has_meaningful_state, query_step_is_meaningful,
    website_step_is_meaningful,
};
pub use session::{Revision, SessionStatus, WizardResult, WizardSession};
pub use steps::{LayoutError, StepLayout};

/// Version of this crate
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
