//! Wizsync Session
//!
//! Client side of the server-authoritative wizard session:
//! - [`WizardSessionClient`]: creation, navigation, validation, actions, state and result
//! - [`RevisionConflictRetrier`]: bounded optimistic-concurrency retries
//! - [`SessionTransport`]: the RPC seam, with [`HttpSessionTransport`] over reqwest
//!
//! # Example
//!
//! ```rust,ignore
//! use std::sync::Arc;
//! use wizsync_session::{HttpSessionTransport, WizardSessionClient};
//!
//! let transport = HttpSessionTransport::new("http://localhost:4000/api")?;
//! let client = WizardSessionClient::new(Arc::new(transport));
//! let id = client.create_session("beleidsscan-wizard", None).await?;
//! client.navigate(&"website-selection".into()).await?;
//! ```

#![warn(missing_docs)]
#![warn(unreachable_pub)]

mod client;
mod error;
mod http;
pub mod phase;
mod retrier;
mod transport;

pub use client::WizardSessionClient;
pub use error::{PrerequisiteFailure, SessionError};
pub use http::{decode_error, HttpSessionTransport, DEFAULT_REQUEST_TIMEOUT};
pub use phase::{ClientPhase, PhaseKind};
pub use retrier::{RevisionConflictRetrier, DEFAULT_MAX_ATTEMPTS};
pub use transport::{ActionOutcome, CreateSessionRequest, SessionTransport, ValidationOutcome};

/// Version of this crate
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
