//! Testing utilities for the wizsync workspace
//!
//! Shared doubles and fixtures:
//! - [`MockSessionServer`]: in-memory session server with revisions and prerequisites
//! - [`ScriptedDocumentSource`] / [`ScriptedProgressSource`]
//! - [`FailingStore`]: local store with injectable failures

#![allow(missing_docs)]

pub mod fixtures;
mod server;
mod sources;
mod store;

pub use server::{MockSessionServer, DEFINITION_ID};
pub use wizsync_model::steps::actions::{CREATE_QUERY, GENERATE_SUGGESTIONS, START_SCAN};
pub use sources::{ScriptedDocumentSource, ScriptedProgressSource};
pub use store::FailingStore;
