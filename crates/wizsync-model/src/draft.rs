//! Client-owned draft of the in-progress wizard
//!
//! The draft mirrors the semantic fields of the server context plus view
//! state the server never sees (filters, search boxes, scroll offsets).

use crate::document::Document;
use crate::ids::QueryId;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

/// One-based linear position of a wizard step
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct StepIndex(pub usize);

impl StepIndex {
    /// The first step
    pub const FIRST: Self = Self(1);

    /// Raw value
    #[inline]
    #[must_use]
    pub fn value(self) -> usize {
        self.0
    }
}

impl Default for StepIndex {
    fn default() -> Self {
        Self::FIRST
    }
}

impl fmt::Display for StepIndex {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "step {}", self.0)
    }
}

/// Website list ordering
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum WebsiteSort {
    /// Suggestion relevance
    #[default]
    Relevance,
    /// Alphabetical
    Name,
    /// Website type
    Type,
}

/// View state of the website selection step
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct WebsiteView {
    /// Free-text search box
    pub search_query: String,
    /// Website type filter
    pub filter_type: Option<String>,
    /// Ordering
    pub sort_by: WebsiteSort,
    /// List scroll offset in pixels
    pub scroll_position: u32,
}

impl WebsiteView {
    /// Whether the user narrowed or reordered the list
    #[must_use]
    pub fn is_customized(&self) -> bool {
        !self.search_query.trim().is_empty()
            || self.filter_type.is_some()
            || self.sort_by != WebsiteSort::default()
    }
}

/// Review-status filter on the document step
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DocumentFilter {
    /// No filter
    #[default]
    All,
    /// Only unreviewed
    Pending,
    /// Only approved
    Approved,
    /// Only rejected
    Rejected,
}

/// Publication-date filter on the document step
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DateFilter {
    /// No filter
    #[default]
    All,
    /// Last week
    Week,
    /// Last month
    Month,
    /// Last year
    Year,
}

/// Document list ordering
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DocumentSort {
    /// Relevance score
    #[default]
    Relevance,
    /// Publication date
    Date,
    /// Title
    Title,
}

/// View state of the document review step
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct DocumentView {
    /// Review-status filter
    pub filter: DocumentFilter,
    /// Free-text search box
    pub search_query: String,
    /// Document type filter
    pub type_filter: Option<String>,
    /// Publication-date filter
    pub date_filter: DateFilter,
    /// Source website filter
    pub website_filter: Option<String>,
    /// Ordering
    pub sort_by: DocumentSort,
    /// Documents ticked for a bulk action
    pub selected_ids: Vec<String>,
    /// List scroll offset in pixels
    pub scroll_position: u32,
}

impl DocumentView {
    /// Whether any filter, ordering or selection differs from the default
    #[must_use]
    pub fn is_customized(&self) -> bool {
        self.filter != DocumentFilter::default()
            || !self.search_query.trim().is_empty()
            || self.type_filter.is_some()
            || self.date_filter != DateFilter::default()
            || self.website_filter.is_some()
            || self.sort_by != DocumentSort::default()
            || !self.selected_ids.is_empty()
    }
}

/// Locally persisted wizard draft
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct LocalDraft {
    /// Step the user was on
    pub step: StepIndex,
    /// Research topic
    pub onderwerp: String,
    /// Government layer
    pub overheidslaag: Option<String>,
    /// Government entity
    pub selected_entity: Option<String>,
    /// Query resource created in step 1
    pub query_id: Option<QueryId>,
    /// Website ids chosen in step 2
    pub selected_websites: Vec<String>,
    /// Step 2 view state
    pub website_view: WebsiteView,
    /// Documents loaded in step 3
    pub documents: Vec<Document>,
    /// Step 3 view state
    pub document_view: DocumentView,
    /// Capture time
    pub timestamp: DateTime<Utc>,
}

impl LocalDraft {
    /// Empty draft positioned on `step`
    #[must_use]
    pub fn at_step(step: StepIndex) -> Self {
        Self {
            step,
            ..Self::default()
        }
    }

    /// Copy with the capture time zeroed, for content comparison
    #[must_use]
    pub fn without_timestamp(&self) -> Self {
        Self {
            timestamp: DateTime::<Utc>::default(),
            ..self.clone()
        }
    }

    /// Same content ignoring capture time
    #[must_use]
    pub fn same_content(&self, other: &Self) -> bool {
        self.without_timestamp() == other.without_timestamp()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_draft_starts_on_first_step() {
        let draft = LocalDraft::default();
        assert_eq!(draft.step, StepIndex::FIRST);
        assert!(!draft.website_view.is_customized());
        assert!(!draft.document_view.is_customized());
    }

    #[test]
    fn same_content_ignores_timestamp() {
        let a = LocalDraft {
            onderwerp: "fietsparkeren".into(),
            timestamp: Utc::now(),
            ..LocalDraft::default()
        };
        let b = LocalDraft {
            timestamp: a.timestamp + chrono::Duration::seconds(30),
            ..a.clone()
        };
        assert!(a.same_content(&b));
        assert_ne!(a, b);
    }

    #[test]
    fn partial_payload_fills_defaults() {
        let draft: LocalDraft =
            serde_json::from_str(r#"{"step":2,"onderwerp":"geluid"}"#).unwrap();
        assert_eq!(draft.step, StepIndex(2));
        assert!(draft.selected_websites.is_empty());
    }
}
