//! Meaningful-state predicates
//!
//! A draft is only persisted or offered for restore when the user actually
//! did something. Each step is judged on its own so that merely visiting a
//! step never counts.

use crate::draft::LocalDraft;

/// Step 1: topic, government layer or entity chosen
#[must_use]
pub fn query_step_is_meaningful(draft: &LocalDraft) -> bool {
    !draft.onderwerp.trim().is_empty()
        || draft.overheidslaag.as_deref().is_some_and(|s| !s.trim().is_empty())
        || draft.selected_entity.as_deref().is_some_and(|s| !s.trim().is_empty())
}

/// Step 2: websites selected or the list narrowed/reordered
#[must_use]
pub fn website_step_is_meaningful(draft: &LocalDraft) -> bool {
    !draft.selected_websites.is_empty() || draft.website_view.is_customized()
}

/// Step 3: documents present or the list filtered/selected
#[must_use]
pub fn document_step_is_meaningful(draft: &LocalDraft) -> bool {
    !draft.documents.is_empty() || draft.document_view.is_customized()
}

/// Whether `draft` carries anything worth restoring
///
/// Pure: depends only on the draft's content, never on its step or time.
#[must_use]
pub fn has_meaningful_state(draft: &LocalDraft) -> bool {
    query_step_is_meaningful(draft)
        || website_step_is_meaningful(draft)
        || document_step_is_meaningful(draft)
}
