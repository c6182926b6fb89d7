//! Local store key layout
//!
//! One draft per wizard instance, one website selection per query, one
//! progress snapshot per scan run. All share one store.

use wizsync_model::{QueryId, RunId};

/// Namespace shared by every wizsync record
pub const NAMESPACE: &str = "wizsync";

/// Prefix of draft records
pub const DRAFT_PREFIX: &str = "wizsync:draft:";

/// Prefix of website selection records
pub const SELECTION_PREFIX: &str = "wizsync:selected-websites:";

/// Prefix of scan progress records
pub const PROGRESS_PREFIX: &str = "wizsync:progress:";

/// Key of the draft for a wizard instance
#[must_use]
pub fn draft_key(instance: &str) -> String {
    format!("{DRAFT_PREFIX}{instance}")
}

/// Key of the website selection for a query
#[must_use]
pub fn selection_key(query: &QueryId) -> String {
    format!("{SELECTION_PREFIX}{query}")
}

/// Key of the progress snapshot for a run
#[must_use]
pub fn progress_key(run: &RunId) -> String {
    format!("{PROGRESS_PREFIX}{run}")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn keys_are_namespaced() {
        assert_eq!(draft_key("beleidsscan"), "wizsync:draft:beleidsscan");
        assert_eq!(selection_key(&QueryId::new("q1")), "wizsync:selected-websites:q1");
        assert_eq!(progress_key(&RunId::new("r7")), "wizsync:progress:r7");
        assert!(DRAFT_PREFIX.starts_with(NAMESPACE));
    }
}
