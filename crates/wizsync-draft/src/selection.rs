//! Website selection records, one per query

use crate::keys::{selection_key, SELECTION_PREFIX};
use crate::store::{read_json, write_json, LocalStore};
use chrono::{DateTime, Utc};
use moka::sync::Cache;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use wizsync_model::QueryId;

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct SelectionRecord {
    query_id: QueryId,
    websites: Vec<String>,
    saved_at: DateTime<Utc>,
}

/// Queries kept in memory by default
pub const DEFAULT_SELECTION_CAPACITY: u64 = 256;

/// Selected website ids per query, memoised in front of the local store
///
/// Constructed and injected explicitly; [`SelectionCache::reset`] drops the
/// in-memory layer so tests start clean.
pub struct SelectionCache {
    store: Arc<dyn LocalStore>,
    memo: Cache<QueryId, Vec<String>>,
}

impl std::fmt::Debug for SelectionCache {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SelectionCache")
            .field("memoised", &self.memo.entry_count())
            .finish_non_exhaustive()
    }
}

impl SelectionCache {
    /// Cache over `store`
    #[inline]
    #[must_use]
    pub fn new(store: Arc<dyn LocalStore>) -> Self {
        Self::with_capacity(store, DEFAULT_SELECTION_CAPACITY)
    }

    /// Cache over `store` memoising at most `capacity` queries
    #[must_use]
    pub fn with_capacity(store: Arc<dyn LocalStore>, capacity: u64) -> Self {
        Self {
            store,
            memo: Cache::new(capacity),
        }
    }

    /// Selection saved for `query`; empty when none or unreadable
    #[must_use]
    pub fn load(&self, query: &QueryId) -> Vec<String> {
        if let Some(hit) = self.memo.get(query) {
            return hit;
        }

        let key = selection_key(query);
        let websites = match read_json::<SelectionRecord>(self.store.as_ref(), &key) {
            Ok(Some(record)) => record.websites,
            Ok(None) => return Vec::new(),
            Err(e) => {
                tracing::warn!(key = %key, error = %e, "selection unreadable");
                return Vec::new();
            }
        };
        self.memo.insert(query.clone(), websites.clone());
        websites
    }

    /// Remember `websites` for `query`
    pub fn save(&self, query: &QueryId, websites: &[String]) {
        self.memo.insert(query.clone(), websites.to_vec());
        let record = SelectionRecord {
            query_id: query.clone(),
            websites: websites.to_vec(),
            saved_at: Utc::now(),
        };
        let key = selection_key(query);
        if let Err(e) = write_json(self.store.as_ref(), &key, &record) {
            tracing::warn!(key = %key, error = %e, "failed to persist selection");
        }
    }

    /// Forget the selection for `query`
    pub fn clear(&self, query: &QueryId) {
        self.memo.invalidate(query);
        let key = selection_key(query);
        if let Err(e) = self.store.remove(&key) {
            tracing::warn!(key = %key, error = %e, "failed to clear selection");
        }
    }

    /// Queries with a persisted selection
    #[must_use]
    pub fn queries(&self) -> Vec<QueryId> {
        match self.store.keys(SELECTION_PREFIX) {
            Ok(keys) => keys
                .iter()
                .filter_map(|k| k.strip_prefix(SELECTION_PREFIX))
                .map(QueryId::new)
                .collect(),
            Err(e) => {
                tracing::warn!(error = %e, "failed to list selections");
                Vec::new()
            }
        }
    }

    /// Drop the in-memory layer; persisted records stay
    pub fn reset(&self) {
        self.memo.invalidate_all();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::MemoryStore;

    #[test]
    fn selection_survives_reset() {
        let store = Arc::new(MemoryStore::new());
        let cache = SelectionCache::new(store.clone());
        let q = QueryId::new("q1");

        cache.save(&q, &["w1".into(), "w2".into()]);
        cache.reset();
        assert_eq!(cache.load(&q), vec!["w1", "w2"]);
        assert_eq!(cache.queries(), vec![q.clone()]);

        cache.clear(&q);
        assert!(cache.load(&q).is_empty());
        assert!(store.is_empty());
    }

    #[test]
    fn memo_answers_without_reading_the_store() {
        let store = Arc::new(MemoryStore::new());
        let cache = SelectionCache::new(store.clone());
        let q = QueryId::new("q1");

        cache.save(&q, &["w1".into()]);
        store.remove(&selection_key(&q)).unwrap();
        assert_eq!(cache.load(&q), vec!["w1"]);

        cache.reset();
        assert!(cache.load(&q).is_empty());
    }

    #[test]
    fn selections_are_per_query() {
        let cache = SelectionCache::new(Arc::new(MemoryStore::new()));
        cache.save(&QueryId::new("q1"), &["w1".into()]);
        assert!(cache.load(&QueryId::new("q2")).is_empty());
    }
}
