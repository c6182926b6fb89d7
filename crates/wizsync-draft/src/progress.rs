//! Scan progress snapshots, one per run

use crate::keys::{progress_key, PROGRESS_PREFIX};
use crate::store::{read_json, write_json, LocalStore};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use wizsync_model::{RunId, ScanProgress};

/// Stored progress with its capture time
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProgressSnapshot {
    /// Last applied progress
    pub progress: ScanProgress,
    /// When it was applied
    pub recorded_at: DateTime<Utc>,
}

/// Last applied progress per scan run
#[derive(Clone)]
pub struct ProgressSnapshots {
    store: Arc<dyn LocalStore>,
}

impl std::fmt::Debug for ProgressSnapshots {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ProgressSnapshots").finish_non_exhaustive()
    }
}

impl ProgressSnapshots {
    /// Snapshots over `store`
    #[must_use]
    pub fn new(store: Arc<dyn LocalStore>) -> Self {
        Self { store }
    }

    /// Overwrite the snapshot for `progress.run_id`
    pub fn record(&self, progress: &ScanProgress) {
        let key = progress_key(&progress.run_id);
        let snapshot = ProgressSnapshot {
            progress: progress.clone(),
            recorded_at: Utc::now(),
        };
        if let Err(e) = write_json(self.store.as_ref(), &key, &snapshot) {
            tracing::warn!(key = %key, error = %e, "failed to persist progress");
        }
    }

    /// Snapshot for `run`
    #[must_use]
    pub fn load(&self, run: &RunId) -> Option<ProgressSnapshot> {
        let key = progress_key(run);
        read_json(self.store.as_ref(), &key).unwrap_or_else(|e| {
            tracing::warn!(key = %key, error = %e, "progress snapshot unreadable");
            None
        })
    }

    /// Forget the snapshot for `run`
    pub fn clear(&self, run: &RunId) {
        let key = progress_key(run);
        if let Err(e) = self.store.remove(&key) {
            tracing::warn!(key = %key, error = %e, "failed to clear progress");
        }
    }

    /// Runs with a stored snapshot
    #[must_use]
    pub fn runs(&self) -> Vec<RunId> {
        self.store
            .keys(PROGRESS_PREFIX)
            .map(|keys| {
                keys.iter()
                    .filter_map(|k| k.strip_prefix(PROGRESS_PREFIX))
                    .map(RunId::new)
                    .collect()
            })
            .unwrap_or_default()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::MemoryStore;
    use wizsync_model::ScanStatus;

    #[test]
    fn snapshot_is_replaced_then_cleared() {
        let snapshots = ProgressSnapshots::new(Arc::new(MemoryStore::new()));
        let run = RunId::new("r1");
        let mut progress = ScanProgress {
            run_id: run.clone(),
            status: ScanStatus::Running,
            progress: 10,
            documents_found: 3,
            current_step: None,
            error: None,
        };
        snapshots.record(&progress);
        progress.progress = 60;
        snapshots.record(&progress);

        assert_eq!(snapshots.load(&run).map(|s| s.progress.progress), Some(60));
        assert_eq!(snapshots.runs(), vec![run.clone()]);

        snapshots.clear(&run);
        assert!(snapshots.load(&run).is_none());
    }
}
