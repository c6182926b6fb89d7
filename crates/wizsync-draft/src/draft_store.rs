//! Debounced draft persistence
//!
//! ```text
//! save_draft()        ──debounce──▶ persist
//! save_draft_sync()   ─────────────▶ persist   (cancels pending debounce)
//! save_draft_now()    ─────────────▶ persist   (reports errors)
//! ```
//!
//! `persist` snapshots live state through the caller's provider, drops
//! drafts without meaningful state, and skips the write when the stored
//! record already holds the same content.

use crate::error::StorageError;
use crate::keys::draft_key;
use crate::store::{read_json, write_json, LocalStore};
use chrono::Utc;
use parking_lot::Mutex;
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use wizsync_model::{has_meaningful_state, LocalDraft};

/// Default autosave delay
pub const DEFAULT_DEBOUNCE: Duration = Duration::from_millis(1000);

/// Default age after which a draft is no longer offered
pub const DEFAULT_MAX_AGE_HOURS: i64 = 168;

/// Default wizard instance name
pub const DEFAULT_INSTANCE: &str = "beleidsscan";

/// Captures the current wizard UI state
pub type SnapshotFn = Arc<dyn Fn() -> LocalDraft + Send + Sync>;

/// DraftStore settings
#[derive(Debug, Clone)]
pub struct DraftStoreConfig {
    /// Wizard instance the draft slot belongs to
    pub instance: String,
    /// Autosave delay
    pub debounce: Duration,
    /// Drafts older than this are treated as absent
    pub max_age: chrono::Duration,
}

impl Default for DraftStoreConfig {
    fn default() -> Self {
        Self {
            instance: DEFAULT_INSTANCE.to_string(),
            debounce: DEFAULT_DEBOUNCE,
            max_age: chrono::Duration::hours(DEFAULT_MAX_AGE_HOURS),
        }
    }
}

impl DraftStoreConfig {
    /// Set instance name
    #[must_use]
    pub fn with_instance(mut self, instance: impl Into<String>) -> Self {
        self.instance = instance.into();
        self
    }

    /// Set autosave delay
    #[must_use]
    pub fn with_debounce(mut self, debounce: Duration) -> Self {
        self.debounce = debounce;
        self
    }

    /// Set maximum draft age
    #[must_use]
    pub fn with_max_age(mut self, max_age: chrono::Duration) -> Self {
        self.max_age = max_age;
        self
    }
}

struct Inner {
    store: Arc<dyn LocalStore>,
    config: DraftStoreConfig,
    key: String,
    snapshot: SnapshotFn,
    pending_save: Mutex<Option<JoinHandle<()>>>,
    pending_restore: Mutex<Option<LocalDraft>>,
}

/// Local draft slot for one wizard instance
///
/// Cheap to clone; clones share the slot, the pending autosave and the
/// pending restore.
#[derive(Clone)]
pub struct DraftStore {
    inner: Arc<Inner>,
}

impl std::fmt::Debug for DraftStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DraftStore")
            .field("key", &self.inner.key)
            .field("config", &self.inner.config)
            .field("pending_save", &self.has_pending_save())
            .finish_non_exhaustive()
    }
}

impl DraftStore {
    /// Draft slot in `store`, capturing state through `snapshot`
    pub fn new(
        store: Arc<dyn LocalStore>,
        config: DraftStoreConfig,
        snapshot: impl Fn() -> LocalDraft + Send + Sync + 'static,
    ) -> Self {
        let key = draft_key(&config.instance);
        Self {
            inner: Arc::new(Inner {
                store,
                config,
                key,
                snapshot: Arc::new(snapshot),
                pending_save: Mutex::new(None),
                pending_restore: Mutex::new(None),
            }),
        }
    }

    /// Store key of the draft slot
    #[inline]
    #[must_use]
    pub fn key(&self) -> &str {
        &self.inner.key
    }

    /// Settings in use
    #[inline]
    #[must_use]
    pub fn config(&self) -> &DraftStoreConfig {
        &self.inner.config
    }

    /// Schedule an autosave; a later call restarts the delay
    ///
    /// Outside a tokio runtime the save happens immediately.
    pub fn save_draft(&self) {
        let Ok(handle) = tokio::runtime::Handle::try_current() else {
            tracing::debug!(key = %self.inner.key, "no runtime for debounced save, saving now");
            self.inner.persist_logged("autosave");
            return;
        };

        let inner = Arc::clone(&self.inner);
        let delay = inner.config.debounce;
        let task = handle.spawn(async move {
            tokio::time::sleep(delay).await;
            inner.persist_logged("autosave");
        });

        if let Some(previous) = self.inner.pending_save.lock().replace(task) {
            previous.abort();
        }
    }

    /// Snapshot and persist immediately, for unload and visibility handlers
    ///
    /// Storage failures are logged, never returned.
    pub fn save_draft_sync(&self) {
        self.cancel_pending_save();
        self.inner.persist_logged("flush");
    }

    /// Snapshot and persist immediately, reporting failures
    ///
    /// # Errors
    /// The storage failure, so the caller can tell the user
    pub fn save_draft_now(&self) -> Result<(), StorageError> {
        self.cancel_pending_save();
        self.inner.persist().map(|_| ())
    }

    /// Drop a scheduled autosave
    pub fn cancel_pending_save(&self) {
        if let Some(task) = self.inner.pending_save.lock().take() {
            task.abort();
        }
    }

    /// Whether an autosave is scheduled and has not run yet
    #[must_use]
    pub fn has_pending_save(&self) -> bool {
        self.inner
            .pending_save
            .lock()
            .as_ref()
            .is_some_and(|task| !task.is_finished())
    }

    /// Stored draft, if present, meaningful and not stale
    ///
    /// Never modifies the stored record.
    #[must_use]
    pub fn load_draft(&self) -> Option<LocalDraft> {
        let draft = match read_json::<LocalDraft>(self.inner.store.as_ref(), &self.inner.key) {
            Ok(Some(draft)) => draft,
            Ok(None) => return None,
            Err(e) => {
                tracing::warn!(key = %self.inner.key, error = %e, "draft unreadable, treating as absent");
                return None;
            }
        };

        if !has_meaningful_state(&draft) {
            tracing::debug!(key = %self.inner.key, "stored draft has no meaningful state");
            return None;
        }
        let age = Utc::now().signed_duration_since(draft.timestamp);
        if age > self.inner.config.max_age {
            tracing::debug!(key = %self.inner.key, age_hours = age.num_hours(), "stored draft is stale");
            return None;
        }
        Some(draft)
    }

    /// Load the draft and hold it as a pending restore offer
    pub fn check_for_restore(&self) -> Option<LocalDraft> {
        let draft = self.load_draft();
        *self.inner.pending_restore.lock() = draft.clone();
        if draft.is_some() {
            tracing::info!(key = %self.inner.key, "draft available for restore");
        }
        draft
    }

    /// Draft currently offered for restore
    #[must_use]
    pub fn pending_restore(&self) -> Option<LocalDraft> {
        self.inner.pending_restore.lock().clone()
    }

    /// Whether a restore offer is outstanding
    #[must_use]
    pub fn has_pending_restore(&self) -> bool {
        self.inner.pending_restore.lock().is_some()
    }

    /// Dismiss the restore offer; the stored draft stays
    pub fn discard_draft(&self) {
        if self.inner.pending_restore.lock().take().is_some() {
            tracing::debug!(key = %self.inner.key, "restore offer dismissed");
        }
    }

    /// Delete the stored draft and any restore offer
    pub fn clear_draft(&self) {
        self.cancel_pending_save();
        self.inner.pending_restore.lock().take();
        match self.inner.store.remove(&self.inner.key) {
            Ok(()) => tracing::info!(key = %self.inner.key, "draft cleared"),
            Err(e) => tracing::warn!(key = %self.inner.key, error = %e, "failed to clear draft"),
        }
    }

    /// Apply the pending restore offer through `apply`
    ///
    /// Returns `false` when there is nothing to restore.
    pub fn restore_draft(&self, apply: impl FnOnce(&LocalDraft)) -> bool {
        let Some(draft) = self.inner.pending_restore.lock().take() else {
            return false;
        };
        apply(&draft);
        tracing::info!(key = %self.inner.key, step = %draft.step, "draft restored");
        true
    }
}

impl Inner {
    /// Returns whether a record was written
    fn persist(&self) -> Result<bool, StorageError> {
        let mut draft = (self.snapshot)();
        if !has_meaningful_state(&draft) {
            return Ok(false);
        }

        match read_json::<LocalDraft>(self.store.as_ref(), &self.key) {
            Ok(Some(stored)) if stored.same_content(&draft) => return Ok(false),
            Err(e) if !e.is_corrupt() => return Err(e),
            _ => {}
        }

        draft.timestamp = Utc::now();
        write_json(self.store.as_ref(), &self.key, &draft)?;
        Ok(true)
    }

    fn persist_logged(&self, trigger: &'static str) {
        match self.persist() {
            Ok(true) => tracing::debug!(key = %self.key, trigger, "draft saved"),
            Ok(false) => tracing::trace!(key = %self.key, trigger, "draft save skipped"),
            Err(e) => tracing::warn!(key = %self.key, trigger, error = %e, "draft save failed"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::MemoryStore;
    use wizsync_model::StepIndex;

    fn live(state: &Arc<Mutex<LocalDraft>>) -> impl Fn() -> LocalDraft + Send + Sync + 'static {
        let state = Arc::clone(state);
        move || state.lock().clone()
    }

    fn fixture() -> (Arc<MemoryStore>, Arc<Mutex<LocalDraft>>, DraftStore) {
        let store = Arc::new(MemoryStore::new());
        let state = Arc::new(Mutex::new(LocalDraft::default()));
        let drafts = DraftStore::new(store.clone(), DraftStoreConfig::default(), live(&state));
        (store, state, drafts)
    }

    #[test]
    fn empty_state_is_never_written() {
        let (store, _, drafts) = fixture();
        drafts.save_draft_sync();
        assert!(store.is_empty());
    }

    #[test]
    fn repeated_saves_are_byte_identical() {
        let (store, state, drafts) = fixture();
        state.lock().onderwerp = "fietsparkeren".into();

        drafts.save_draft_sync();
        let first = store.get(drafts.key()).unwrap();
        drafts.save_draft_sync();
        let second = store.get(drafts.key()).unwrap();

        assert!(first.is_some());
        assert_eq!(first, second);
    }

    #[test]
    fn discard_keeps_record_clear_removes_it() {
        let (store, state, drafts) = fixture();
        state.lock().overheidslaag = Some("gemeente".into());
        drafts.save_draft_sync();

        assert!(drafts.check_for_restore().is_some());
        drafts.discard_draft();
        assert!(!drafts.has_pending_restore());
        assert!(drafts.load_draft().is_some());

        drafts.check_for_restore();
        drafts.clear_draft();
        assert!(!drafts.has_pending_restore());
        assert!(store.get(drafts.key()).unwrap().is_none());
    }

    #[test]
    fn stale_draft_is_hidden_not_deleted() {
        let (store, _, drafts) = fixture();
        let old = LocalDraft {
            onderwerp: "geluid".into(),
            timestamp: Utc::now() - chrono::Duration::hours(200),
            ..LocalDraft::default()
        };
        write_json(store.as_ref(), drafts.key(), &old).unwrap();

        assert!(drafts.load_draft().is_none());
        assert!(store.get(drafts.key()).unwrap().is_some());
    }

    #[test]
    fn restore_applies_pending_offer_once() {
        let (_, state, drafts) = fixture();
        {
            let mut s = state.lock();
            s.step = StepIndex(2);
            s.selected_websites = vec!["w1".into()];
        }
        drafts.save_draft_sync();
        drafts.check_for_restore();

        let mut restored = None;
        assert!(drafts.restore_draft(|d| restored = Some(d.step)));
        assert_eq!(restored, Some(StepIndex(2)));
        assert!(!drafts.restore_draft(|_| {}));
    }

    #[tokio::test(start_paused = true)]
    async fn autosave_waits_for_debounce() {
        let (store, state, drafts) = fixture();
        state.lock().onderwerp = "fietsparkeren".into();

        drafts.save_draft();
        tokio::time::sleep(Duration::from_millis(500)).await;
        drafts.save_draft();
        tokio::time::sleep(Duration::from_millis(900)).await;
        assert!(store.is_empty());
        assert!(drafts.has_pending_save());

        tokio::time::sleep(Duration::from_millis(200)).await;
        assert!(!store.is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn sync_flush_cancels_pending_autosave() {
        let (store, state, drafts) = fixture();
        state.lock().onderwerp = "fietsparkeren".into();

        drafts.save_draft();
        drafts.save_draft_sync();
        assert!(!drafts.has_pending_save());
        let flushed = store.get(drafts.key()).unwrap();

        state.lock().onderwerp = "geluidshinder".into();
        tokio::time::sleep(Duration::from_secs(2)).await;
        assert_eq!(store.get(drafts.key()).unwrap(), flushed);
    }
}
