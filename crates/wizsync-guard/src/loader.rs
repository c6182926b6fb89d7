//! Guarded loading into shared state
//!
//! [`ResourceLoader`] owns one piece of shared state and changes it only
//! through updater closures. Each load goes through its [`AsyncLoadGuard`],
//! so a late response for a key the user has left never lands.

use crate::error::LoadError;
use crate::guard::{AsyncLoadGuard, Resolution};
use futures::future::BoxFuture;
use futures::FutureExt;
use parking_lot::RwLock;
use std::fmt;
use std::future::Future;
use std::hash::Hash;
use std::sync::Arc;

/// Type-erased fetch for one key
pub type Fetcher<K, T> = Arc<dyn Fn(K) -> BoxFuture<'static, Result<T, LoadError>> + Send + Sync>;

/// Shared state of a guarded resource
#[derive(Debug, Clone, PartialEq)]
pub struct LoadState<K, T> {
    /// Key the data belongs to
    pub key: Option<K>,
    /// Last applied data
    pub data: T,
    /// Whether a load for the active key is outstanding
    pub loading: bool,
    /// Failure of the last load for the active key
    pub error: Option<LoadError>,
}

impl<K, T: Default> Default for LoadState<K, T> {
    fn default() -> Self {
        Self {
            key: None,
            data: T::default(),
            loading: false,
            error: None,
        }
    }
}

/// What happened to a load
pub enum LoadOutcome<K, T> {
    /// Data applied to shared state
    Applied,
    /// Response arrived for a key no longer wanted
    Stale,
    /// Same result already applied
    Duplicate,
    /// Repeat request inside the dedup window; nothing fetched
    Suppressed,
    /// Fetch failed; `retry` re-runs it for the same key
    Failed {
        /// The failure
        error: LoadError,
        /// Retry bound to the failed key
        retry: RetryHandle<K, T>,
    },
}

impl<K, T> LoadOutcome<K, T> {
    /// Whether new data landed in shared state
    #[inline]
    #[must_use]
    pub fn is_applied(&self) -> bool {
        matches!(self, Self::Applied)
    }

    /// Retry handle, if the load failed
    #[must_use]
    pub fn retry_handle(&self) -> Option<&RetryHandle<K, T>> {
        match self {
            Self::Failed { retry, .. } => Some(retry),
            _ => None,
        }
    }
}

impl<K: fmt::Debug, T> fmt::Debug for LoadOutcome<K, T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Applied => f.write_str("Applied"),
            Self::Stale => f.write_str("Stale"),
            Self::Duplicate => f.write_str("Duplicate"),
            Self::Suppressed => f.write_str("Suppressed"),
            Self::Failed { error, retry } => f
                .debug_struct("Failed")
                .field("error", error)
                .field("key", &retry.key)
                .finish(),
        }
    }
}

/// Re-runs a failed fetch for the key it failed on
///
/// A retry after the user has moved to another key fetches nothing and
/// reports [`LoadOutcome::Stale`].
pub struct RetryHandle<K, T> {
    key: K,
    fetch: Fetcher<K, T>,
    loader: ResourceLoader<K, T>,
}

impl<K, T> Clone for RetryHandle<K, T>
where
    K: Clone,
{
    fn clone(&self) -> Self {
        Self {
            key: self.key.clone(),
            fetch: Arc::clone(&self.fetch),
            loader: self.loader.clone(),
        }
    }
}

impl<K, T> RetryHandle<K, T>
where
    K: Clone + Eq + Hash + fmt::Debug + Send + Sync + 'static,
    T: Default + Send + Sync + 'static,
{
    /// Key the retry is bound to
    #[inline]
    pub fn key(&self) -> &K {
        &self.key
    }

    /// Fetch again for the bound key
    pub async fn retry(&self) -> LoadOutcome<K, T> {
        if !self.loader.guard.is_active(&self.key) {
            tracing::debug!(key = ?self.key, "retry for inactive key ignored");
            return LoadOutcome::Stale;
        }
        self.loader
            .run(self.key.clone(), Arc::clone(&self.fetch), Issue::Force)
            .await
    }
}

#[derive(Debug, Clone, Copy)]
enum Issue {
    Dedup,
    Force,
    Refresh,
}

/// Shared state fed by guarded asynchronous loads
pub struct ResourceLoader<K, T> {
    guard: Arc<AsyncLoadGuard<K>>,
    state: Arc<RwLock<LoadState<K, T>>>,
}

impl<K, T> Clone for ResourceLoader<K, T> {
    fn clone(&self) -> Self {
        Self {
            guard: Arc::clone(&self.guard),
            state: Arc::clone(&self.state),
        }
    }
}

impl<K: fmt::Debug, T> fmt::Debug for ResourceLoader<K, T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ResourceLoader")
            .field("guard", &self.guard)
            .finish_non_exhaustive()
    }
}

impl<K, T> ResourceLoader<K, T>
where
    K: Clone + Eq + Hash + fmt::Debug + Send + Sync + 'static,
    T: Default + Send + Sync + 'static,
{
    /// Loader over `guard` with empty state
    #[must_use]
    pub fn new(guard: Arc<AsyncLoadGuard<K>>) -> Self {
        Self {
            guard,
            state: Arc::new(RwLock::new(LoadState::default())),
        }
    }

    /// Guard in use
    #[inline]
    #[must_use]
    pub fn guard(&self) -> &Arc<AsyncLoadGuard<K>> {
        &self.guard
    }

    /// Read the shared state
    pub fn read<R>(&self, f: impl FnOnce(&LoadState<K, T>) -> R) -> R {
        f(&self.state.read())
    }

    /// Change the shared state
    pub fn update(&self, f: impl FnOnce(&mut LoadState<K, T>)) {
        f(&mut self.state.write());
    }

    /// Load `key`, unless a repeat request is suppressed
    pub async fn load<F, Fut>(&self, key: K, fetch: F) -> LoadOutcome<K, T>
    where
        F: Fn(K) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<T, LoadError>> + Send + 'static,
    {
        self.run(key, erase(fetch), Issue::Dedup).await
    }

    /// Load `key` even if a recent request exists
    pub async fn reload<F, Fut>(&self, key: K, fetch: F) -> LoadOutcome<K, T>
    where
        F: Fn(K) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<T, LoadError>> + Send + 'static,
    {
        self.run(key, erase(fetch), Issue::Force).await
    }

    /// Reload `key` unless the user has moved to another key
    ///
    /// Meant for background triggers. Fetches nothing and reports
    /// [`LoadOutcome::Stale`] when another key is active.
    pub async fn refresh<F, Fut>(&self, key: K, fetch: F) -> LoadOutcome<K, T>
    where
        F: Fn(K) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<T, LoadError>> + Send + 'static,
    {
        self.run(key, erase(fetch), Issue::Refresh).await
    }

    /// Drop the data and stop wanting results for the active key
    pub fn clear(&self) {
        if let Some(key) = self.guard.active_key() {
            self.guard.release(&key);
        }
        self.update(|s| *s = LoadState::default());
    }

    async fn run(&self, key: K, fetch: Fetcher<K, T>, issue: Issue) -> LoadOutcome<K, T> {
        let ticket = match issue {
            Issue::Force => self.guard.force(key.clone()),
            Issue::Dedup => match self.guard.issue(key.clone()) {
                Some(ticket) => ticket,
                None => return LoadOutcome::Suppressed,
            },
            Issue::Refresh => match self.guard.refresh(key.clone()) {
                Some(ticket) => ticket,
                None => return LoadOutcome::Stale,
            },
        };

        self.update(|s| {
            if s.key.as_ref() != Some(&key) {
                s.key = None;
                s.data = T::default();
            }
            s.loading = true;
            s.error = None;
        });

        match fetch(key.clone()).await {
            Ok(data) => {
                let resolution = self.guard.resolve(&ticket, data, |data| {
                    self.update(|s| {
                        s.key = Some(key.clone());
                        s.data = data;
                        s.loading = false;
                        s.error = None;
                    });
                });
                match resolution {
                    Resolution::Applied => LoadOutcome::Applied,
                    Resolution::Stale => LoadOutcome::Stale,
                    Resolution::Duplicate => {
                        self.update(|s| s.loading = false);
                        LoadOutcome::Duplicate
                    }
                }
            }
            Err(error) => {
                if self.guard.fail(&ticket) {
                    tracing::warn!(key = ?key, error = %error, "guarded load failed");
                    let recorded = error.clone();
                    self.update(|s| {
                        s.loading = false;
                        s.error = Some(recorded);
                    });
                } else {
                    tracing::debug!(key = ?key, error = %error, "failure for inactive key ignored");
                }
                LoadOutcome::Failed {
                    error,
                    retry: RetryHandle {
                        key,
                        fetch,
                        loader: self.clone(),
                    },
                }
            }
        }
    }
}

fn erase<K, T, F, Fut>(fetch: F) -> Fetcher<K, T>
where
    F: Fn(K) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<T, LoadError>> + Send + 'static,
{
    Arc::new(move |key| fetch(key).boxed())
}
