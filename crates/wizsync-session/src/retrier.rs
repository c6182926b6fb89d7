//! Revision-conflict retries for session mutations
//!
//! Optimistic concurrency, not locking: nothing is held server-side between
//! attempts. On a conflict the authoritative revision is re-fetched and the
//! mutation is retried with it, up to a fixed number of attempts. The cap
//! bounds latency; it does not guarantee success.

use crate::error::SessionError;
use parking_lot::Mutex;
use std::future::Future;
use wizsync_model::Revision;

/// Attempts made before a conflict is surfaced
pub const DEFAULT_MAX_ATTEMPTS: u32 = 3;

/// Retries mutations that fail with [`SessionError::RevisionConflict`]
#[derive(Debug)]
pub struct RevisionConflictRetrier {
    max_attempts: u32,
    last_known: Mutex<Option<Revision>>,
}

impl RevisionConflictRetrier {
    /// Retrier making at most `max_attempts` attempts (minimum 1)
    #[inline]
    #[must_use]
    pub fn new(max_attempts: u32) -> Self {
        Self {
            max_attempts: max_attempts.max(1),
            last_known: Mutex::new(None),
        }
    }

    /// Attempt cap
    #[inline]
    #[must_use]
    pub fn max_attempts(&self) -> u32 {
        self.max_attempts
    }

    /// Last revision observed from the server
    #[inline]
    #[must_use]
    pub fn last_known(&self) -> Option<Revision> {
        *self.last_known.lock()
    }

    /// Record a revision seen in a server response; never moves backwards
    pub fn observe(&self, revision: Revision) {
        let mut guard = self.last_known.lock();
        if guard.map_or(true, |known| revision > known) {
            *guard = Some(revision);
        }
    }

    /// Forget the known revision (new or detached session)
    pub fn reset(&self) {
        *self.last_known.lock() = None;
    }

    /// Run `attempt` until it succeeds, fails with something other than a
    /// revision conflict, or the attempt cap is reached
    ///
    /// The first attempt uses `preferred`, else the last known revision.
    /// After each conflict `fetch_current` supplies the authoritative
    /// revision for the next attempt; if that fetch fails, the server
    /// revision reported in the conflict is used instead.
    ///
    /// # Errors
    /// The first non-conflict error, or the last conflict once
    /// `max_attempts` attempts have been made
    pub async fn retry<T, A, AFut, F, FFut>(
        &self,
        preferred: Option<Revision>,
        mut attempt: A,
        mut fetch_current: F,
    ) -> Result<T, SessionError>
    where
        A: FnMut(Option<Revision>) -> AFut,
        AFut: Future<Output = Result<T, SessionError>>,
        F: FnMut() -> FFut,
        FFut: Future<Output = Result<Revision, SessionError>>,
    {
        let mut revision = preferred.or_else(|| self.last_known());
        let mut made = 0;

        loop {
            made += 1;
            match attempt(revision).await {
                Ok(value) => {
                    if made > 1 {
                        tracing::info!(attempts = made, "mutation succeeded after revision retry");
                    }
                    return Ok(value);
                }
                Err(SessionError::RevisionConflict { expected, actual }) if made < self.max_attempts => {
                    tracing::warn!(
                        attempt = made,
                        %expected,
                        %actual,
                        "revision conflict, refetching current revision"
                    );
                    let current = match fetch_current().await {
                        Ok(current) => current,
                        Err(e) => {
                            tracing::warn!(error = %e, "revision refetch failed, using conflict report");
                            actual
                        }
                    };
                    *self.last_known.lock() = Some(current);
                    revision = Some(current);
                }
                Err(e) => {
                    if e.is_revision_conflict() {
                        tracing::warn!(attempts = made, "revision conflict retries exhausted");
                    }
                    return Err(e);
                }
            }
        }
    }
}

impl Default for RevisionConflictRetrier {
    fn default() -> Self {
        Self::new(DEFAULT_MAX_ATTEMPTS)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::PrerequisiteFailure;
    use proptest::prelude::*;
    use std::sync::atomic::{AtomicU32, AtomicU64, Ordering};
    use wizsync_model::StepId;

    /// Server stub that bumps its revision `contention` times behind the caller's back
    struct Contended {
        revision: AtomicU64,
        contention: AtomicU32,
        attempts: AtomicU32,
        fetches: AtomicU32,
    }

    impl Contended {
        fn new(start: u64, contention: u32) -> Self {
            Self {
                revision: AtomicU64::new(start),
                contention: AtomicU32::new(contention),
                attempts: AtomicU32::new(0),
                fetches: AtomicU32::new(0),
            }
        }

        async fn mutate(&self, presented: Option<Revision>) -> Result<Revision, SessionError> {
            self.attempts.fetch_add(1, Ordering::SeqCst);
            if self.contention.load(Ordering::SeqCst) > 0 {
                self.contention.fetch_sub(1, Ordering::SeqCst);
                self.revision.fetch_add(1, Ordering::SeqCst);
            }
            let current = Revision(self.revision.load(Ordering::SeqCst));
            match presented {
                Some(rev) if rev != current => Err(SessionError::RevisionConflict {
                    expected: rev,
                    actual: current,
                }),
                _ => {
                    let next = current.next();
                    self.revision.store(next.value(), Ordering::SeqCst);
                    Ok(next)
                }
            }
        }

        async fn current(&self) -> Result<Revision, SessionError> {
            self.fetches.fetch_add(1, Ordering::SeqCst);
            Ok(Revision(self.revision.load(Ordering::SeqCst)))
        }
    }

    #[tokio::test]
    async fn succeeds_without_retry_on_matching_revision() {
        let server = Contended::new(4, 0);
        let retrier = RevisionConflictRetrier::default();

        let rev = retrier
            .retry(Some(Revision(4)), |r| server.mutate(r), || server.current())
            .await
            .unwrap();

        assert_eq!(rev, Revision(5));
        assert_eq!(server.attempts.load(Ordering::SeqCst), 1);
        assert_eq!(server.fetches.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn retries_with_refetched_revision() {
        let server = Contended::new(2, 1);
        let retrier = RevisionConflictRetrier::default();

        let rev = retrier
            .retry(Some(Revision(2)), |r| server.mutate(r), || server.current())
            .await
            .unwrap();

        assert_eq!(rev, Revision(4));
        assert_eq!(server.attempts.load(Ordering::SeqCst), 2);
        assert_eq!(retrier.last_known(), Some(Revision(3)));
    }

    #[tokio::test]
    async fn surfaces_last_conflict_after_cap() {
        let server = Contended::new(0, 10);
        let retrier = RevisionConflictRetrier::new(3);

        let err = retrier
            .retry(Some(Revision(0)), |r| server.mutate(r), || server.current())
            .await
            .unwrap_err();

        assert!(err.is_revision_conflict());
        assert_eq!(server.attempts.load(Ordering::SeqCst), 3);
        assert_eq!(server.fetches.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn prerequisite_failures_are_not_retried() {
        let retrier = RevisionConflictRetrier::default();
        let calls = AtomicU32::new(0);

        let err = retrier
            .retry(
                None,
                |_| {
                    calls.fetch_add(1, Ordering::SeqCst);
                    async {
                        Err::<(), _>(SessionError::Prerequisite(PrerequisiteFailure::new(
                            StepId::from("document-review"),
                            "select websites first",
                            vec!["selectedWebsites".into()],
                        )))
                    }
                },
                || async { Ok(Revision(0)) },
            )
            .await
            .unwrap_err();

        assert!(err.is_prerequisite());
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn failed_refetch_falls_back_to_reported_revision() {
        let retrier = RevisionConflictRetrier::default();
        let seen = Mutex::new(Vec::new());

        let result = retrier
            .retry(
                Some(Revision(1)),
                |r| {
                    seen.lock().push(r);
                    async move {
                        if r == Some(Revision(6)) {
                            Ok(())
                        } else {
                            Err(SessionError::RevisionConflict {
                                expected: r.unwrap_or_default(),
                                actual: Revision(6),
                            })
                        }
                    }
                },
                || async { Err(SessionError::Transport("offline".into())) },
            )
            .await;

        assert!(result.is_ok());
        assert_eq!(*seen.lock(), vec![Some(Revision(1)), Some(Revision(6))]);
    }

    #[tokio::test]
    async fn falls_back_to_last_known_revision() {
        let retrier = RevisionConflictRetrier::default();
        retrier.observe(Revision(9));
        retrier.observe(Revision(7));
        let seen = Mutex::new(None);

        retrier
            .retry(
                None,
                |r| {
                    *seen.lock() = r;
                    async { Ok::<_, SessionError>(()) }
                },
                || async { Ok(Revision(0)) },
            )
            .await
            .unwrap();

        assert_eq!(*seen.lock(), Some(Revision(9)));
    }

    proptest! {
        #[test]
        fn prop_attempts_never_exceed_cap(contention in 0u32..8, cap in 1u32..6) {
            let rt = tokio::runtime::Builder::new_current_thread().build().unwrap();
            let server = Contended::new(0, contention);
            let retrier = RevisionConflictRetrier::new(cap);

            let result = rt.block_on(retrier.retry(
                Some(Revision(0)),
                |r| server.mutate(r),
                || server.current(),
            ));

            let attempts = server.attempts.load(Ordering::SeqCst);
            prop_assert!(attempts <= cap);
            if result.is_err() {
                prop_assert_eq!(attempts, cap);
            }
        }
    }
}
