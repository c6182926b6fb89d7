//! Stale-response and duplicate-request guard
//!
//! Results are applied by issuance, not by arrival: a response is applied
//! only if its key is still the active one, it belongs to the newest request
//! for that key, and that key's result has not already been applied.
//!
//! A repeat request for a key inside the dedup window is suppressed while an
//! earlier request is still in flight or its result is current. Failed
//! requests never suppress.

use parking_lot::Mutex;
use std::collections::HashMap;
use std::fmt;
use std::hash::Hash;
use std::time::Duration;
use tokio::time::Instant;

/// Default window in which repeat requests are suppressed
pub const DEFAULT_DEDUP_WINDOW: Duration = Duration::from_secs(5);

/// Proof of issuance, presented when the response arrives
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Ticket<K> {
    key: K,
    seq: u64,
}

impl<K> Ticket<K> {
    /// Resource key the request targets
    #[inline]
    pub fn key(&self) -> &K {
        &self.key
    }

    /// Issuance sequence number
    #[inline]
    #[must_use]
    pub fn seq(&self) -> u64 {
        self.seq
    }
}

/// Verdict on an arriving response
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Resolution {
    /// Applied to shared state
    Applied,
    /// Key no longer active or request superseded; dropped
    Stale,
    /// Result for this key already applied; dropped
    Duplicate,
}

impl Resolution {
    /// Whether the payload was applied
    #[inline]
    #[must_use]
    pub fn is_applied(self) -> bool {
        matches!(self, Self::Applied)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Outcome {
    InFlight,
    Applied,
    Failed,
    Dropped,
}

#[derive(Debug)]
struct Record {
    seq: u64,
    issued_at: Instant,
    outcome: Outcome,
}

#[derive(Debug)]
struct GuardState<K> {
    active: Option<K>,
    last_applied: Option<K>,
    next_seq: u64,
    requests: HashMap<K, Record>,
}

/// Request guard for one logical resource
pub struct AsyncLoadGuard<K> {
    window: Duration,
    state: Mutex<GuardState<K>>,
}

impl<K: fmt::Debug> fmt::Debug for AsyncLoadGuard<K> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let state = self.state.lock();
        f.debug_struct("AsyncLoadGuard")
            .field("window", &self.window)
            .field("active", &state.active)
            .field("last_applied", &state.last_applied)
            .finish_non_exhaustive()
    }
}

impl<K> Default for AsyncLoadGuard<K>
where
    K: Clone + Eq + Hash + fmt::Debug,
{
    fn default() -> Self {
        Self::new(DEFAULT_DEDUP_WINDOW)
    }
}

impl<K> AsyncLoadGuard<K>
where
    K: Clone + Eq + Hash + fmt::Debug,
{
    /// Guard with the given dedup window
    #[must_use]
    pub fn new(window: Duration) -> Self {
        Self {
            window,
            state: Mutex::new(GuardState {
                active: None,
                last_applied: None,
                next_seq: 0,
                requests: HashMap::new(),
            }),
        }
    }

    /// Dedup window
    #[inline]
    #[must_use]
    pub fn window(&self) -> Duration {
        self.window
    }

    /// Make `key` the target and issue a request for it
    ///
    /// Returns `None` when the request is suppressed as a repeat. `key`
    /// becomes the active key either way.
    pub fn issue(&self, key: K) -> Option<Ticket<K>> {
        let mut state = self.state.lock();
        state.active = Some(key.clone());

        if let Some(prior) = state.requests.get(&key) {
            let recent = prior.issued_at.elapsed() < self.window;
            let current = match prior.outcome {
                Outcome::InFlight => true,
                Outcome::Applied => state.last_applied.as_ref() == Some(&key),
                Outcome::Failed | Outcome::Dropped => false,
            };
            if recent && current {
                tracing::debug!(key = ?key, "repeat request suppressed");
                return None;
            }
        }

        Some(Self::issue_locked(&mut state, key))
    }

    /// Issue a request for `key` regardless of the dedup window
    pub fn force(&self, key: K) -> Ticket<K> {
        let mut state = self.state.lock();
        state.active = Some(key.clone());
        Self::issue_locked(&mut state, key)
    }

    /// Issue a request for `key` unless another key is active
    ///
    /// For background refreshes: the dedup window is ignored, but a key the
    /// user has left is never made active again. Returns `None` when
    /// another key holds the active slot.
    pub fn refresh(&self, key: K) -> Option<Ticket<K>> {
        let mut state = self.state.lock();
        if state.active.as_ref().is_some_and(|active| active != &key) {
            tracing::debug!(key = ?key, "refresh for inactive key skipped");
            return None;
        }
        state.active = Some(key.clone());
        Some(Self::issue_locked(&mut state, key))
    }

    fn issue_locked(state: &mut GuardState<K>, key: K) -> Ticket<K> {
        state.next_seq += 1;
        let seq = state.next_seq;
        if state.last_applied.as_ref() == Some(&key) {
            state.last_applied = None;
        }
        // Only the active and last applied keys can still matter.
        let last = state.last_applied.clone();
        state
            .requests
            .retain(|k, _| k == &key || last.as_ref() == Some(k));
        state.requests.insert(
            key.clone(),
            Record {
                seq,
                issued_at: Instant::now(),
                outcome: Outcome::InFlight,
            },
        );
        Ticket { key, seq }
    }

    /// Decide whether the response for `ticket` may be applied
    ///
    /// An `Applied` verdict records the key as applied; the caller must then
    /// apply the payload.
    pub fn accept(&self, ticket: &Ticket<K>) -> Resolution {
        let mut state = self.state.lock();
        let is_active = state.active.as_ref() == Some(&ticket.key);
        let already_applied = state.last_applied.as_ref() == Some(&ticket.key);

        let Some(record) = state.requests.get_mut(&ticket.key) else {
            return Resolution::Stale;
        };
        if record.seq != ticket.seq {
            tracing::debug!(key = ?ticket.key, seq = ticket.seq, "superseded response dropped");
            return Resolution::Stale;
        }
        if !is_active {
            record.outcome = Outcome::Dropped;
            tracing::debug!(key = ?ticket.key, "response for inactive key dropped");
            return Resolution::Stale;
        }
        if already_applied {
            tracing::debug!(key = ?ticket.key, "duplicate response dropped");
            return Resolution::Duplicate;
        }

        record.outcome = Outcome::Applied;
        state.last_applied = Some(ticket.key.clone());
        Resolution::Applied
    }

    /// Apply `payload` through `apply` if the guard accepts `ticket`
    pub fn resolve<T>(&self, ticket: &Ticket<K>, payload: T, apply: impl FnOnce(T)) -> Resolution {
        let resolution = self.accept(ticket);
        if resolution.is_applied() {
            apply(payload);
        }
        resolution
    }

    /// Record that the request for `ticket` failed
    ///
    /// Returns whether the failure concerns the active key.
    pub fn fail(&self, ticket: &Ticket<K>) -> bool {
        let mut state = self.state.lock();
        let is_active = state.active.as_ref() == Some(&ticket.key);
        match state.requests.get_mut(&ticket.key) {
            Some(record) if record.seq == ticket.seq => {
                record.outcome = Outcome::Failed;
                is_active
            }
            _ => false,
        }
    }

    /// Key results are currently wanted for
    #[must_use]
    pub fn active_key(&self) -> Option<K> {
        self.state.lock().active.clone()
    }

    /// Key whose result was applied last
    #[must_use]
    pub fn last_applied_key(&self) -> Option<K> {
        self.state.lock().last_applied.clone()
    }

    /// Number of keys with a request on record
    #[must_use]
    pub fn tracked(&self) -> usize {
        self.state.lock().requests.len()
    }

    /// Whether `key` is the active key
    #[must_use]
    pub fn is_active(&self, key: &K) -> bool {
        self.state.lock().active.as_ref() == Some(key)
    }

    /// Stop wanting results for `key`; later responses for it are stale
    pub fn release(&self, key: &K) {
        let mut state = self.state.lock();
        if state.active.as_ref() == Some(key) {
            state.active = None;
        }
    }

    /// Forget everything
    pub fn reset(&self) {
        let mut state = self.state.lock();
        state.active = None;
        state.last_applied = None;
        state.requests.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn guard() -> AsyncLoadGuard<&'static str> {
        AsyncLoadGuard::default()
    }

    #[tokio::test(start_paused = true)]
    async fn older_key_response_is_dropped() {
        let g = guard();
        let a = g.issue("q1").unwrap();
        let b = g.issue("q2").unwrap();

        assert_eq!(g.accept(&a), Resolution::Stale);
        assert_eq!(g.accept(&b), Resolution::Applied);
        assert_eq!(g.last_applied_key(), Some("q2"));
    }

    #[tokio::test(start_paused = true)]
    async fn arrival_order_does_not_matter() {
        let g = guard();
        let a = g.issue("q1").unwrap();
        let b = g.issue("q2").unwrap();

        assert_eq!(g.accept(&b), Resolution::Applied);
        assert_eq!(g.accept(&a), Resolution::Stale);
        assert_eq!(g.last_applied_key(), Some("q2"));
    }

    #[tokio::test(start_paused = true)]
    async fn second_delivery_is_duplicate() {
        let g = guard();
        let push = g.force("run-1");
        assert!(g.accept(&push).is_applied());
        assert_eq!(g.accept(&push), Resolution::Duplicate);
    }

    #[tokio::test(start_paused = true)]
    async fn repeat_inside_window_is_suppressed() {
        let g = guard();
        let first = g.issue("q1").unwrap();
        assert!(g.issue("q1").is_none());

        g.accept(&first);
        assert!(g.issue("q1").is_none());

        tokio::time::advance(Duration::from_secs(6)).await;
        assert!(g.issue("q1").is_some());
    }

    #[tokio::test(start_paused = true)]
    async fn failed_request_is_not_suppressed() {
        let g = guard();
        let first = g.issue("q1").unwrap();
        assert!(g.fail(&first));
        assert!(g.issue("q1").is_some());
    }

    #[tokio::test(start_paused = true)]
    async fn returning_to_a_key_reloads_it() {
        let g = guard();
        let q1 = g.issue("q1").unwrap();
        g.accept(&q1);
        let q2 = g.issue("q2").unwrap();
        g.accept(&q2);

        let again = g.issue("q1").unwrap();
        assert!(g.accept(&again).is_applied());
    }

    #[tokio::test(start_paused = true)]
    async fn superseded_request_for_same_key_is_stale() {
        let g = guard();
        let old = g.force("q1");
        let new = g.force("q1");
        assert_eq!(g.accept(&old), Resolution::Stale);
        assert!(g.accept(&new).is_applied());
    }

    #[tokio::test(start_paused = true)]
    async fn refresh_never_takes_over_another_key() {
        let g = guard();
        let a = g.issue("q1").unwrap();
        g.accept(&a);
        let b = g.issue("q2").unwrap();

        assert!(g.refresh("q1").is_none());
        assert_eq!(g.active_key(), Some("q2"));
        assert!(g.accept(&b).is_applied());

        let again = g.refresh("q2").unwrap();
        assert!(g.accept(&again).is_applied());
    }

    #[tokio::test(start_paused = true)]
    async fn refresh_without_active_key_issues() {
        let g = guard();
        let t = g.refresh("run-1").unwrap();
        assert_eq!(g.active_key(), Some("run-1"));
        assert!(g.accept(&t).is_applied());
    }

    #[tokio::test(start_paused = true)]
    async fn records_of_abandoned_keys_are_pruned() {
        let g = guard();
        for key in ["q1", "q2", "q3", "q4", "q5"] {
            let t = g.issue(key).unwrap();
            g.accept(&t);
        }
        let pending = g.issue("q6").unwrap();
        assert_eq!(g.tracked(), 2);

        let late = g.force("q7");
        assert_eq!(g.accept(&pending), Resolution::Stale);
        assert!(g.accept(&late).is_applied());
        assert!(g.tracked() <= 2);
    }

    #[tokio::test(start_paused = true)]
    async fn released_key_drops_results() {
        let g = guard();
        let t = g.issue("run-1").unwrap();
        g.release(&"run-1");
        let mut applied = false;
        assert_eq!(g.resolve(&t, (), |()| applied = true), Resolution::Stale);
        assert!(!applied);
    }
}
