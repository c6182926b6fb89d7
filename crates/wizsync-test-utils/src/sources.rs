//! Scripted document and progress sources

use async_trait::async_trait;
use dashmap::DashMap;
use parking_lot::Mutex;
use serde_json::Value;
use std::collections::{HashMap, HashSet, VecDeque};
use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use std::time::Duration;
use wizsync_guard::{DocumentSource, LoadError, ProgressSource};
use wizsync_model::{QueryId, RunId, ScanProgress};

/// Document listings per query, with optional latency and failures
#[derive(Debug, Default)]
pub struct ScriptedDocumentSource {
    responses: DashMap<QueryId, Value>,
    delays: DashMap<QueryId, Duration>,
    failures: DashMap<QueryId, u32>,
    calls: AtomicU32,
}

impl ScriptedDocumentSource {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn respond(&self, query: &str, body: Value) -> &Self {
        self.responses.insert(QueryId::new(query), body);
        self
    }

    pub fn delay(&self, query: &str, delay: Duration) -> &Self {
        self.delays.insert(QueryId::new(query), delay);
        self
    }

    /// The next `times` fetches for `query` fail
    pub fn fail(&self, query: &str, times: u32) -> &Self {
        self.failures.insert(QueryId::new(query), times);
        self
    }

    pub fn calls(&self) -> u32 {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl DocumentSource for ScriptedDocumentSource {
    async fn fetch_documents(&self, query: &QueryId) -> Result<Value, LoadError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let delay = self.delays.get(query).map(|d| *d);
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }
        let fail = self
            .failures
            .get_mut(query)
            .is_some_and(|mut left| {
                if *left > 0 {
                    *left -= 1;
                    true
                } else {
                    false
                }
            });
        if fail {
            return Err(LoadError::source_failed(format!("listing for {query} timed out")));
        }
        Ok(self
            .responses
            .get(query)
            .map_or_else(|| Value::Array(Vec::new()), |v| v.clone()))
    }
}

/// Progress reports per run, replayed by successive polls
///
/// The last report for a run repeats once the script is exhausted.
#[derive(Debug, Default)]
pub struct ScriptedProgressSource {
    scripts: Mutex<HashMap<RunId, VecDeque<ScanProgress>>>,
    cancelled: Mutex<HashSet<RunId>>,
    cancel_fails: AtomicBool,
    polls: AtomicU32,
    cancels: AtomicU32,
}

impl ScriptedProgressSource {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn script(&self, run: &RunId, reports: impl IntoIterator<Item = ScanProgress>) -> &Self {
        self.scripts
            .lock()
            .insert(run.clone(), reports.into_iter().collect());
        self
    }

    pub fn fail_cancel(&self, fail: bool) {
        self.cancel_fails.store(fail, Ordering::SeqCst);
    }

    pub fn was_cancelled(&self, run: &RunId) -> bool {
        self.cancelled.lock().contains(run)
    }

    pub fn polls(&self) -> u32 {
        self.polls.load(Ordering::SeqCst)
    }

    /// Cancel requests received, repeats included
    pub fn cancels(&self) -> u32 {
        self.cancels.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl ProgressSource for ScriptedProgressSource {
    async fn poll(&self, run: &RunId) -> Result<ScanProgress, LoadError> {
        self.polls.fetch_add(1, Ordering::SeqCst);
        let mut scripts = self.scripts.lock();
        let queue = scripts
            .get_mut(run)
            .ok_or_else(|| LoadError::source_failed(format!("unknown run {run}")))?;
        let next = if queue.len() > 1 {
            queue.pop_front()
        } else {
            queue.front().cloned()
        };
        next.ok_or_else(|| LoadError::source_failed(format!("no progress for {run}")))
    }

    async fn cancel(&self, run: &RunId) -> Result<(), LoadError> {
        self.cancels.fetch_add(1, Ordering::SeqCst);
        self.cancelled.lock().insert(run.clone());
        if self.cancel_fails.load(Ordering::SeqCst) {
            return Err(LoadError::source_failed("cancel endpoint unavailable"));
        }
        Ok(())
    }
}
