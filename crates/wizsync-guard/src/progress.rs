//! Scan progress monitoring
//!
//! Progress for a run arrives on two redundant paths: a push channel and a
//! polling fallback. Both feed the same handler; the run's guard ticket makes
//! sure completion is applied once, whichever path delivers it first.
//!
//! Polling is capped. Hitting the cap records
//! [`LoadError::PollLimitReached`] and stops; it does not fail the wizard.

use crate::error::LoadError;
use crate::guard::{AsyncLoadGuard, Resolution, Ticket};
use async_trait::async_trait;
use parking_lot::{Mutex, RwLock};
use reqwest::Client;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use wizsync_draft::ProgressSnapshots;
use wizsync_model::{RunId, ScanProgress, ScanStatus};

/// Default interval between polls
pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_millis(3000);

/// Default poll cap (about fifteen minutes at the default interval)
pub const DEFAULT_MAX_POLLS: u32 = 300;

/// Progress polling and cancellation RPC
#[async_trait]
pub trait ProgressSource: Send + Sync {
    /// Current progress of `run`
    async fn poll(&self, run: &RunId) -> Result<ScanProgress, LoadError>;

    /// Ask the server to stop `run`
    async fn cancel(&self, run: &RunId) -> Result<(), LoadError>;
}

/// reqwest-backed [`ProgressSource`]
///
/// `GET {base}/runs/{id}/progress`, `POST {base}/runs/{id}/cancel`
#[derive(Debug, Clone)]
pub struct HttpProgressSource {
    client: Client,
    base_url: String,
}

impl HttpProgressSource {
    /// Source against `base_url`
    ///
    /// # Errors
    /// [`LoadError::Source`] if the HTTP client cannot be built
    pub fn new(base_url: impl Into<String>, timeout: Duration) -> Result<Self, LoadError> {
        let client = Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| LoadError::source_failed(e.to_string()))?;
        Ok(Self {
            client,
            base_url: base_url.into().trim_end_matches('/').to_string(),
        })
    }
}

#[async_trait]
impl ProgressSource for HttpProgressSource {
    async fn poll(&self, run: &RunId) -> Result<ScanProgress, LoadError> {
        let url = format!("{}/runs/{}/progress", self.base_url, run);
        self.client
            .get(url)
            .send()
            .await
            .and_then(reqwest::Response::error_for_status)
            .map_err(|e| LoadError::source_failed(e.to_string()))?
            .json::<ScanProgress>()
            .await
            .map_err(|e| LoadError::DataFormat {
                resource: "progress",
                expected: "progress object",
                actual: e.to_string(),
            })
    }

    async fn cancel(&self, run: &RunId) -> Result<(), LoadError> {
        let url = format!("{}/runs/{}/cancel", self.base_url, run);
        self.client
            .post(url)
            .send()
            .await
            .and_then(reqwest::Response::error_for_status)
            .map(|_| ())
            .map_err(|e| LoadError::source_failed(e.to_string()))
    }
}

/// Polling settings
#[derive(Debug, Clone, Copy)]
pub struct ScanMonitorConfig {
    /// Interval between polls
    pub poll_interval: Duration,
    /// Polls before giving up
    pub max_polls: u32,
}

impl Default for ScanMonitorConfig {
    fn default() -> Self {
        Self {
            poll_interval: DEFAULT_POLL_INTERVAL,
            max_polls: DEFAULT_MAX_POLLS,
        }
    }
}

/// What the UI sees of the monitored run
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ScanView {
    /// Run being monitored
    pub run: Option<RunId>,
    /// Last applied progress
    pub latest: Option<ScanProgress>,
    /// Non-fatal problem to show
    pub error: Option<LoadError>,
    /// Final status applied
    pub finished: bool,
    /// Stopped by the user
    pub stopped: bool,
}

/// Called once with the final progress of a run
pub type CompletionFn = Box<dyn FnOnce(ScanProgress) + Send>;

struct Shared {
    source: Arc<dyn ProgressSource>,
    guard: Arc<AsyncLoadGuard<RunId>>,
    snapshots: Option<ProgressSnapshots>,
    view: RwLock<ScanView>,
}

/// Follows one scan run at a time
pub struct ScanMonitor {
    shared: Arc<Shared>,
    config: ScanMonitorConfig,
    task: Mutex<Option<JoinHandle<()>>>,
}

impl std::fmt::Debug for ScanMonitor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ScanMonitor")
            .field("config", &self.config)
            .field("view", &*self.shared.view.read())
            .finish_non_exhaustive()
    }
}

impl ScanMonitor {
    /// Monitor polling `source`
    #[must_use]
    pub fn new(source: Arc<dyn ProgressSource>, config: ScanMonitorConfig) -> Self {
        Self {
            shared: Arc::new(Shared {
                source,
                guard: Arc::new(AsyncLoadGuard::default()),
                snapshots: None,
                view: RwLock::new(ScanView::default()),
            }),
            config,
            task: Mutex::new(None),
        }
    }

    /// Persist applied progress into `snapshots`
    #[must_use]
    pub fn with_snapshots(self, snapshots: ProgressSnapshots) -> Self {
        let shared = Shared {
            source: Arc::clone(&self.shared.source),
            guard: Arc::clone(&self.shared.guard),
            snapshots: Some(snapshots),
            view: RwLock::new(ScanView::default()),
        };
        Self {
            shared: Arc::new(shared),
            ..self
        }
    }

    /// Current view
    #[must_use]
    pub fn view(&self) -> ScanView {
        self.shared.view.read().clone()
    }

    /// Whether a run is being followed
    #[must_use]
    pub fn is_running(&self) -> bool {
        self.task
            .lock()
            .as_ref()
            .is_some_and(|task| !task.is_finished())
    }

    /// Follow `run`, replacing any run followed so far
    ///
    /// `push` is the optional real-time channel; polling runs regardless.
    /// `on_complete` fires once, with the first final status applied.
    pub fn start(
        &self,
        run: RunId,
        push: Option<mpsc::Receiver<ScanProgress>>,
        on_complete: impl FnOnce(ScanProgress) + Send + 'static,
    ) {
        if let Some(previous) = self.task.lock().take() {
            previous.abort();
        }

        let ticket = self.shared.guard.force(run.clone());
        *self.shared.view.write() = ScanView {
            run: Some(run.clone()),
            ..ScanView::default()
        };
        tracing::info!(run = %run, "monitoring scan");

        let shared = Arc::clone(&self.shared);
        let config = self.config;
        let task = tokio::spawn(follow(shared, config, ticket, push, Box::new(on_complete)));
        *self.task.lock() = Some(task);
    }

    /// Stop following the current run
    ///
    /// Local application stops immediately; the server is asked to cancel
    /// in the background and failures there are only logged. A second stop
    /// sends nothing.
    pub fn stop(&self) {
        let run = {
            let mut view = self.shared.view.write();
            view.stopped = true;
            view.run.take()
        };
        if let Some(task) = self.task.lock().take() {
            task.abort();
        }
        let Some(run) = run else {
            return;
        };

        self.shared.guard.release(&run);
        if let Some(snapshots) = &self.shared.snapshots {
            snapshots.clear(&run);
        }
        tracing::info!(run = %run, "scan stopped");

        let source = Arc::clone(&self.shared.source);
        match tokio::runtime::Handle::try_current() {
            Ok(handle) => {
                handle.spawn(async move {
                    if let Err(e) = source.cancel(&run).await {
                        tracing::warn!(run = %run, error = %e, "server-side scan cancel failed");
                    }
                });
            }
            Err(_) => tracing::warn!(run = %run, "no runtime, server-side cancel skipped"),
        }
    }
}

async fn follow(
    shared: Arc<Shared>,
    config: ScanMonitorConfig,
    ticket: Ticket<RunId>,
    mut push: Option<mpsc::Receiver<ScanProgress>>,
    on_complete: CompletionFn,
) {
    let mut on_complete = Some(on_complete);
    let mut interval = tokio::time::interval(config.poll_interval);
    interval.set_missed_tick_behavior(MissedTickBehavior::Delay);
    let mut polls: u32 = 0;

    loop {
        let progress = tokio::select! {
            progress = next_push(&mut push) => progress,
            _ = interval.tick() => {
                if polls >= config.max_polls {
                    tracing::warn!(run = %ticket.key(), polls, "poll limit reached");
                    shared.guard.release(ticket.key());
                    shared.view.write().error = Some(LoadError::PollLimitReached { polls });
                    return;
                }
                polls += 1;
                match shared.source.poll(ticket.key()).await {
                    Ok(progress) => progress,
                    Err(e) => {
                        tracing::debug!(run = %ticket.key(), error = %e, "progress poll failed");
                        continue;
                    }
                }
            }
        };

        if shared.handle(&ticket, progress, &mut on_complete) {
            return;
        }
    }
}

/// Next pushed progress; pends forever once the channel is gone
async fn next_push(push: &mut Option<mpsc::Receiver<ScanProgress>>) -> ScanProgress {
    if let Some(rx) = push.as_mut() {
        if let Some(progress) = rx.recv().await {
            return progress;
        }
        *push = None;
    }
    std::future::pending().await
}

impl Shared {
    /// Apply one report; returns whether following should end
    fn handle(
        &self,
        ticket: &Ticket<RunId>,
        progress: ScanProgress,
        on_complete: &mut Option<CompletionFn>,
    ) -> bool {
        if progress.run_id != *ticket.key() {
            tracing::debug!(expected = %ticket.key(), got = %progress.run_id, "progress for other run dropped");
            return false;
        }
        if !self.guard.is_active(ticket.key()) {
            return true;
        }

        if !progress.status.is_terminal() {
            let mut view = self.view.write();
            if view.stopped || view.finished {
                return true;
            }
            if let Some(snapshots) = &self.snapshots {
                snapshots.record(&progress);
            }
            view.latest = Some(progress);
            return false;
        }

        match self.guard.accept(ticket) {
            Resolution::Applied => {
                {
                    let mut view = self.view.write();
                    if view.stopped {
                        return true;
                    }
                    if progress.status == ScanStatus::Failed {
                        view.error = Some(LoadError::ScanFailed(
                            progress.error.clone().unwrap_or_else(|| "unknown error".to_string()),
                        ));
                    }
                    view.latest = Some(progress.clone());
                    view.finished = true;
                }
                if let Some(snapshots) = &self.snapshots {
                    snapshots.clear(&progress.run_id);
                }
                tracing::info!(run = %progress.run_id, status = ?progress.status, documents = progress.documents_found, "scan finished");
                if let Some(callback) = on_complete.take() {
                    callback(progress);
                }
                true
            }
            Resolution::Duplicate | Resolution::Stale => true,
        }
    }
}
