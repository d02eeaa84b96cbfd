//! Runs the fetch → normalize → resolve → cache pipeline for one handle at a time.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::{broadcast, watch};
use tracing::{debug, info, warn};

use marquee_api::traits::{MetadataProvider, WatchlistSource};

use crate::cache::Cache;
use crate::error::MarqueeError;
use crate::fetcher::Fetcher;
use crate::models::{CanonicalItem, PipelineState, WatchlistConfig};
use crate::normalize;
use crate::resolver::{Outcome, Resolver};

const EVENT_CAPACITY: usize = 64;

/// Summary of one finished pipeline run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunReport {
    pub handle: String,
    pub state: PipelineState,
    /// Raw entries returned by the proxy.
    pub fetched: usize,
    /// Entries left after normalization and dedupe.
    pub normalized: usize,
    /// Items written to the cache.
    pub resolved: usize,
    pub missed: usize,
    pub unreleased: usize,
    pub failed: usize,
    pub error: Option<String>,
    pub finished_at: DateTime<Utc>,
}

impl RunReport {
    fn new(handle: &str) -> Self {
        Self {
            handle: handle.to_string(),
            state: PipelineState::Loading,
            fetched: 0,
            normalized: 0,
            resolved: 0,
            missed: 0,
            unreleased: 0,
            failed: 0,
            error: None,
            finished_at: Utc::now(),
        }
    }

    fn idle() -> Self {
        Self {
            state: PipelineState::Idle,
            ..Self::new("")
        }
    }
}

/// Pushed to subscribers as runs progress.
#[derive(Debug, Clone, PartialEq)]
pub enum PipelineEvent {
    StateChanged { handle: String, state: PipelineState },
    RunFinished(RunReport),
}

/// Last known state of one handle.
#[derive(Debug, Clone)]
struct HandleStatus {
    state: PipelineState,
    last_error: Option<String>,
}

struct Inner<S, P> {
    fetcher: Fetcher<S>,
    resolver: Resolver<P>,
    cache: Cache,
    concurrency: usize,
    /// In-flight runs and the generation each started under. A second
    /// request for the same handle joins the first.
    runs: Mutex<HashMap<String, (u64, watch::Receiver<Option<RunReport>>)>>,
    /// Bumped by [`Orchestrator::forget`]. A run only writes the cache if its
    /// handle's generation is unchanged.
    generations: Arc<Mutex<HashMap<String, u64>>>,
    status: Mutex<HashMap<String, HandleStatus>>,
    events: broadcast::Sender<PipelineEvent>,
}

/// Owns the pipeline and guarantees at most one run per account handle.
///
/// Runs are spawned onto the tokio runtime: dropping the future returned by
/// [`Orchestrator::refresh`] does not cancel the run, which still finishes
/// and writes the cache.
pub struct Orchestrator<S, P> {
    inner: Arc<Inner<S, P>>,
}

impl<S, P> Clone for Orchestrator<S, P> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<S, P> Orchestrator<S, P>
where
    S: WatchlistSource + 'static,
    P: MetadataProvider + 'static,
{
    pub fn new(fetcher: Fetcher<S>, resolver: Resolver<P>, cache: Cache, concurrency: usize) -> Self {
        let (events, _) = broadcast::channel(EVENT_CAPACITY);
        Self {
            inner: Arc::new(Inner {
                fetcher,
                resolver,
                cache,
                concurrency: concurrency.max(1),
                runs: Mutex::new(HashMap::new()),
                generations: Arc::new(Mutex::new(HashMap::new())),
                status: Mutex::new(HashMap::new()),
                events,
            }),
        }
    }

    pub fn cache(&self) -> &Cache {
        &self.inner.cache
    }

    pub fn subscribe(&self) -> broadcast::Receiver<PipelineEvent> {
        self.inner.events.subscribe()
    }

    /// Current state of `handle`. Handles that never ran are `Idle`.
    pub fn state(&self, handle: &str) -> PipelineState {
        lock(&self.inner.status)
            .get(handle)
            .map(|s| s.state)
            .unwrap_or(PipelineState::Idle)
    }

    /// Error message of the last failed run, while the handle is in `Error`.
    pub fn last_error(&self, handle: &str) -> Option<String> {
        lock(&self.inner.status)
            .get(handle)
            .and_then(|s| s.last_error.clone())
    }

    pub fn is_running(&self, handle: &str) -> bool {
        lock(&self.inner.runs).contains_key(handle)
    }

    /// Start a run for `config`, or join the one already in flight.
    ///
    /// The state switches to `Loading` before this returns. The receiver
    /// yields the report once the run settles. An unconfigured handle never
    /// starts a run.
    pub fn start(&self, config: &WatchlistConfig) -> watch::Receiver<Option<RunReport>> {
        if !config.is_configured() {
            let (_, rx) = watch::channel(Some(RunReport::idle()));
            return rx;
        }

        let handle = config.account_handle.clone();
        let generation = self.inner.generation(&handle);
        let (tx, rx) = {
            let mut runs = lock(&self.inner.runs);
            if let Some((_, rx)) = runs.get(&handle) {
                debug!(%handle, "joining in-flight run");
                return rx.clone();
            }
            let (tx, rx) = watch::channel(None);
            runs.insert(handle.clone(), (generation, rx.clone()));
            (tx, rx)
        };

        self.inner.set_state(&handle, PipelineState::Loading, None);

        let inner = Arc::clone(&self.inner);
        let config = config.clone();
        tokio::spawn(async move {
            let report = inner.run(&config, generation).await;
            {
                let mut runs = lock(&inner.runs);
                if runs
                    .get(&config.account_handle)
                    .is_some_and(|(g, _)| *g == generation)
                {
                    runs.remove(&config.account_handle);
                }
            }
            let _ = inner.events.send(PipelineEvent::RunFinished(report.clone()));
            let _ = tx.send(Some(report));
        });

        rx
    }

    /// Drop everything known about `handle`: its cached row, its state, and
    /// the outcome of a run still in flight, which settles without writing.
    pub fn forget(&self, handle: &str) -> Result<(), MarqueeError> {
        {
            let mut generations = lock(&self.inner.generations);
            *generations.entry(handle.to_string()).or_default() += 1;
            self.inner.cache.clear(handle)?;
        }
        lock(&self.inner.runs).remove(handle);
        lock(&self.inner.status).remove(handle);
        let _ = self.inner.events.send(PipelineEvent::StateChanged {
            handle: handle.to_string(),
            state: PipelineState::Idle,
        });
        debug!(handle, "handle forgotten");
        Ok(())
    }

    /// Run the pipeline for `config` and wait for it to settle.
    pub async fn refresh(&self, config: &WatchlistConfig) -> RunReport {
        let mut rx = self.start(config);
        let report = match rx.wait_for(Option::is_some).await {
            Ok(report) => report.as_ref().cloned(),
            Err(_) => None,
        };
        report.unwrap_or_else(|| {
            // The run task went away without reporting.
            lock(&self.inner.runs).remove(&config.account_handle);
            let message = "refresh task ended unexpectedly".to_string();
            self.inner
                .set_state(&config.account_handle, PipelineState::Error, Some(message.clone()));
            RunReport {
                state: PipelineState::Error,
                error: Some(message),
                ..RunReport::new(&config.account_handle)
            }
        })
    }
}

impl<S, P> Inner<S, P>
where
    S: WatchlistSource,
    P: MetadataProvider,
{
    fn generation(&self, handle: &str) -> u64 {
        lock(&self.generations).get(handle).copied().unwrap_or(0)
    }

    fn set_state(&self, handle: &str, state: PipelineState, error: Option<String>) {
        lock(&self.status).insert(
            handle.to_string(),
            HandleStatus {
                state,
                last_error: error,
            },
        );
        let _ = self.events.send(PipelineEvent::StateChanged {
            handle: handle.to_string(),
            state,
        });
    }

    #[tracing::instrument(name = "pipeline_run", skip_all, fields(handle = %config.account_handle))]
    async fn run(&self, config: &WatchlistConfig, generation: u64) -> RunReport {
        let handle = config.account_handle.as_str();
        let mut report = RunReport::new(handle);

        let raw = match self
            .fetcher
            .fetch(handle, config.page_count, &config.proxy_endpoint)
            .await
        {
            Ok(raw) => raw,
            Err(e) => return self.fail(report, generation, e.to_string()),
        };
        report.fetched = raw.len();

        let entries = self.resolver.normalizer().normalize_entries(&raw);
        report.normalized = entries.len();

        let mut resolved = Vec::with_capacity(entries.len());
        let mut last_failure = None;
        for outcome in self.resolver.resolve_all(&entries, self.concurrency).await {
            match outcome {
                Outcome::Resolved(item) => resolved.push(item),
                Outcome::Miss => report.missed += 1,
                Outcome::Unreleased(_) => report.unreleased += 1,
                Outcome::Failed(e) => {
                    report.failed += 1;
                    last_failure = Some(e.to_string());
                }
            }
        }

        // Title-only entries can resolve to the same record.
        let items = normalize::dedupe(resolved);
        report.resolved = items.len();

        if items.is_empty() {
            if let Some(reason) = last_failure {
                return self.fail(report, generation, format!("metadata lookups failed: {reason}"));
            }
        }

        let empty = items.is_empty();
        match self.store_if_current(handle, generation, items).await {
            Ok(true) => {}
            Ok(false) => {
                info!("handle was reset during the run; results discarded");
                report.state = PipelineState::Idle;
                report.finished_at = Utc::now();
                return report;
            }
            Err(message) => {
                return self.fail(report, generation, format!("could not write cache: {message}"))
            }
        }

        report.state = if empty {
            PipelineState::Empty
        } else {
            PipelineState::Ready
        };
        report.finished_at = Utc::now();
        info!(
            state = %report.state,
            fetched = report.fetched,
            resolved = report.resolved,
            missed = report.missed,
            unreleased = report.unreleased,
            failed = report.failed,
            "watchlist refreshed"
        );
        self.set_state(handle, report.state, None);
        report
    }

    /// Write `items` unless `handle` was forgotten after the run started.
    ///
    /// SQLite calls block, so the write runs on the blocking pool. The
    /// generation check and the write happen under one lock, so a concurrent
    /// [`Orchestrator::forget`] lands either before (no write) or after (cleared).
    async fn store_if_current(
        &self,
        handle: &str,
        generation: u64,
        items: Vec<CanonicalItem>,
    ) -> Result<bool, String> {
        let cache = self.cache.clone();
        let generations = Arc::clone(&self.generations);
        let handle = handle.to_string();
        let write = tokio::task::spawn_blocking(move || {
            let generations = lock(&generations);
            if generations.get(&handle).copied().unwrap_or(0) != generation {
                return Ok(false);
            }
            cache.store(&handle, &items).map(|_| true)
        });
        match write.await {
            Ok(result) => result.map_err(|e| e.to_string()),
            Err(e) => Err(e.to_string()),
        }
    }

    /// Settle the run as `Error`, leaving the cache untouched. A forgotten
    /// handle keeps its `Idle` state.
    fn fail(&self, mut report: RunReport, generation: u64, message: String) -> RunReport {
        warn!(error = %message, "watchlist refresh failed");
        report.state = PipelineState::Error;
        report.error = Some(message.clone());
        report.finished_at = Utc::now();
        if self.generation(&report.handle) == generation {
            self.set_state(&report.handle, PipelineState::Error, Some(message));
        }
        report
    }
}

fn lock<T>(m: &Mutex<T>) -> MutexGuard<'_, T> {
    m.lock().unwrap_or_else(|e| e.into_inner())
}
