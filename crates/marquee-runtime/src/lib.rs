mod cards;

use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tracing::{debug, info, warn};

use marquee_api::proxy::ProxyClient;
use marquee_api::tmdb::TmdbClient;
use marquee_api::traits::{MetadataProvider, WatchlistSource};
use marquee_core::cache::Cache;
use marquee_core::config::{AppConfig, API_KEY_ENV};
use marquee_core::config_store::ConfigStore;
use marquee_core::error::MarqueeError;
use marquee_core::fetcher::Fetcher;
use marquee_core::models::{
    CanonicalItem, ConfigPatch, PipelineState, WatchlistConfig, MAX_PAGE_COUNT, MIN_PAGE_COUNT,
};
use marquee_core::normalize::Normalizer;
use marquee_core::orchestrator::{Orchestrator, PipelineEvent, RunReport};
use marquee_core::resolver::Resolver;
use marquee_core::storage::Storage;

pub use cards::{
    build_cards, rating, relative_time, search_query, CardDescriptor, HostAction, PlaceholderKind,
    DETAIL_SOURCE,
};

#[derive(Debug, thiserror::Error)]
pub enum RuntimeError {
    #[error("config error: {0}")]
    Config(String),
    #[error("database error: {0}")]
    Database(String),
    #[error("api error: {0}")]
    Api(String),
    #[error("not found: {0}")]
    NotFound(String),
}

impl From<MarqueeError> for RuntimeError {
    fn from(e: MarqueeError) -> Self {
        match e {
            MarqueeError::Config(msg) => Self::Config(msg),
            MarqueeError::Storage(_) | MarqueeError::Serde(_) | MarqueeError::Io(_) => {
                Self::Database(e.to_string())
            }
        }
    }
}

/// What the host renders for the watchlist row.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DisplaySnapshot {
    pub handle: String,
    pub state: PipelineState,
    /// Cached items; may be stale while loading or after an error.
    pub items: Vec<CanonicalItem>,
    pub error_detail: Option<String>,
    /// Items are from an earlier run that failed to refresh, or past their max age.
    pub stale: bool,
    pub fetched_at: Option<DateTime<Utc>>,
}

impl DisplaySnapshot {
    fn idle() -> Self {
        Self {
            handle: String::new(),
            state: PipelineState::Idle,
            items: Vec::new(),
            error_detail: None,
            stale: false,
            fetched_at: None,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SettingsView {
    pub current: WatchlistConfig,
    pub defaults: WatchlistConfig,
    pub min_pages: u8,
    pub max_pages: u8,
}

/// Runtime wired to the real proxy and TMDB clients.
pub type DefaultRuntime = Runtime<ProxyClient, TmdbClient>;

/// The host-facing surface: display snapshots in, commands out.
pub struct Runtime<S, P> {
    app: Arc<AppConfig>,
    settings: Arc<ConfigStore>,
    orchestrator: Orchestrator<S, P>,
}

impl<S, P> Clone for Runtime<S, P> {
    fn clone(&self) -> Self {
        Self {
            app: Arc::clone(&self.app),
            settings: Arc::clone(&self.settings),
            orchestrator: self.orchestrator.clone(),
        }
    }
}

impl Runtime<ProxyClient, TmdbClient> {
    /// Load config from disk and open the default database.
    pub fn new() -> Result<Self, RuntimeError> {
        let app = AppConfig::load()?;
        let db_path = AppConfig::ensure_db_path()?;
        let storage = Storage::open(&db_path)?;
        Self::from_config(app, Arc::new(storage))
    }

    pub fn from_config(app: AppConfig, storage: Arc<Storage>) -> Result<Self, RuntimeError> {
        let proxy =
            ProxyClient::new(app.proxy.timeout()).map_err(|e| RuntimeError::Api(e.to_string()))?;

        if app.metadata.api_key.is_empty() {
            warn!("metadata.api_key is empty; set it in the config file or via {API_KEY_ENV}");
        }
        let tmdb = TmdbClient::new(
            &app.metadata.base_url,
            app.metadata.api_key.clone(),
            app.metadata.language.clone(),
            app.metadata.timeout(),
        )
        .map_err(|e| RuntimeError::Config(format!("metadata.base_url: {e}")))?;

        Self::with_parts(app, storage, proxy, tmdb, None)
    }
}

impl<S, P> Runtime<S, P>
where
    S: WatchlistSource + 'static,
    P: MetadataProvider + 'static,
{
    /// Assemble a runtime from explicit parts. `today` pins the release filter.
    pub fn with_parts(
        app: AppConfig,
        storage: Arc<Storage>,
        source: S,
        provider: P,
        today: Option<NaiveDate>,
    ) -> Result<Self, RuntimeError> {
        let defaults = ConfigStore::defaults_from(&app)?;
        let settings = ConfigStore::new(Arc::clone(&storage), defaults);

        let mut resolver = Resolver::new(provider, Normalizer::new(app.metadata.image_base.clone()));
        if let Some(today) = today {
            resolver = resolver.with_today(today);
        }
        let orchestrator = Orchestrator::new(
            Fetcher::new(source),
            resolver,
            Cache::new(storage),
            app.metadata.concurrency(),
        );

        Ok(Self {
            app: Arc::new(app),
            settings: Arc::new(settings),
            orchestrator,
        })
    }

    pub fn app_config(&self) -> &AppConfig {
        &self.app
    }

    pub fn orchestrator(&self) -> &Orchestrator<S, P> {
        &self.orchestrator
    }

    pub fn settings(&self) -> Result<WatchlistConfig, RuntimeError> {
        Ok(self.settings.get()?)
    }

    pub fn subscribe(&self) -> broadcast::Receiver<PipelineEvent> {
        self.orchestrator.subscribe()
    }

    // ── Display ─────────────────────────────────────────────────

    /// Snapshot for the configured handle. Never waits on the network.
    pub fn snapshot_for_display(&self) -> Result<DisplaySnapshot, RuntimeError> {
        let config = self.settings.get()?;
        Ok(self.snapshot_for(&config))
    }

    /// Snapshot for `config`'s handle, from the cache.
    ///
    /// Starts a background run when the handle has not run yet in this
    /// process, or when its cached row is missing or older than the
    /// configured max age. A handle in `Error` waits for an explicit retry.
    pub fn snapshot_for(&self, config: &WatchlistConfig) -> DisplaySnapshot {
        if !config.is_configured() {
            return DisplaySnapshot::idle();
        }
        let handle = config.account_handle.as_str();
        let max_age = self.app.general.cache_max_age();
        let cached = self.orchestrator.cache().snapshot(handle);

        let needs_run = match (self.orchestrator.state(handle), &cached) {
            (PipelineState::Idle, _) => true,
            (PipelineState::Ready | PipelineState::Empty, None) => true,
            (PipelineState::Ready | PipelineState::Empty, Some(snap)) => snap.is_stale(max_age),
            (PipelineState::Loading | PipelineState::Error, _) => false,
        };
        if needs_run {
            debug!(handle, "revalidating on display");
            self.orchestrator.start(config);
        }

        let state = self.orchestrator.state(handle);
        let error_detail = match state {
            PipelineState::Error => self.orchestrator.last_error(handle),
            _ => None,
        };
        let stale = cached
            .as_ref()
            .is_some_and(|snap| state == PipelineState::Error || snap.is_stale(max_age));

        DisplaySnapshot {
            handle: handle.to_string(),
            state,
            error_detail,
            stale,
            fetched_at: cached.as_ref().map(|snap| snap.fetched_at),
            items: cached.map(|snap| snap.items).unwrap_or_default(),
        }
    }

    pub fn cards(&self) -> Result<Vec<CardDescriptor>, RuntimeError> {
        Ok(build_cards(&self.snapshot_for_display()?))
    }

    // ── Commands ────────────────────────────────────────────────

    /// Refresh the configured handle and wait for the run to settle.
    ///
    /// Joins a run already in flight instead of starting a second one.
    pub async fn refresh(&self) -> Result<RunReport, RuntimeError> {
        let config = self.settings.get()?;
        Ok(self.orchestrator.refresh(&config).await)
    }

    /// Action for an activated card.
    pub fn select_item(&self, item: &CanonicalItem) -> HostAction {
        let action = HostAction::for_item(item);
        info!(title = %item.title, ?action, "item selected");
        action
    }

    /// Action for the card at `index` in the current snapshot.
    pub fn select_index(&self, index: usize) -> Result<HostAction, RuntimeError> {
        let snapshot = self.snapshot_for_display()?;
        let item = snapshot
            .items
            .get(index)
            .ok_or_else(|| RuntimeError::NotFound(format!("no item at position {index}")))?;
        Ok(self.select_item(item))
    }

    pub fn open_settings(&self) -> Result<SettingsView, RuntimeError> {
        Ok(SettingsView {
            current: self.settings.get()?,
            defaults: self.settings.defaults().clone(),
            min_pages: MIN_PAGE_COUNT,
            max_pages: MAX_PAGE_COUNT,
        })
    }

    /// Persist `patch` and start a run when anything changed.
    ///
    /// Switching accounts drops the previous account's cached row, including
    /// whatever a run still in flight for it would have written.
    pub fn save_settings(&self, patch: &ConfigPatch) -> Result<WatchlistConfig, RuntimeError> {
        let before = self.settings.get()?;
        let after = self.settings.set(patch)?;

        if before.is_configured() && before.account_handle != after.account_handle {
            self.orchestrator.forget(&before.account_handle)?;
            info!(previous = %before.account_handle, "cleared cache for previous account");
        }
        if after.is_configured() && after != before {
            self.orchestrator.start(&after);
        }
        Ok(after)
    }

    /// Drop the configured handle's cached row.
    pub fn clear_cache(&self) -> Result<(), RuntimeError> {
        let config = self.settings.get()?;
        if config.is_configured() {
            self.orchestrator.cache().clear(&config.account_handle)?;
        }
        Ok(())
    }

    /// Periodically start a run for the configured handle.
    ///
    /// The first run happens one `interval` from now.
    pub fn spawn_revalidation(&self, interval: Duration) -> JoinHandle<()> {
        let runtime = self.clone();
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
            ticker.tick().await;
            loop {
                ticker.tick().await;
                match runtime.settings.get() {
                    Ok(config) if config.is_configured() => {
                        debug!(handle = %config.account_handle, "scheduled revalidation");
                        runtime.orchestrator.start(&config);
                    }
                    Ok(_) => {}
                    Err(e) => warn!(error = %e, "scheduled revalidation skipped"),
                }
            }
        })
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;
    use std::sync::atomic::{AtomicUsize, Ordering};

    use marquee_api::traits::{PageRequest, SearchQuery};
    use marquee_api::types::{MediaKind, MetadataRecord, RawWatchlistEntry};
    use marquee_api::ApiError;
    use serde_json::json;
    use url::Url;

    use super::*;

    /// Per-handle watchlists; unknown handles fail.
    #[derive(Default)]
    struct FakeProxy {
        lists: HashMap<String, Vec<serde_json::Value>>,
        calls: Arc<AtomicUsize>,
        delay: Option<Duration>,
    }

    impl WatchlistSource for FakeProxy {
        async fn fetch_page(
            &self,
            _endpoint: &Url,
            handle: &str,
            _request: PageRequest,
        ) -> Result<Vec<RawWatchlistEntry>, ApiError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            if let Some(d) = self.delay {
                tokio::time::sleep(d).await;
            }
            let list = self.lists.get(handle).ok_or(ApiError::Api {
                status: 404,
                message: "unknown user".into(),
            })?;
            Ok(list
                .iter()
                .filter_map(|v| RawWatchlistEntry::from_value(v.clone()))
                .collect())
        }
    }

    struct FakeTmdb;

    impl MetadataProvider for FakeTmdb {
        async fn lookup(&self, kind: MediaKind, id: u64) -> Result<Option<MetadataRecord>, ApiError> {
            Ok(Some(MetadataRecord {
                id,
                title: Some(format!("Film {id}")),
                release_date: Some("2010-01-01".into()),
                poster_path: Some(format!("/{id}.jpg")),
                vote_average: Some(6.5),
                ..Default::default()
            }
            .tagged(kind)))
        }

        async fn search(&self, _query: &SearchQuery) -> Result<Vec<MetadataRecord>, ApiError> {
            Ok(Vec::new())
        }
    }

    fn proxy() -> FakeProxy {
        let mut proxy = FakeProxy::default();
        proxy.lists.insert(
            "alice".into(),
            vec![json!({ "tmdb_id": 1 }), json!({ "tmdb_id": 2 })],
        );
        proxy
            .lists
            .insert("bob".into(), vec![json!({ "tmdb_id": 3 })]);
        proxy
    }

    fn runtime(proxy: FakeProxy) -> Runtime<FakeProxy, FakeTmdb> {
        let storage = Arc::new(Storage::open_memory().unwrap());
        let today = NaiveDate::from_ymd_opt(2024, 6, 15).unwrap();
        Runtime::with_parts(AppConfig::default(), storage, proxy, FakeTmdb, Some(today)).unwrap()
    }

    fn user(handle: &str) -> ConfigPatch {
        ConfigPatch {
            account_handle: Some(handle.into()),
            ..Default::default()
        }
    }

    async fn wait_for_run(events: &mut broadcast::Receiver<PipelineEvent>) -> RunReport {
        loop {
            if let Ok(PipelineEvent::RunFinished(report)) = events.recv().await {
                return report;
            }
        }
    }

    #[tokio::test]
    async fn test_unconfigured_shows_configure_card() {
        let proxy = proxy();
        let calls = proxy.calls.clone();
        let rt = runtime(proxy);

        let snap = rt.snapshot_for_display().unwrap();
        assert_eq!(snap.state, PipelineState::Idle);
        assert!(snap.items.is_empty());

        let cards = rt.cards().unwrap();
        assert!(matches!(
            cards[0],
            CardDescriptor::Placeholder {
                kind: PlaceholderKind::Configure,
                ..
            }
        ));

        let report = rt.refresh().await.unwrap();
        assert_eq!(report.state, PipelineState::Idle);
        assert_eq!(calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_save_settings_starts_run() {
        let rt = runtime(proxy());
        let mut events = rt.subscribe();

        let cfg = rt.save_settings(&user("alice")).unwrap();
        assert_eq!(cfg.account_handle, "alice");
        assert_eq!(rt.snapshot_for_display().unwrap().state, PipelineState::Loading);

        let report = wait_for_run(&mut events).await;
        assert_eq!(report.state, PipelineState::Ready);

        let snap = rt.snapshot_for_display().unwrap();
        assert_eq!(snap.state, PipelineState::Ready);
        assert_eq!(snap.items.len(), 2);
        assert!(!snap.stale);
        assert!(snap.fetched_at.is_some());
        assert_eq!(
            snap.items[0].poster_url,
            "https://image.tmdb.org/t/p/w300/1.jpg"
        );
    }

    #[tokio::test]
    async fn test_first_display_shows_cache_while_revalidating() {
        let rt = runtime(proxy());
        rt.settings.set(&user("alice")).unwrap();
        let old = CanonicalItem {
            external_id: Some(99),
            title: "Old".into(),
            ..Default::default()
        };
        rt.orchestrator().cache().store("alice", &[old.clone()]).unwrap();
        let mut events = rt.subscribe();

        let snap = rt.snapshot_for_display().unwrap();
        assert_eq!(snap.state, PipelineState::Loading);
        assert_eq!(snap.items, vec![old]);

        wait_for_run(&mut events).await;
        let snap = rt.snapshot_for_display().unwrap();
        assert_eq!(snap.state, PipelineState::Ready);
        assert_eq!(snap.items.len(), 2);
    }

    #[tokio::test]
    async fn test_failed_refresh_keeps_stale_items() {
        let rt = runtime(proxy());
        rt.settings.set(&user("carol")).unwrap();
        let old = CanonicalItem {
            external_id: Some(5),
            title: "Kept".into(),
            ..Default::default()
        };
        rt.orchestrator().cache().store("carol", &[old.clone()]).unwrap();

        let report = rt.refresh().await.unwrap();
        assert_eq!(report.state, PipelineState::Error);

        let snap = rt.snapshot_for_display().unwrap();
        assert_eq!(snap.state, PipelineState::Error);
        assert_eq!(snap.items, vec![old]);
        assert!(snap.stale);
        assert!(snap.error_detail.is_some());
        assert!(!rt.orchestrator().is_running("carol"));
    }

    #[tokio::test]
    async fn test_error_without_cache_offers_retry() {
        let rt = runtime(proxy());
        rt.settings.set(&user("carol")).unwrap();
        rt.refresh().await.unwrap();

        match rt.cards().unwrap().remove(0) {
            CardDescriptor::Placeholder { kind, action, .. } => {
                assert_eq!(kind, PlaceholderKind::Error);
                assert_eq!(action, Some(HostAction::Refresh));
            }
            other => panic!("expected error placeholder, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_switching_account_clears_old_cache() {
        let rt = runtime(proxy());
        rt.settings.set(&user("alice")).unwrap();
        rt.refresh().await.unwrap();
        assert!(rt.orchestrator().cache().load("alice").is_some());

        let mut events = rt.subscribe();
        rt.save_settings(&user("bob")).unwrap();
        assert!(rt.orchestrator().cache().load("alice").is_none());

        let report = wait_for_run(&mut events).await;
        assert_eq!(report.handle, "bob");
        assert_eq!(rt.orchestrator().cache().load("bob").unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_switching_account_mid_run_leaves_no_old_row() {
        let rt = runtime(FakeProxy {
            delay: Some(Duration::from_millis(50)),
            ..proxy()
        });
        let mut events = rt.subscribe();

        rt.save_settings(&user("alice")).unwrap();
        rt.save_settings(&user("bob")).unwrap();

        let mut finished = Vec::new();
        while finished.len() < 2 {
            finished.push(wait_for_run(&mut events).await);
        }
        let alice = finished.iter().find(|r| r.handle == "alice").unwrap();
        assert_eq!(alice.state, PipelineState::Idle);
        assert!(rt.orchestrator().cache().load("alice").is_none());
        assert_eq!(rt.orchestrator().cache().load("bob").unwrap().len(), 1);
        assert_eq!(rt.snapshot_for_display().unwrap().state, PipelineState::Ready);
    }

    #[tokio::test]
    async fn test_select_index() {
        let rt = runtime(proxy());
        rt.settings.set(&user("alice")).unwrap();
        rt.refresh().await.unwrap();

        assert_eq!(
            rt.select_index(1).unwrap(),
            HostAction::OpenDetail {
                source: DETAIL_SOURCE.into(),
                id: 2,
                kind: MediaKind::Movie,
            }
        );
        assert!(matches!(rt.select_index(7), Err(RuntimeError::NotFound(_))));
    }

    #[tokio::test]
    async fn test_open_settings_reports_bounds() {
        let rt = runtime(proxy());
        rt.settings
            .set(&ConfigPatch {
                page_count: Some(9),
                ..Default::default()
            })
            .unwrap();
        let view = rt.open_settings().unwrap();
        assert_eq!(view.current.page_count, MAX_PAGE_COUNT);
        assert_eq!(view.defaults.page_count, 1);
        assert_eq!((view.min_pages, view.max_pages), (1, 5));
    }

    #[tokio::test(start_paused = true)]
    async fn test_revalidation_runs_on_interval() {
        let proxy = proxy();
        let calls = proxy.calls.clone();
        let rt = runtime(proxy);
        rt.settings.set(&user("bob")).unwrap();
        rt.refresh().await.unwrap();
        let after_first = calls.load(Ordering::SeqCst);

        let mut events = rt.subscribe();
        let task = rt.spawn_revalidation(Duration::from_secs(60));
        let report = wait_for_run(&mut events).await;
        task.abort();

        assert_eq!(report.handle, "bob");
        assert_eq!(calls.load(Ordering::SeqCst), after_first * 2);
    }
}
