use std::sync::Arc;

use url::Url;

use crate::config::AppConfig;
use crate::error::MarqueeError;
use crate::models::{ConfigPatch, WatchlistConfig};
use crate::storage::Storage;

const CONFIG_KEY: &str = "config:watchlist";

/// Persistent watchlist settings: defaults with the user's overrides on top.
pub struct ConfigStore {
    storage: Arc<Storage>,
    defaults: WatchlistConfig,
}

impl ConfigStore {
    pub fn new(storage: Arc<Storage>, defaults: WatchlistConfig) -> Self {
        Self { storage, defaults }
    }

    /// Defaults derived from the application config.
    pub fn defaults_from(app: &AppConfig) -> Result<WatchlistConfig, MarqueeError> {
        let endpoint = Url::parse(&app.proxy.default_endpoint).map_err(|e| {
            MarqueeError::Config(format!(
                "proxy.default_endpoint `{}`: {e}",
                app.proxy.default_endpoint
            ))
        })?;
        Ok(WatchlistConfig::new("", 1, endpoint))
    }

    pub fn defaults(&self) -> &WatchlistConfig {
        &self.defaults
    }

    /// Current settings. A corrupt stored record is logged and ignored.
    pub fn get(&self) -> Result<WatchlistConfig, MarqueeError> {
        let overrides = self.overrides()?;
        let mut config = self.defaults.clone();
        config.apply(&overrides);
        Ok(config)
    }

    /// Merge `patch` into the stored overrides, persist, and return the result.
    pub fn set(&self, patch: &ConfigPatch) -> Result<WatchlistConfig, MarqueeError> {
        let mut overrides = self.overrides()?;
        overrides.merge(patch);

        let mut config = self.defaults.clone();
        config.apply(&overrides);

        // Store the clamped values, not whatever the caller sent.
        let stored = ConfigPatch {
            account_handle: overrides.account_handle.map(|_| config.account_handle.clone()),
            page_count: overrides.page_count.map(|_| config.page_count as i64),
            proxy_endpoint: overrides.proxy_endpoint,
        };
        self.storage.put_json(CONFIG_KEY, &stored)?;
        tracing::info!(
            handle = %config.account_handle,
            pages = config.page_count,
            endpoint = %config.proxy_endpoint,
            "saved watchlist settings"
        );
        Ok(config)
    }

    fn overrides(&self) -> Result<ConfigPatch, MarqueeError> {
        match self.storage.get_json::<ConfigPatch>(CONFIG_KEY) {
            Ok(stored) => Ok(stored.unwrap_or_default()),
            Err(MarqueeError::Serde(e)) => {
                tracing::warn!(error = %e, "stored watchlist settings unreadable, using defaults");
                Ok(ConfigPatch::default())
            }
            Err(e) => Err(e),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn store() -> ConfigStore {
        let storage = Arc::new(Storage::open_memory().unwrap());
        let defaults = ConfigStore::defaults_from(&AppConfig::default()).unwrap();
        ConfigStore::new(storage, defaults)
    }

    #[test]
    fn test_get_returns_defaults_when_unset() {
        let store = store();
        let cfg = store.get().unwrap();
        assert_eq!(cfg.account_handle, "");
        assert_eq!(cfg.page_count, 1);
        assert_eq!(
            cfg.proxy_endpoint.as_str(),
            "https://lbox-proxy.nellrun.workers.dev/"
        );
        assert!(!cfg.is_configured());
    }

    #[test]
    fn test_set_merges_and_persists() {
        let store = store();
        store
            .set(&ConfigPatch {
                account_handle: Some("alice".into()),
                ..Default::default()
            })
            .unwrap();
        let cfg = store
            .set(&ConfigPatch {
                page_count: Some(2),
                ..Default::default()
            })
            .unwrap();
        assert_eq!(cfg.account_handle, "alice");
        assert_eq!(cfg.page_count, 2);
        assert_eq!(store.get().unwrap(), cfg);
    }

    #[test]
    fn test_set_clamps_page_count() {
        let store = store();
        let cfg = store
            .set(&ConfigPatch {
                page_count: Some(12),
                ..Default::default()
            })
            .unwrap();
        assert_eq!(cfg.page_count, 5);

        let raw: ConfigPatch = store.storage.get_json(CONFIG_KEY).unwrap().unwrap();
        assert_eq!(raw.page_count, Some(5));
    }

    #[test]
    fn test_corrupt_record_falls_back_to_defaults() {
        let store = store();
        store.storage.put(CONFIG_KEY, "[1,2").unwrap();
        assert_eq!(store.get().unwrap().page_count, 1);
    }

    #[test]
    fn test_legacy_record_is_read() {
        let store = store();
        store
            .storage
            .put(CONFIG_KEY, r#"{"user":"bob","pages":"3"}"#)
            .unwrap();
        let cfg = store.get().unwrap();
        assert_eq!(cfg.account_handle, "bob");
        assert_eq!(cfg.page_count, 3);
    }

    #[test]
    fn test_invalid_default_endpoint() {
        let mut app = AppConfig::default();
        app.proxy.default_endpoint = "not a url".into();
        assert!(matches!(
            ConfigStore::defaults_from(&app),
            Err(MarqueeError::Config(_))
        ));
    }
}
