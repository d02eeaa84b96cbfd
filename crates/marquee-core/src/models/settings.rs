use serde::{Deserialize, Serialize};
use url::Url;

pub const MIN_PAGE_COUNT: u8 = 1;
pub const MAX_PAGE_COUNT: u8 = 5;

/// Per-user watchlist settings, edited from the host's settings screen.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WatchlistConfig {
    pub account_handle: String,
    /// Watchlist pages to fetch, `1..=5`.
    pub page_count: u8,
    pub proxy_endpoint: Url,
}

impl WatchlistConfig {
    pub fn new(account_handle: impl Into<String>, page_count: u8, proxy_endpoint: Url) -> Self {
        Self {
            account_handle: account_handle.into().trim().to_string(),
            page_count: clamp_pages(page_count as i64),
            proxy_endpoint,
        }
    }

    /// An empty handle means the row has nothing to show yet.
    pub fn is_configured(&self) -> bool {
        !self.account_handle.is_empty()
    }

    /// Overlay `patch` onto `self`.
    pub fn apply(&mut self, patch: &ConfigPatch) {
        if let Some(handle) = &patch.account_handle {
            self.account_handle = handle.trim().to_string();
        }
        if let Some(pages) = patch.page_count {
            self.page_count = clamp_pages(pages);
        }
        if let Some(endpoint) = &patch.proxy_endpoint {
            self.proxy_endpoint = endpoint.clone();
        }
    }
}

/// A partial settings update. `None` fields are left as they are.
///
/// Also the persisted form: only fields the user has set are stored, so
/// defaults changed in a later release still apply to everything else.
/// The aliases accept older records keyed `user` / `pages` / `worker`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConfigPatch {
    #[serde(default, alias = "user", skip_serializing_if = "Option::is_none")]
    pub account_handle: Option<String>,
    #[serde(
        default,
        alias = "pages",
        deserialize_with = "lenient_pages",
        skip_serializing_if = "Option::is_none"
    )]
    pub page_count: Option<i64>,
    #[serde(default, alias = "worker", skip_serializing_if = "Option::is_none")]
    pub proxy_endpoint: Option<Url>,
}

impl ConfigPatch {
    pub fn is_empty(&self) -> bool {
        self.account_handle.is_none() && self.page_count.is_none() && self.proxy_endpoint.is_none()
    }

    /// Fold `other` into `self`; fields set in `other` win.
    pub fn merge(&mut self, other: &ConfigPatch) {
        if other.account_handle.is_some() {
            self.account_handle.clone_from(&other.account_handle);
        }
        if other.page_count.is_some() {
            self.page_count = other.page_count;
        }
        if other.proxy_endpoint.is_some() {
            self.proxy_endpoint.clone_from(&other.proxy_endpoint);
        }
    }
}

/// Clamp any page count into `MIN_PAGE_COUNT..=MAX_PAGE_COUNT`.
pub fn clamp_pages(pages: i64) -> u8 {
    pages.clamp(MIN_PAGE_COUNT as i64, MAX_PAGE_COUNT as i64) as u8
}

/// Settings screens store select values as strings ("2"); accept both.
fn lenient_pages<'de, D>(deserializer: D) -> Result<Option<i64>, D::Error>
where
    D: serde::Deserializer<'de>,
{
    let value = Option::<serde_json::Value>::deserialize(deserializer)?;
    Ok(match value {
        Some(serde_json::Value::Number(n)) => n.as_i64().or_else(|| n.as_f64().map(|f| f as i64)),
        Some(serde_json::Value::String(s)) => s.trim().parse().ok(),
        _ => None,
    })
}
