use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::MarqueeError;
use crate::models::CanonicalItem;
use crate::storage::Storage;

const KEY_PREFIX: &str = "cache:";

/// The last successfully resolved row for one account handle.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CacheSnapshot {
    pub items: Vec<CanonicalItem>,
    pub fetched_at: DateTime<Utc>,
}

impl CacheSnapshot {
    /// Older than `max_age` at `now`.
    pub fn is_stale_at(&self, max_age: chrono::Duration, now: DateTime<Utc>) -> bool {
        now - self.fetched_at > max_age
    }

    pub fn is_stale(&self, max_age: chrono::Duration) -> bool {
        self.is_stale_at(max_age, Utc::now())
    }
}

/// Per-handle snapshot cache on top of [`Storage`].
///
/// Snapshots are written whole; nothing ever appends to a stored list.
#[derive(Clone)]
pub struct Cache {
    storage: Arc<Storage>,
}

impl Cache {
    pub fn new(storage: Arc<Storage>) -> Self {
        Self { storage }
    }

    fn key(handle: &str) -> String {
        format!("{KEY_PREFIX}{handle}")
    }

    /// Cached items for `handle`, if any.
    pub fn load(&self, handle: &str) -> Option<Vec<CanonicalItem>> {
        self.snapshot(handle).map(|s| s.items)
    }

    /// Full snapshot for `handle`. Unreadable snapshots are logged and treated as absent.
    pub fn snapshot(&self, handle: &str) -> Option<CacheSnapshot> {
        match self.storage.get_json::<CacheSnapshot>(&Self::key(handle)) {
            Ok(snapshot) => snapshot,
            Err(e) => {
                tracing::warn!(handle, error = %e, "ignoring unreadable cache snapshot");
                None
            }
        }
    }

    /// Replace the snapshot for `handle`.
    pub fn store(&self, handle: &str, items: &[CanonicalItem]) -> Result<CacheSnapshot, MarqueeError> {
        let snapshot = CacheSnapshot {
            items: items.to_vec(),
            fetched_at: Utc::now(),
        };
        self.storage.put_json(&Self::key(handle), &snapshot)?;
        tracing::debug!(handle, items = items.len(), "cache snapshot stored");
        Ok(snapshot)
    }

    pub fn clear(&self, handle: &str) -> Result<(), MarqueeError> {
        self.storage.delete(&Self::key(handle))?;
        tracing::debug!(handle, "cache snapshot cleared");
        Ok(())
    }
}
