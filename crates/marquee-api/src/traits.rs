//! Trait definitions for the upstream services.
//!
//! The HTTP clients in [`crate::proxy`] and [`crate::tmdb`] implement these
//! traits, so the fetch and resolve stages can run against any source,
//! including in-memory fakes in tests.

use std::future::Future;

use url::Url;

use crate::error::ApiError;
use crate::types::{MediaKind, MetadataRecord, RawWatchlistEntry};

/// Which slice of the watchlist a proxy request asks for.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PageRequest {
    /// All pages `1..=n` in one request (`&pages=n`).
    Batch(u8),
    /// A single page (`&page=i`), 1-based.
    Single(u8),
}

impl PageRequest {
    /// Query parameter name and value for this request.
    pub fn query_pair(self) -> (&'static str, String) {
        match self {
            Self::Batch(n) => ("pages", n.to_string()),
            Self::Single(i) => ("page", i.to_string()),
        }
    }
}

/// A service that serves a user's watchlist as JSON.
pub trait WatchlistSource: Send + Sync {
    /// Fetch one page (or a batch of pages) of `handle`'s watchlist.
    fn fetch_page(
        &self,
        endpoint: &Url,
        handle: &str,
        request: PageRequest,
    ) -> impl Future<Output = Result<Vec<RawWatchlistEntry>, ApiError>> + Send;
}

/// Title/year search parameters.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SearchQuery {
    pub title: String,
    /// Four-digit year, if known.
    pub year: Option<String>,
    /// Kind hinted by the watchlist entry. Narrows the search endpoint.
    pub kind_hint: Option<MediaKind>,
}

/// A movie/TV metadata catalog.
pub trait MetadataProvider: Send + Sync {
    /// Look up a record by provider id. `Ok(None)` when the provider has no
    /// such record.
    fn lookup(
        &self,
        kind: MediaKind,
        id: u64,
    ) -> impl Future<Output = Result<Option<MetadataRecord>, ApiError>> + Send;

    /// Search by title (and year). Results keep the provider's ranking.
    fn search(
        &self,
        query: &SearchQuery,
    ) -> impl Future<Output = Result<Vec<MetadataRecord>, ApiError>> + Send;

    /// Find a record by IMDb id. Providers without cross-references return
    /// `Ok(None)`.
    fn find_by_imdb(
        &self,
        _imdb_id: &str,
    ) -> impl Future<Output = Result<Option<MetadataRecord>, ApiError>> + Send {
        async { Ok(None) }
    }
}
