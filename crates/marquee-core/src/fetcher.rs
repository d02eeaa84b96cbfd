use marquee_api::traits::{PageRequest, WatchlistSource};
use marquee_api::types::RawWatchlistEntry;
use url::Url;

use crate::error::FetchError;

/// Pulls a user's watchlist from the proxy, page by page if it has to.
pub struct Fetcher<S> {
    source: S,
}

impl<S: WatchlistSource> Fetcher<S> {
    pub fn new(source: S) -> Self {
        Self { source }
    }

    pub fn source(&self) -> &S {
        &self.source
    }

    /// Fetch `page_count` pages of `handle`'s watchlist.
    ///
    /// Tries one batched request first. If that fails, or comes back empty
    /// while more than one page was asked for, falls back to one request per
    /// page. In the fallback a failing page after the first is skipped; a
    /// failing first page fails the fetch.
    ///
    /// The result is the concatenation of the pages that loaded, in page order.
    /// An empty result is an empty watchlist, not an error.
    #[tracing::instrument(name = "fetch_watchlist", skip(self, endpoint), fields(endpoint = %endpoint))]
    pub async fn fetch(
        &self,
        handle: &str,
        page_count: u8,
        endpoint: &Url,
    ) -> Result<Vec<RawWatchlistEntry>, FetchError> {
        let page_count = page_count.max(1);

        match self
            .source
            .fetch_page(endpoint, handle, PageRequest::Batch(page_count))
            .await
        {
            Ok(items) if !items.is_empty() || page_count == 1 => {
                tracing::debug!(items = items.len(), "batched fetch succeeded");
                return Ok(items);
            }
            Ok(_) => {
                tracing::debug!("batched fetch returned nothing, fetching pages one by one");
            }
            Err(e) => {
                tracing::warn!(error = %e, "batched fetch failed, fetching pages one by one");
            }
        }

        self.fetch_sequential(handle, page_count, endpoint).await
    }

    async fn fetch_sequential(
        &self,
        handle: &str,
        page_count: u8,
        endpoint: &Url,
    ) -> Result<Vec<RawWatchlistEntry>, FetchError> {
        let mut all = Vec::new();
        let mut skipped = 0u8;

        for page in 1..=page_count {
            match self
                .source
                .fetch_page(endpoint, handle, PageRequest::Single(page))
                .await
            {
                Ok(items) => {
                    tracing::debug!(page, items = items.len(), "page fetched");
                    all.extend(items);
                }
                Err(e) if page == 1 => {
                    tracing::warn!(page, error = %e, "first watchlist page failed");
                    return Err(FetchError::from_api(page, e));
                }
                Err(e) => {
                    tracing::warn!(page, error = %e, "skipping failed watchlist page");
                    skipped += 1;
                }
            }
        }

        tracing::debug!(items = all.len(), skipped, "sequential fetch finished");
        Ok(all)
    }
}
