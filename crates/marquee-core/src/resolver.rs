use chrono::{Datelike, Local, NaiveDate};
use futures::future::join_all;
use tokio::sync::Semaphore;

use marquee_api::traits::{MetadataProvider, SearchQuery};
use marquee_api::types::{MediaKind, MetadataRecord, RawWatchlistEntry};
use marquee_api::ApiError;

use crate::models::CanonicalItem;
use crate::normalize::{NormalizedEntry, Normalizer};

/// What happened to one watchlist entry during resolution.
#[derive(Debug)]
pub enum Outcome {
    Resolved(CanonicalItem),
    /// The provider has no matching record.
    Miss,
    /// Matched, but releases after today.
    Unreleased(CanonicalItem),
    /// Transport or parse failure; the entry is dropped for this run.
    Failed(ApiError),
}

impl Outcome {
    pub fn into_item(self) -> Option<CanonicalItem> {
        match self {
            Self::Resolved(item) => Some(item),
            _ => None,
        }
    }
}

/// Resolves watchlist entries to provider records and applies the release filter.
pub struct Resolver<P> {
    provider: P,
    normalizer: Normalizer,
    today: Option<NaiveDate>,
}

impl<P: MetadataProvider> Resolver<P> {
    pub fn new(provider: P, normalizer: Normalizer) -> Self {
        Self {
            provider,
            normalizer,
            today: None,
        }
    }

    /// Pin "today" for the release filter instead of reading the clock.
    pub fn with_today(mut self, today: NaiveDate) -> Self {
        self.today = Some(today);
        self
    }

    pub fn normalizer(&self) -> &Normalizer {
        &self.normalizer
    }

    fn today(&self) -> NaiveDate {
        self.today.unwrap_or_else(|| Local::now().date_naive())
    }

    /// Resolve one raw entry. `None` when it is unusable, unmatched,
    /// unreleased, or the provider failed.
    pub async fn resolve(&self, entry: &RawWatchlistEntry) -> Option<CanonicalItem> {
        let normalized = self.normalizer.map_entry(entry)?;
        self.resolve_entry(&normalized).await.into_item()
    }

    /// Resolve one normalized entry.
    pub async fn resolve_entry(&self, entry: &NormalizedEntry) -> Outcome {
        let (record, kind) = match self.find_record(entry).await {
            Ok(Some(found)) => found,
            Ok(None) => {
                tracing::debug!(title = %entry.item.title, "no metadata match");
                return Outcome::Miss;
            }
            Err(e) => {
                tracing::warn!(title = %entry.item.title, error = %e, "metadata lookup failed");
                return Outcome::Failed(e);
            }
        };

        let item = self.normalizer.from_record(&record, kind, &entry.item);
        if self.is_unreleased(&item) {
            tracing::debug!(title = %item.title, release_date = %item.release_date, "not released yet");
            return Outcome::Unreleased(item);
        }
        Outcome::Resolved(item)
    }

    /// Resolve a batch concurrently, at most `concurrency` lookups in flight.
    ///
    /// Waits for every entry; outcomes come back in input order.
    pub async fn resolve_all(&self, entries: &[NormalizedEntry], concurrency: usize) -> Vec<Outcome> {
        let permits = Semaphore::new(concurrency.max(1));
        let lookups: Vec<_> = entries
            .iter()
            .map(|entry| self.resolve_limited(entry, &permits))
            .collect();
        join_all(lookups).await
    }

    async fn resolve_limited(&self, entry: &NormalizedEntry, permits: &Semaphore) -> Outcome {
        // The semaphore is never closed, so acquire cannot fail.
        let _permit = permits.acquire().await;
        self.resolve_entry(entry).await
    }

    /// Strictly after today. Unknown dates count as released.
    pub fn is_unreleased(&self, item: &CanonicalItem) -> bool {
        NaiveDate::parse_from_str(&item.release_date, "%Y-%m-%d")
            .map(|date| date > self.today())
            .unwrap_or(false)
    }

    async fn find_record(
        &self,
        entry: &NormalizedEntry,
    ) -> Result<Option<(MetadataRecord, MediaKind)>, ApiError> {
        if let Some(id) = entry.item.external_id {
            let kind = entry.kind_hint.unwrap_or_default();
            return Ok(self.provider.lookup(kind, id).await?.map(|r| (r, kind)));
        }

        if let Some(imdb_id) = &entry.imdb_id {
            if let Some(record) = self.provider.find_by_imdb(imdb_id).await? {
                let kind = record.kind().unwrap_or_default();
                return Ok(Some((record, kind)));
            }
        }

        if entry.item.title.is_empty() {
            return Ok(None);
        }
        let query = SearchQuery {
            title: entry.item.title.clone(),
            year: (!entry.item.year.is_empty()).then(|| entry.item.year.clone()),
            kind_hint: entry.kind_hint,
        };
        let results = self.provider.search(&query).await?;
        Ok(pick_result(results, &query, self.today()))
    }
}

/// Choose a search result for `query`.
///
/// Only movies and series are candidates; people and collections are
/// skipped. With a tv hint, series rank ahead of movies. A candidate from
/// the query's year beats the provider's ranking. When none matches a year
/// that is still ahead of `today`, there is no match: an older film sharing
/// the title is not the one on the watchlist.
pub fn pick_result(
    results: Vec<MetadataRecord>,
    query: &SearchQuery,
    today: NaiveDate,
) -> Option<(MetadataRecord, MediaKind)> {
    let mut candidates: Vec<(MetadataRecord, MediaKind)> = results
        .into_iter()
        .filter_map(|r| r.kind().map(|kind| (r, kind)))
        .collect();
    if query.kind_hint == Some(MediaKind::Tv) {
        // Stable, so ranking order holds within each kind.
        candidates.sort_by_key(|(_, kind)| *kind != MediaKind::Tv);
    }

    let Some(year) = query.year.as_deref() else {
        return candidates.into_iter().next();
    };
    if let Some(pos) = candidates
        .iter()
        .position(|(r, _)| r.date().and_then(|d| d.get(..4)) == Some(year))
    {
        return Some(candidates.swap_remove(pos));
    }
    match year.parse::<i32>() {
        Ok(y) if y > today.year() => None,
        _ => candidates.into_iter().next(),
    }
}
