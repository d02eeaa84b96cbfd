use serde::{Deserialize, Serialize};
use serde_json::{json, Map, Value};

use marquee_api::types::{MediaKind, RawWatchlistEntry};

/// A watchlist entry after normalization (and, once cached, resolution).
///
/// This is the unit stored in the cache and handed to the host for rendering.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CanonicalItem {
    /// Metadata-provider id; `None` for title-only entries.
    pub external_id: Option<u64>,
    pub media_kind: MediaKind,
    pub title: String,
    /// Four digits, or empty when unknown.
    pub year: String,
    /// Absolute URL, or empty.
    pub poster_url: String,
    pub vote_average: f64,
    /// `YYYY-MM-DD`, or empty.
    pub release_date: String,
}

/// Identity used to drop duplicate entries.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum DedupeKey {
    Id(u64),
    Title { title: String, year: String },
}

impl std::fmt::Display for DedupeKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Id(id) => write!(f, "id:{id}"),
            Self::Title { title, year } => write!(f, "t:{title}|{year}"),
        }
    }
}

impl CanonicalItem {
    /// External id when known, otherwise `(title, year)`.
    pub fn dedupe_key(&self) -> DedupeKey {
        match self.external_id {
            Some(id) => DedupeKey::Id(id),
            None => DedupeKey::Title {
                title: self.title.clone(),
                year: self.year.clone(),
            },
        }
    }

    /// Secondary line for a card: year and kind.
    pub fn subtitle(&self) -> String {
        let kind = match self.media_kind {
            MediaKind::Movie => "Movie",
            MediaKind::Tv => "Series",
        };
        if self.year.is_empty() {
            kind.to_string()
        } else {
            format!("{} · {kind}", self.year)
        }
    }

    /// Re-express the item as a proxy-shaped entry using canonical field names.
    pub fn to_raw(&self) -> RawWatchlistEntry {
        let mut map = Map::new();
        if let Some(id) = self.external_id {
            map.insert("external_id".into(), json!(id));
        }
        map.insert("media_kind".into(), json!(self.media_kind.as_str()));
        map.insert("title".into(), Value::String(self.title.clone()));
        map.insert("year".into(), Value::String(self.year.clone()));
        map.insert("poster_url".into(), Value::String(self.poster_url.clone()));
        map.insert("vote_average".into(), json!(self.vote_average));
        map.insert("release_date".into(), Value::String(self.release_date.clone()));
        RawWatchlistEntry(map)
    }
}
