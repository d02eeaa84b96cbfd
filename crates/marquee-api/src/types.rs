use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::error::ApiError;

// ── Media kind ──────────────────────────────────────────────────

/// Movie or TV series.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MediaKind {
    #[default]
    Movie,
    Tv,
}

impl MediaKind {
    /// Path segment and wire value (`movie` / `tv`).
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Movie => "movie",
            Self::Tv => "tv",
        }
    }

    /// Parse an upstream kind tag. Unknown tags (`person`, `collection`) are `None`.
    pub fn from_tag(s: &str) -> Option<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "movie" | "film" => Some(Self::Movie),
            "tv" | "show" | "series" | "tv_show" => Some(Self::Tv),
            _ => None,
        }
    }
}

impl std::fmt::Display for MediaKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

// ── Watchlist entries ───────────────────────────────────────────

/// One watchlist entry as served by the proxy.
///
/// The proxy's field names vary between deployments, so the entry is kept
/// as a loose JSON object; `marquee-core` maps it onto the canonical shape.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RawWatchlistEntry(pub Map<String, Value>);

impl RawWatchlistEntry {
    pub fn get(&self, field: &str) -> Option<&Value> {
        self.0.get(field)
    }

    /// Wrap a JSON value; non-objects are not entries.
    pub fn from_value(value: Value) -> Option<Self> {
        match value {
            Value::Object(map) => Some(Self(map)),
            _ => None,
        }
    }
}

impl From<Map<String, Value>> for RawWatchlistEntry {
    fn from(map: Map<String, Value>) -> Self {
        Self(map)
    }
}

/// Extract the entry list from a proxy response body.
///
/// The proxy answers with either `{ "items": [...] }` or a bare array.
/// An object without `items` is an empty page; non-object array members are
/// skipped.
pub fn parse_watchlist_body(body: Value) -> Result<Vec<RawWatchlistEntry>, ApiError> {
    let items = match body {
        Value::Array(items) => items,
        Value::Object(mut obj) => match obj.remove("items") {
            Some(Value::Array(items)) => items,
            None | Some(Value::Null) => Vec::new(),
            Some(other) => {
                return Err(ApiError::Parse(format!(
                    "expected `items` to be an array, got {}",
                    json_kind(&other)
                )))
            }
        },
        other => {
            return Err(ApiError::Parse(format!(
                "expected an object or array, got {}",
                json_kind(&other)
            )))
        }
    };

    let total = items.len();
    let entries: Vec<RawWatchlistEntry> = items
        .into_iter()
        .filter_map(RawWatchlistEntry::from_value)
        .collect();
    if entries.len() < total {
        tracing::debug!(skipped = total - entries.len(), "ignored non-object watchlist items");
    }
    Ok(entries)
}

fn json_kind(v: &Value) -> &'static str {
    match v {
        Value::Null => "null",
        Value::Bool(_) => "a boolean",
        Value::Number(_) => "a number",
        Value::String(_) => "a string",
        Value::Array(_) => "an array",
        Value::Object(_) => "an object",
    }
}

// ── Metadata records ────────────────────────────────────────────

/// A movie or series record from the metadata provider.
///
/// Movies carry `title`/`release_date`, series carry `name`/`first_air_date`;
/// both shapes deserialize into this one struct.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct MetadataRecord {
    pub id: u64,
    #[serde(default)]
    pub media_type: Option<String>,
    #[serde(default)]
    pub title: Option<String>,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub release_date: Option<String>,
    #[serde(default)]
    pub first_air_date: Option<String>,
    #[serde(default)]
    pub poster_path: Option<String>,
    #[serde(default)]
    pub vote_average: Option<f64>,
}

impl MetadataRecord {
    /// Kind tag, if this record is a movie or series.
    pub fn kind(&self) -> Option<MediaKind> {
        self.media_type.as_deref().and_then(MediaKind::from_tag)
    }

    /// Best available display title.
    pub fn display_title(&self) -> Option<&str> {
        non_empty(self.title.as_deref()).or_else(|| non_empty(self.name.as_deref()))
    }

    /// Release date (movies) or first air date (series).
    pub fn date(&self) -> Option<&str> {
        non_empty(self.release_date.as_deref()).or_else(|| non_empty(self.first_air_date.as_deref()))
    }

    /// Tag the record with `kind` unless the provider already did.
    pub fn tagged(mut self, kind: MediaKind) -> Self {
        if self.media_type.is_none() {
            self.media_type = Some(kind.as_str().to_string());
        }
        self
    }
}

fn non_empty(s: Option<&str>) -> Option<&str> {
    s.map(str::trim).filter(|s| !s.is_empty())
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    #[test]
    fn test_body_items_object() {
        let body = json!({ "items": [{ "title": "A" }, { "title": "B" }] });
        let entries = parse_watchlist_body(body).unwrap();
        assert_eq!(entries.len(), 2);
        assert_eq!(entries[1].get("title"), Some(&json!("B")));
    }

    #[test]
    fn test_body_bare_array_skips_non_objects() {
        let body = json!([{ "title": "A" }, 42, "junk", { "name": "B" }]);
        let entries = parse_watchlist_body(body).unwrap();
        assert_eq!(entries.len(), 2);
    }

    #[test]
    fn test_body_without_items_is_empty() {
        assert!(parse_watchlist_body(json!({ "user": "alice" })).unwrap().is_empty());
        assert!(parse_watchlist_body(json!({ "items": null })).unwrap().is_empty());
    }

    #[test]
    fn test_body_malformed() {
        assert!(matches!(
            parse_watchlist_body(json!("oops")),
            Err(ApiError::Parse(_))
        ));
        assert!(matches!(
            parse_watchlist_body(json!({ "items": 3 })),
            Err(ApiError::Parse(_))
        ));
    }

    #[test]
    fn test_media_kind_tags() {
        assert_eq!(MediaKind::from_tag("TV"), Some(MediaKind::Tv));
        assert_eq!(MediaKind::from_tag("movie"), Some(MediaKind::Movie));
        assert_eq!(MediaKind::from_tag("person"), None);
    }

    #[test]
    fn test_record_movie_and_series_shapes() {
        let movie: MetadataRecord = serde_json::from_value(json!({
            "id": 603, "title": "The Matrix", "release_date": "1999-03-30",
            "poster_path": "/m.jpg", "vote_average": 8.2
        }))
        .unwrap();
        assert_eq!(movie.display_title(), Some("The Matrix"));
        assert_eq!(movie.date(), Some("1999-03-30"));

        let series: MetadataRecord = serde_json::from_value(json!({
            "id": 1396, "name": "Breaking Bad", "first_air_date": "2008-01-20",
            "media_type": "tv"
        }))
        .unwrap();
        assert_eq!(series.display_title(), Some("Breaking Bad"));
        assert_eq!(series.date(), Some("2008-01-20"));
        assert_eq!(series.kind(), Some(MediaKind::Tv));
    }

    #[test]
    fn test_record_empty_date_falls_through() {
        let rec = MetadataRecord {
            id: 1,
            release_date: Some(String::new()),
            first_air_date: Some("2010-05-01".into()),
            ..Default::default()
        };
        assert_eq!(rec.date(), Some("2010-05-01"));
        assert_eq!(rec.tagged(MediaKind::Tv).kind(), Some(MediaKind::Tv));
    }
}
