//! Field-mapping normalizer for watchlist entries.
//!
//! Proxy deployments disagree on field names (`tmdb_id` vs `tmdb` vs
//! `id_tmdb`, `title` vs `name`, ...). Every accepted spelling lives in
//! [`FIELD_ALIASES`]; supporting a new upstream alias means adding a string
//! there, nothing else.
//!
//! The canonical field names are themselves aliases, so feeding
//! [`CanonicalItem::to_raw`] output back through [`normalize`] is a no-op.

use std::collections::HashSet;

use chrono::NaiveDate;
use serde_json::Value;

use marquee_api::types::{MediaKind, MetadataRecord, RawWatchlistEntry};

use crate::models::CanonicalItem;

/// Image base for provider-relative poster paths.
pub const DEFAULT_IMAGE_BASE: &str = "https://image.tmdb.org/t/p/w300";

/// A canonical field that can be read from a raw entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Field {
    ExternalId,
    ImdbId,
    Title,
    Year,
    Kind,
    Poster,
    VoteAverage,
    ReleaseDate,
}

/// Upstream spellings of each field, highest priority first.
pub const FIELD_ALIASES: &[(Field, &[&str])] = &[
    (Field::ExternalId, &["tmdb_id", "tmdb", "id_tmdb", "external_id"]),
    (Field::ImdbId, &["imdb_id", "imdb"]),
    (Field::Title, &["title", "name"]),
    (
        Field::Year,
        &["year", "release_year", "release_date", "first_air_date"],
    ),
    (Field::Kind, &["media_type", "type", "media_kind"]),
    (Field::Poster, &["poster", "poster_path", "poster_url"]),
    (Field::VoteAverage, &["vote_average"]),
    (Field::ReleaseDate, &["release_date", "first_air_date"]),
];

/// Aliases for `field`, in priority order.
pub fn aliases(field: Field) -> &'static [&'static str] {
    FIELD_ALIASES
        .iter()
        .find(|(f, _)| *f == field)
        .map(|(_, names)| *names)
        .unwrap_or(&[])
}

/// A normalized entry plus the hints resolution needs but the cache does not keep.
#[derive(Debug, Clone, PartialEq)]
pub struct NormalizedEntry {
    pub item: CanonicalItem,
    /// Kind as tagged upstream; `item.media_kind` defaults to movie without one.
    pub kind_hint: Option<MediaKind>,
    pub imdb_id: Option<String>,
}

/// Maps raw entries and provider records onto [`CanonicalItem`].
#[derive(Debug, Clone)]
pub struct Normalizer {
    image_base: String,
}

impl Default for Normalizer {
    fn default() -> Self {
        Self::new(DEFAULT_IMAGE_BASE)
    }
}

impl Normalizer {
    pub fn new(image_base: impl Into<String>) -> Self {
        Self {
            image_base: image_base.into(),
        }
    }

    /// Normalize and dedupe a batch. Earlier entries win over later duplicates.
    pub fn normalize(&self, raw: &[RawWatchlistEntry]) -> Vec<CanonicalItem> {
        self.normalize_entries(raw)
            .into_iter()
            .map(|e| e.item)
            .collect()
    }

    /// Like [`Normalizer::normalize`], keeping the resolution hints.
    pub fn normalize_entries(&self, raw: &[RawWatchlistEntry]) -> Vec<NormalizedEntry> {
        let mut seen = HashSet::new();
        let mut out = Vec::with_capacity(raw.len());
        let mut unusable = 0usize;
        let mut duplicates = 0usize;

        for entry in raw {
            let Some(normalized) = self.map_entry(entry) else {
                unusable += 1;
                continue;
            };
            if seen.insert(normalized.item.dedupe_key()) {
                out.push(normalized);
            } else {
                duplicates += 1;
            }
        }

        if unusable > 0 || duplicates > 0 {
            tracing::debug!(
                kept = out.len(),
                unusable,
                duplicates,
                "normalized watchlist entries"
            );
        }
        out
    }

    /// Map one entry. `None` when it has neither an external id nor a title.
    pub fn map_entry(&self, entry: &RawWatchlistEntry) -> Option<NormalizedEntry> {
        let external_id = first_valid(entry, Field::ExternalId, parse_id);
        let title = first_valid(entry, Field::Title, parse_text).unwrap_or_default();
        if external_id.is_none() && title.is_empty() {
            return None;
        }

        let year = first_valid(entry, Field::Year, parse_year).unwrap_or_default();
        let kind_hint = first_valid(entry, Field::Kind, parse_kind);
        let poster_url = first_valid(entry, Field::Poster, parse_text)
            .map(|p| self.absolute_poster(&p))
            .unwrap_or_default();
        let vote_average = first_valid(entry, Field::VoteAverage, parse_vote).unwrap_or(0.0);
        let release_date = first_valid(entry, Field::ReleaseDate, parse_date)
            .unwrap_or_else(|| synthesize_date(&year));

        Some(NormalizedEntry {
            item: CanonicalItem {
                external_id,
                media_kind: kind_hint.unwrap_or_default(),
                title,
                year,
                poster_url,
                vote_average,
                release_date,
            },
            kind_hint,
            imdb_id: first_valid(entry, Field::ImdbId, parse_text),
        })
    }

    /// Build the canonical item for a provider record.
    ///
    /// Fields the record lacks fall back to the watchlist entry it resolves.
    pub fn from_record(
        &self,
        record: &MetadataRecord,
        kind: MediaKind,
        fallback: &CanonicalItem,
    ) -> CanonicalItem {
        let release_date = record
            .date()
            .and_then(|d| parse_date(&Value::String(d.to_string())));
        let year = release_date
            .as_deref()
            .map(|d| d[..4].to_string())
            .unwrap_or_else(|| fallback.year.clone());
        let poster_url = record
            .poster_path
            .as_deref()
            .map(|p| self.absolute_poster(p))
            .filter(|p| !p.is_empty())
            .unwrap_or_else(|| fallback.poster_url.clone());

        CanonicalItem {
            external_id: Some(record.id),
            media_kind: record.kind().unwrap_or(kind),
            title: record
                .display_title()
                .map(str::to_string)
                .unwrap_or_else(|| fallback.title.clone()),
            release_date: release_date.unwrap_or_else(|| synthesize_date(&year)),
            year,
            poster_url,
            vote_average: record
                .vote_average
                .filter(|v| v.is_finite() && *v >= 0.0)
                .unwrap_or(0.0),
        }
    }

    /// Rewrite a poster path to an absolute URL.
    pub fn absolute_poster(&self, path: &str) -> String {
        let path = path.trim();
        if path.is_empty() {
            return String::new();
        }
        if path.starts_with("http://") || path.starts_with("https://") {
            return path.to_string();
        }
        if let Some(rest) = path.strip_prefix("//") {
            return format!("https://{rest}");
        }
        format!(
            "{}/{}",
            self.image_base.trim_end_matches('/'),
            path.trim_start_matches('/')
        )
    }
}

/// Normalize with the default image base.
pub fn normalize(raw: &[RawWatchlistEntry]) -> Vec<CanonicalItem> {
    Normalizer::default().normalize(raw)
}

/// Drop later items whose dedupe key was already seen.
pub fn dedupe(items: impl IntoIterator<Item = CanonicalItem>) -> Vec<CanonicalItem> {
    let mut seen = HashSet::new();
    items
        .into_iter()
        .filter(|item| seen.insert(item.dedupe_key()))
        .collect()
}

// ── Field access ────────────────────────────────────────────────────

/// First alias of `field` whose value parses.
fn first_valid<T>(
    entry: &RawWatchlistEntry,
    field: Field,
    parse: impl Fn(&Value) -> Option<T>,
) -> Option<T> {
    aliases(field)
        .iter()
        .filter_map(|name| entry.get(name))
        .find_map(parse)
}

fn parse_id(v: &Value) -> Option<u64> {
    let id = match v {
        Value::Number(n) => n.as_u64().or_else(|| {
            n.as_f64()
                .filter(|f| f.fract() == 0.0 && *f > 0.0 && *f < u64::MAX as f64)
                .map(|f| f as u64)
        }),
        Value::String(s) => s.trim().parse().ok(),
        _ => None,
    }?;
    (id > 0).then_some(id)
}

fn parse_text(v: &Value) -> Option<String> {
    match v {
        Value::String(s) => {
            let s = s.trim();
            (!s.is_empty()).then(|| s.to_string())
        }
        // Titles like "1917" sometimes arrive as numbers.
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}

fn parse_year(v: &Value) -> Option<String> {
    let candidate = match v {
        Value::Number(n) => n.as_u64()?.to_string(),
        Value::String(s) => s.trim().chars().take(4).collect(),
        _ => return None,
    };
    let valid = candidate.len() == 4
        && candidate.bytes().all(|b| b.is_ascii_digit())
        && candidate != "0000";
    valid.then_some(candidate)
}

fn parse_kind(v: &Value) -> Option<MediaKind> {
    v.as_str().and_then(MediaKind::from_tag)
}

fn parse_vote(v: &Value) -> Option<f64> {
    let vote = match v {
        Value::Number(n) => n.as_f64()?,
        Value::String(s) => s.trim().parse().ok()?,
        _ => return None,
    };
    (vote.is_finite() && vote >= 0.0).then_some(vote)
}

/// Accepts `YYYY-MM-DD` and anything starting with it (timestamps).
/// The year must be four ASCII digits; chrono alone would take `-001-01-01`.
fn parse_date(v: &Value) -> Option<String> {
    let s = v.as_str()?.trim();
    let day = s.get(..10)?;
    if !day.as_bytes()[..4].iter().all(u8::is_ascii_digit) {
        return None;
    }
    NaiveDate::parse_from_str(day, "%Y-%m-%d")
        .ok()
        .map(|_| day.to_string())
}

fn synthesize_date(year: &str) -> String {
    if year.is_empty() {
        String::new()
    } else {
        format!("{year}-01-01")
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    fn raw(v: Value) -> RawWatchlistEntry {
        RawWatchlistEntry::from_value(v).unwrap()
    }

    fn batch(values: Vec<Value>) -> Vec<RawWatchlistEntry> {
        values.into_iter().map(raw).collect()
    }

    // ── Field mapping ─────────────────────────────────────────────────

    #[test]
    fn every_field_has_aliases() {
        for field in [
            Field::ExternalId,
            Field::ImdbId,
            Field::Title,
            Field::Year,
            Field::Kind,
            Field::Poster,
            Field::VoteAverage,
            Field::ReleaseDate,
        ] {
            assert!(!aliases(field).is_empty(), "{field:?} has no aliases");
        }
    }

    #[test]
    fn id_aliases_in_priority_order() {
        let n = Normalizer::default();
        let e = n.map_entry(&raw(json!({ "tmdb": 5, "id_tmdb": 6, "title": "X" }))).unwrap();
        assert_eq!(e.item.external_id, Some(5));
        let e = n.map_entry(&raw(json!({ "id_tmdb": "77", "name": "Y" }))).unwrap();
        assert_eq!(e.item.external_id, Some(77));
        assert_eq!(e.item.title, "Y");
    }

    #[test]
    fn zero_or_junk_id_is_unresolved() {
        let n = Normalizer::default();
        let e = n.map_entry(&raw(json!({ "tmdb_id": 0, "title": "X" }))).unwrap();
        assert_eq!(e.item.external_id, None);
        let e = n.map_entry(&raw(json!({ "tmdb_id": "abc", "title": "X" }))).unwrap();
        assert_eq!(e.item.external_id, None);
    }

    #[test]
    fn year_from_date_prefix_and_synthesized_release() {
        let n = Normalizer::default();
        let e = n
            .map_entry(&raw(json!({ "name": "Dark", "first_air_date": "2017-12-01", "media_type": "tv" })))
            .unwrap();
        assert_eq!(e.item.year, "2017");
        assert_eq!(e.item.release_date, "2017-12-01");
        assert_eq!(e.item.media_kind, MediaKind::Tv);
        assert_eq!(e.kind_hint, Some(MediaKind::Tv));

        let e = n.map_entry(&raw(json!({ "title": "A", "year": 2020 }))).unwrap();
        assert_eq!(e.item.release_date, "2020-01-01");
    }

    #[test]
    fn placeholder_year_falls_through() {
        let n = Normalizer::default();
        let e = n
            .map_entry(&raw(json!({ "title": "A", "year": "0000", "release_year": "1999" })))
            .unwrap();
        assert_eq!(e.item.year, "1999");

        let e = n.map_entry(&raw(json!({ "title": "A" }))).unwrap();
        assert_eq!(e.item.year, "");
        assert_eq!(e.item.release_date, "");
    }

    #[test]
    fn unknown_kind_defaults_to_movie_without_hint() {
        let n = Normalizer::default();
        let e = n.map_entry(&raw(json!({ "title": "A", "type": "person" }))).unwrap();
        assert_eq!(e.item.media_kind, MediaKind::Movie);
        assert_eq!(e.kind_hint, None);
    }

    #[test]
    fn imdb_id_is_kept_as_hint() {
        let n = Normalizer::default();
        let e = n.map_entry(&raw(json!({ "imdb": "tt0133093", "title": "The Matrix" }))).unwrap();
        assert_eq!(e.imdb_id.as_deref(), Some("tt0133093"));
    }

    #[test]
    fn entry_without_id_or_title_is_dropped() {
        let n = Normalizer::default();
        assert!(n.map_entry(&raw(json!({ "year": 2020, "poster": "/x.jpg" }))).is_none());
        assert!(n.map_entry(&raw(json!({ "title": "   " }))).is_none());
        assert!(n.map_entry(&raw(json!({ "tmdb_id": 9 }))).is_some());
    }

    // ── Posters ───────────────────────────────────────────────────────

    #[test]
    fn poster_paths_become_absolute() {
        let n = Normalizer::default();
        assert_eq!(
            n.absolute_poster("/abc.jpg"),
            "https://image.tmdb.org/t/p/w300/abc.jpg"
        );
        assert_eq!(
            n.absolute_poster("abc.jpg"),
            "https://image.tmdb.org/t/p/w300/abc.jpg"
        );
        assert_eq!(
            n.absolute_poster("https://a.ltrbxd.com/p.jpg"),
            "https://a.ltrbxd.com/p.jpg"
        );
        assert_eq!(n.absolute_poster("//cdn.example/p.jpg"), "https://cdn.example/p.jpg");
        assert_eq!(n.absolute_poster(""), "");
    }

    #[test]
    fn custom_image_base() {
        let n = Normalizer::new("https://img.example/w500/");
        assert_eq!(n.absolute_poster("/p.jpg"), "https://img.example/w500/p.jpg");
    }

    // ── Dedupe ────────────────────────────────────────────────────────

    #[test]
    fn one_item_per_external_id() {
        let items = normalize(&batch(vec![
            json!({ "tmdb_id": 100, "title": "A", "year": 2020 }),
            json!({ "tmdb": 100, "title": "A (dup)", "year": 2021 }),
            json!({ "tmdb_id": 200, "title": "B" }),
            json!({ "id_tmdb": "100", "name": "A again" }),
        ]));
        assert_eq!(items.len(), 2);
        assert_eq!(items[0].title, "A");
        assert_eq!(items[1].external_id, Some(200));
    }

    #[test]
    fn title_year_dedupe_without_id() {
        let items = normalize(&batch(vec![
            json!({ "title": "Solaris", "year": 1972 }),
            json!({ "name": "Solaris", "release_year": "1972", "poster": "/s.jpg" }),
            json!({ "title": "Solaris", "year": 2002 }),
        ]));
        assert_eq!(items.len(), 2);
        assert_eq!(items[0].year, "1972");
        assert_eq!(items[0].poster_url, "");
        assert_eq!(items[1].year, "2002");
    }

    #[test]
    fn dedupe_keeps_first_writer() {
        let a = CanonicalItem {
            external_id: Some(1),
            title: "first".into(),
            ..Default::default()
        };
        let b = CanonicalItem {
            external_id: Some(1),
            title: "second".into(),
            ..Default::default()
        };
        let out = dedupe(vec![a, b]);
        assert_eq!(out.len(), 1);
        assert_eq!(out[0].title, "first");
    }

    // ── Idempotence ───────────────────────────────────────────────────

    #[test]
    fn normalize_is_idempotent() {
        let input = batch(vec![
            json!({ "tmdb_id": 100, "title": "A", "year": 2020, "poster_path": "/a.jpg" }),
            json!({ "tmdb": "100", "title": "A" }),
            json!({ "title": "B", "year": "2030", "type": "tv" }),
            json!({ "name": "C", "first_air_date": "2011-04-17", "vote_average": "8.4" }),
            json!({ "imdb_id": "tt1", "title": "D", "poster": "https://x.example/d.jpg" }),
            json!({ "year": 1999 }),
        ]);
        let once = normalize(&input);
        let refed: Vec<RawWatchlistEntry> = once.iter().map(CanonicalItem::to_raw).collect();
        let twice = normalize(&refed);
        assert_eq!(once, twice);
        assert_eq!(once.len(), 4);
    }

    // ── Provider records ──────────────────────────────────────────────

    #[test]
    fn record_fields_override_entry() {
        let n = Normalizer::default();
        let fallback = CanonicalItem {
            title: "matrix".into(),
            year: "1999".into(),
            poster_url: "https://x.example/old.jpg".into(),
            ..Default::default()
        };
        let record = MetadataRecord {
            id: 603,
            title: Some("The Matrix".into()),
            release_date: Some("1999-03-30".into()),
            poster_path: Some("/m.jpg".into()),
            vote_average: Some(8.2),
            ..Default::default()
        };
        let item = n.from_record(&record, MediaKind::Movie, &fallback);
        assert_eq!(item.external_id, Some(603));
        assert_eq!(item.title, "The Matrix");
        assert_eq!(item.release_date, "1999-03-30");
        assert_eq!(item.poster_url, "https://image.tmdb.org/t/p/w300/m.jpg");
        assert_eq!(item.vote_average, 8.2);
    }

    #[test]
    fn signed_year_dates_are_rejected() {
        assert_eq!(parse_date(&json!("-001-01-01")), None);
        assert_eq!(parse_date(&json!("+202-01-01")), None);
        assert_eq!(parse_date(&json!("2024-02-30")), None);
        assert_eq!(parse_date(&json!("2024-02-29T10:00:00Z")), Some("2024-02-29".into()));

        let n = Normalizer::default();
        let record = MetadataRecord {
            id: 9,
            title: Some("Old".into()),
            release_date: Some("-001-01-01".into()),
            ..Default::default()
        };
        let fallback = CanonicalItem {
            year: "1990".into(),
            ..Default::default()
        };
        let item = n.from_record(&record, MediaKind::Movie, &fallback);
        assert_eq!(item.year, "1990");
        assert_eq!(item.release_date, "1990-01-01");
    }

    #[test]
    fn record_without_date_keeps_entry_year() {
        let n = Normalizer::default();
        let fallback = CanonicalItem {
            title: "Obscure".into(),
            year: "1961".into(),
            poster_url: "https://x.example/o.jpg".into(),
            ..Default::default()
        };
        let record = MetadataRecord {
            id: 9,
            name: Some("Obscure Show".into()),
            media_type: Some("tv".into()),
            ..Default::default()
        };
        let item = n.from_record(&record, MediaKind::Movie, &fallback);
        assert_eq!(item.media_kind, MediaKind::Tv);
        assert_eq!(item.year, "1961");
        assert_eq!(item.release_date, "1961-01-01");
        assert_eq!(item.poster_url, "https://x.example/o.jpg");
        assert_eq!(item.vote_average, 0.0);
    }
}
