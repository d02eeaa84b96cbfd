//! Host-facing card descriptors built from a display snapshot.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use marquee_core::models::{CanonicalItem, MediaKind, PipelineState};

use crate::DisplaySnapshot;

/// Catalog the host's detail view should open items in.
pub const DETAIL_SOURCE: &str = "tmdb";

/// What the host should do when the user activates a card.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "action", rename_all = "snake_case")]
pub enum HostAction {
    /// Open the host's own detail page for a catalog item.
    OpenDetail {
        source: String,
        id: u64,
        kind: MediaKind,
    },
    /// No catalog id; fall back to the host's search.
    Search { query: String },
    OpenSettings,
    Refresh,
}

impl HostAction {
    pub fn for_item(item: &CanonicalItem) -> Self {
        match item.external_id {
            Some(id) => Self::OpenDetail {
                source: DETAIL_SOURCE.to_string(),
                id,
                kind: item.media_kind,
            },
            None => Self::Search {
                query: search_query(item),
            },
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PlaceholderKind {
    Configure,
    Loading,
    Empty,
    Error,
}

/// One focusable card in the row.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum CardDescriptor {
    Item {
        index: usize,
        title: String,
        subtitle: String,
        poster_url: Option<String>,
        /// Formatted score, absent when the catalog has none.
        rating: Option<String>,
        action: HostAction,
    },
    Placeholder {
        kind: PlaceholderKind,
        title: String,
        message: String,
        action: Option<HostAction>,
    },
}

/// Cards for `snapshot`: the items if there are any, otherwise one placeholder.
///
/// Stale items are still shown when the last run failed.
pub fn build_cards(snapshot: &DisplaySnapshot) -> Vec<CardDescriptor> {
    if !snapshot.items.is_empty() {
        return snapshot
            .items
            .iter()
            .enumerate()
            .map(|(index, item)| item_card(index, item))
            .collect();
    }

    let placeholder = match snapshot.state {
        PipelineState::Idle => CardDescriptor::Placeholder {
            kind: PlaceholderKind::Configure,
            title: "Set up your watchlist".into(),
            message: "Add your account name in settings to show your watchlist here.".into(),
            action: Some(HostAction::OpenSettings),
        },
        PipelineState::Loading => CardDescriptor::Placeholder {
            kind: PlaceholderKind::Loading,
            title: "Loading watchlist".into(),
            message: "Fetching your watchlist…".into(),
            action: None,
        },
        PipelineState::Ready | PipelineState::Empty => CardDescriptor::Placeholder {
            kind: PlaceholderKind::Empty,
            title: "Watchlist is empty".into(),
            message: "Nothing released on your watchlist yet.".into(),
            action: Some(HostAction::Refresh),
        },
        PipelineState::Error => CardDescriptor::Placeholder {
            kind: PlaceholderKind::Error,
            title: "Couldn't load watchlist".into(),
            message: snapshot
                .error_detail
                .clone()
                .unwrap_or_else(|| "Something went wrong.".into()),
            action: Some(HostAction::Refresh),
        },
    };
    vec![placeholder]
}

fn item_card(index: usize, item: &CanonicalItem) -> CardDescriptor {
    CardDescriptor::Item {
        index,
        title: item.title.clone(),
        subtitle: item.subtitle(),
        poster_url: (!item.poster_url.is_empty()).then(|| item.poster_url.clone()),
        rating: rating(item.vote_average),
        action: HostAction::for_item(item),
    }
}

/// `"Title 2008"`, or just the title without a year.
pub fn search_query(item: &CanonicalItem) -> String {
    if item.year.is_empty() {
        item.title.clone()
    } else {
        format!("{} {}", item.title, item.year)
    }
}

/// One decimal, `None` for unrated.
pub fn rating(vote: f64) -> Option<String> {
    (vote > 0.0).then(|| format!("{vote:.1}"))
}

/// Format a UTC timestamp as a human-readable relative time string.
pub fn relative_time(dt: &DateTime<Utc>) -> String {
    let secs = (Utc::now() - *dt).num_seconds().max(0);

    if secs < 60 {
        "just now".into()
    } else if secs < 3600 {
        format!("{}m ago", secs / 60)
    } else if secs < 86400 {
        format!("{}h ago", secs / 3600)
    } else {
        format!("{}d ago", secs / 86400)
    }
}
