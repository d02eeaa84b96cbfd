use serde::Deserialize;

use crate::traits::SearchQuery;
use crate::types::{MediaKind, MetadataRecord};

/// `GET /search/{multi|movie|tv}` response page.
#[derive(Debug, Deserialize)]
pub struct TmdbSearchResponse {
    #[serde(default)]
    pub results: Vec<MetadataRecord>,
}

/// `GET /find/{external_id}?external_source=imdb_id` response.
#[derive(Debug, Default, Deserialize)]
pub struct TmdbFindResponse {
    #[serde(default)]
    pub movie_results: Vec<MetadataRecord>,
    #[serde(default)]
    pub tv_results: Vec<MetadataRecord>,
}

impl TmdbFindResponse {
    /// First match, movies before series.
    pub fn into_first(self) -> Option<MetadataRecord> {
        let movie = self
            .movie_results
            .into_iter()
            .next()
            .map(|r| r.tagged(MediaKind::Movie));
        movie.or_else(|| {
            self.tv_results
                .into_iter()
                .next()
                .map(|r| r.tagged(MediaKind::Tv))
        })
    }
}

/// Which search endpoint a query goes to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SearchScope {
    Multi,
    Movie,
    Tv,
}

impl SearchScope {
    /// A kind hint narrows the search; without one, search everything.
    pub fn for_query(query: &SearchQuery) -> Self {
        match query.kind_hint {
            Some(MediaKind::Tv) => Self::Tv,
            Some(MediaKind::Movie) => Self::Movie,
            None => Self::Multi,
        }
    }

    pub fn path(self) -> &'static str {
        match self {
            Self::Multi => "search/multi",
            Self::Movie => "search/movie",
            Self::Tv => "search/tv",
        }
    }

    /// Year filter parameter for this endpoint.
    pub fn year_param(self) -> &'static str {
        match self {
            Self::Multi | Self::Movie => "year",
            Self::Tv => "first_air_date_year",
        }
    }

    /// Kind to stamp on results of a narrowed search, which TMDB leaves untagged.
    pub fn implied_kind(self) -> Option<MediaKind> {
        match self {
            Self::Multi => None,
            Self::Movie => Some(MediaKind::Movie),
            Self::Tv => Some(MediaKind::Tv),
        }
    }
}
