use std::time::Duration;

use reqwest::Client;
use url::Url;

use super::types::{SearchScope, TmdbFindResponse, TmdbSearchResponse};
use crate::error::ApiError;
use crate::http::{build_client, check_response};
use crate::traits::{MetadataProvider, SearchQuery};
use crate::types::{MediaKind, MetadataRecord};

pub const DEFAULT_BASE_URL: &str = "https://api.themoviedb.org/3/";

/// TMDB v3 client (API-key auth).
pub struct TmdbClient {
    base_url: Url,
    api_key: String,
    language: String,
    http: Client,
}

impl TmdbClient {
    pub fn new(
        base_url: &str,
        api_key: String,
        language: String,
        timeout: Duration,
    ) -> Result<Self, ApiError> {
        // Url::join drops the last path segment unless the base ends with '/'.
        let base_url = if base_url.ends_with('/') {
            Url::parse(base_url)?
        } else {
            Url::parse(&format!("{base_url}/"))?
        };
        Ok(Self {
            base_url,
            api_key,
            language,
            http: build_client(timeout)?,
        })
    }

    fn endpoint(&self, path: &str) -> Result<Url, ApiError> {
        Ok(self.base_url.join(path)?)
    }
}

impl MetadataProvider for TmdbClient {
    async fn lookup(&self, kind: MediaKind, id: u64) -> Result<Option<MetadataRecord>, ApiError> {
        let url = self.endpoint(&format!("{}/{id}", kind.as_str()))?;

        let resp = self
            .http
            .get(url)
            .query(&[("api_key", self.api_key.as_str()), ("language", self.language.as_str())])
            .send()
            .await?;

        // 404 means the id is unknown to the provider, not a failure.
        if resp.status().as_u16() == 404 {
            tracing::debug!(%kind, id, "no metadata record");
            return Ok(None);
        }
        let resp = check_response(resp).await?;
        let record: MetadataRecord = resp
            .json()
            .await
            .map_err(|e| ApiError::Parse(e.to_string()))?;

        Ok(Some(record.tagged(kind)))
    }

    async fn search(&self, query: &SearchQuery) -> Result<Vec<MetadataRecord>, ApiError> {
        let scope = SearchScope::for_query(query);
        let url = self.endpoint(scope.path())?;

        let mut params: Vec<(&str, &str)> = vec![
            ("api_key", self.api_key.as_str()),
            ("language", self.language.as_str()),
            ("query", query.title.as_str()),
            ("include_adult", "false"),
        ];
        if let Some(year) = query.year.as_deref() {
            params.push((scope.year_param(), year));
        }

        let resp = self.http.get(url).query(&params).send().await?;
        let resp = check_response(resp).await?;
        let page: TmdbSearchResponse = resp
            .json()
            .await
            .map_err(|e| ApiError::Parse(e.to_string()))?;

        Ok(match scope.implied_kind() {
            Some(kind) => page.results.into_iter().map(|r| r.tagged(kind)).collect(),
            None => page.results,
        })
    }

    async fn find_by_imdb(&self, imdb_id: &str) -> Result<Option<MetadataRecord>, ApiError> {
        let url = self.endpoint(&format!("find/{imdb_id}"))?;

        let resp = self
            .http
            .get(url)
            .query(&[
                ("api_key", self.api_key.as_str()),
                ("language", self.language.as_str()),
                ("external_source", "imdb_id"),
            ])
            .send()
            .await?;
        let resp = check_response(resp).await?;
        let found: TmdbFindResponse = resp
            .json()
            .await
            .map_err(|e| ApiError::Parse(e.to_string()))?;

        Ok(found.into_first())
    }
}
