use std::time::Duration;

use reqwest::Client;
use url::Url;

use crate::error::ApiError;
use crate::http::{build_client, check_response};
use crate::traits::{PageRequest, WatchlistSource};
use crate::types::{parse_watchlist_body, RawWatchlistEntry};

/// Client for the watchlist proxy (`GET <endpoint>/?user=<h>&pages=<n>`).
pub struct ProxyClient {
    http: Client,
}

impl ProxyClient {
    pub fn new(timeout: Duration) -> Result<Self, ApiError> {
        Ok(Self {
            http: build_client(timeout)?,
        })
    }
}

/// Build the request URL for one proxy call.
///
/// Query parameters are appended to whatever the endpoint already carries.
pub fn watchlist_url(endpoint: &Url, handle: &str, request: PageRequest) -> Url {
    let mut url = endpoint.clone();
    let (key, value) = request.query_pair();
    url.query_pairs_mut()
        .append_pair("user", handle)
        .append_pair(key, &value);
    url
}

impl WatchlistSource for ProxyClient {
    async fn fetch_page(
        &self,
        endpoint: &Url,
        handle: &str,
        request: PageRequest,
    ) -> Result<Vec<RawWatchlistEntry>, ApiError> {
        let url = watchlist_url(endpoint, handle, request);
        tracing::debug!(%url, "fetching watchlist page");

        let resp = self.http.get(url).send().await?;
        let resp = check_response(resp).await?;
        let body: serde_json::Value = resp
            .json()
            .await
            .map_err(|e| ApiError::Parse(e.to_string()))?;

        parse_watchlist_body(body)
    }
}
