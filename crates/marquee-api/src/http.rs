use std::time::Duration;

use reqwest::Client;

use crate::error::ApiError;

const USER_AGENT: &str = concat!("marquee/", env!("CARGO_PKG_VERSION"));

/// Build a client whose every request carries `timeout`.
pub(crate) fn build_client(timeout: Duration) -> Result<Client, ApiError> {
    Ok(Client::builder()
        .timeout(timeout)
        .user_agent(USER_AGENT)
        .build()?)
}

/// Check the HTTP response for errors and return the body text on failure.
pub(crate) async fn check_response(resp: reqwest::Response) -> Result<reqwest::Response, ApiError> {
    if resp.status().is_success() {
        Ok(resp)
    } else {
        let status = resp.status().as_u16();
        let body = resp.text().await.unwrap_or_default();
        tracing::warn!(status, "upstream API error");
        Err(ApiError::Api {
            status,
            message: body,
        })
    }
}
