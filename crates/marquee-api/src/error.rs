use thiserror::Error;

/// Errors from the proxy and metadata clients.
#[derive(Debug, Error)]
pub enum ApiError {
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("API error (status {status}): {message}")]
    Api { status: u16, message: String },

    #[error("parse error: {0}")]
    Parse(String),

    #[error("invalid URL: {0}")]
    Url(#[from] url::ParseError),
}

impl ApiError {
    /// True when the request never produced an HTTP response
    /// (unreachable host, TLS failure, timeout).
    pub fn is_transport(&self) -> bool {
        matches!(self, Self::Http(_))
    }
}
