use marquee_api::ApiError;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum MarqueeError {
    #[error("storage error: {0}")]
    Storage(#[from] rusqlite::Error),

    #[error("config error: {0}")]
    Config(String),

    #[error("serialization error: {0}")]
    Serde(#[from] serde_json::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// A watchlist fetch that produced nothing usable.
#[derive(Debug, Error)]
pub enum FetchError {
    /// The proxy could not be reached (network failure or timeout).
    #[error("watchlist page {page} unreachable: {source}")]
    Transport {
        page: u8,
        #[source]
        source: ApiError,
    },

    /// The proxy answered with a non-2xx status or an unreadable body.
    #[error("watchlist page {page} rejected: {source}")]
    Upstream {
        page: u8,
        #[source]
        source: ApiError,
    },
}

impl FetchError {
    pub fn from_api(page: u8, source: ApiError) -> Self {
        if source.is_transport() {
            Self::Transport { page, source }
        } else {
            Self::Upstream { page, source }
        }
    }
}
