//! HTTP clients and wire types for the two upstream services Marquee talks to:
//! the watchlist proxy and the movie/TV metadata provider.

pub mod error;
mod http;
pub mod proxy;
pub mod tmdb;
pub mod traits;
pub mod types;

pub use error::ApiError;
