pub mod client;

pub use client::{watchlist_url, ProxyClient};
