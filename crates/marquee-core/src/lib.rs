pub mod cache;
pub mod config;
pub mod config_store;
pub mod error;
pub mod fetcher;
pub mod models;
pub mod normalize;
pub mod orchestrator;
pub mod resolver;
pub mod storage;
