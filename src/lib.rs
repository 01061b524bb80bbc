pub mod cache;
pub mod chunker;
pub mod config;
pub mod date_code;
pub mod error;
pub mod export;
pub mod feature_store;
pub mod gamelog;
pub mod http_cache;
pub mod http_client;
pub mod lineup;
pub mod pipeline;
pub mod record;
pub mod sources;
pub mod stats;
