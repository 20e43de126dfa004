pub mod cache;
pub mod config;
pub mod enrich;
pub mod error;
pub mod executor;
pub mod http;
pub mod properties;
pub mod properties_store;
pub mod state;
pub mod status;
pub mod worlds;
