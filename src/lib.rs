pub mod api_client;
pub mod auth;
pub mod config;
pub mod distance;
pub mod error;
pub mod facilities;
pub mod filter_store;
pub mod http;
pub mod location;
pub mod models;
pub mod places;
pub mod query;
pub mod storage;
pub mod suggestions;

pub use error::{FinderError, FinderResult};
