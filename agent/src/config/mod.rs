//! Desired configuration: fetch and last-known-good snapshot

pub mod fetcher;
pub mod store;

pub use fetcher::{ConfigFetcher, FetchResult};
pub use store::{ConfigStore, StoredConfig};
