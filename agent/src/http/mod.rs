//! Management server HTTP access

pub mod client;
pub mod config;
pub mod download;
pub mod remote_log;

pub use client::HttpClient;
pub use config::HttpConfigSource;
pub use download::HttpDownloader;
pub use remote_log::HttpRemoteLog;
