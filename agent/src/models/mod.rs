//! Data models exchanged with the management server

pub mod config;
pub mod response;
