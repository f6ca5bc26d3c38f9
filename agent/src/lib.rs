//! Managed-device agent library
//!
//! Pulls the desired configuration from the management server and reconciles
//! capability gates, system settings, files and applications against it.

pub mod app;
pub mod config;
pub mod errors;
pub mod filesys;
pub mod gates;
pub mod http;
pub mod logs;
pub mod models;
pub mod platform;
pub mod provision;
pub mod reconcile;
pub mod server;
pub mod storage;
pub mod utils;
pub mod workers;
