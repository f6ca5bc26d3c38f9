//! Persistent agent state

pub mod device;
pub mod layout;
pub mod prefs;
pub mod records;
pub mod settings;
