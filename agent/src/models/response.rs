//! Management server response envelope

use serde::{Deserialize, Serialize};

/// Literal status marker of a successful response
pub const STATUS_OK: &str = "OK";

/// Envelope wrapping every management server payload
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerResponse<T> {
    pub status: String,

    #[serde(default)]
    pub message: Option<String>,

    pub data: Option<T>,
}

impl<T> ServerResponse<T> {
    pub fn is_ok(&self) -> bool {
        self.status == STATUS_OK
    }

    /// The payload, only when the status marker is the success literal
    pub fn into_ok_data(self) -> Option<T> {
        if self.is_ok() {
            self.data
        } else {
            None
        }
    }
}
