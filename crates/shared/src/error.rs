use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Error payload every endpoint returns on failure. `error` is shown to the
/// user verbatim.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Error)]
#[error("{error}")]
pub struct ApiErrorBody {
    pub error: String,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub details: Vec<String>,
}

impl ApiErrorBody {
    pub fn new(error: impl Into<String>) -> Self {
        Self {
            error: error.into(),
            details: Vec::new(),
        }
    }

    pub fn with_details(mut self, details: impl IntoIterator<Item = String>) -> Self {
        self.details.extend(details);
        self
    }

    /// The `error` text followed by any validation details.
    pub fn describe(&self) -> String {
        if self.details.is_empty() {
            self.error.clone()
        } else {
            format!("{} ({})", self.error, self.details.join("; "))
        }
    }
}
