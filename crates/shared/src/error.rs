use serde::{Deserialize, Serialize};

/// Error payload produced by the backend's exception handlers.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ErrorBody {
    #[serde(default)]
    pub timestamp: Option<String>,
    pub status: u16,
    pub error: String,
    /// Absent when the exception carried no message.
    #[serde(default)]
    pub message: Option<String>,
    #[serde(default)]
    pub path: Option<String>,
}

impl ErrorBody {
    pub fn new(status: u16, error: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            timestamp: None,
            status,
            error: error.into(),
            message: Some(message.into()),
            path: None,
        }
    }

    pub fn with_path(mut self, path: impl Into<String>) -> Self {
        self.path = Some(path.into());
        self
    }
}
