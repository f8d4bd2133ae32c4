//! Transport error taxonomy.

use std::path::PathBuf;

/// Errors raised while talking to the chat backend.
#[derive(Debug, thiserror::Error)]
pub enum TransportError {
    /// The backend answered with a status outside `2xx`.
    #[error("HTTP error! Status: {status}")]
    Status {
        /// Status code returned by the backend.
        status: reqwest::StatusCode,
    },

    /// Connection failure, or the body could not be read to the end.
    #[error("Request failed: {0}")]
    Request(#[from] reqwest::Error),

    /// The upload reply was not valid JSON.
    #[error("Malformed response: {0}")]
    Decode(#[from] serde_json::Error),

    /// The selected file could not be read.
    #[error("Cannot read attachment {}: {source}", path.display())]
    Attachment {
        /// Path given by the user.
        path: PathBuf,
        /// Underlying I/O error.
        source: std::io::Error,
    },

    /// The base URL and endpoint suffix do not form a valid URL.
    #[error("Invalid endpoint URL: {0}")]
    Endpoint(#[from] url::ParseError),
}

impl TransportError {
    /// Check whether this error came from the backend's status line.
    #[must_use]
    pub fn is_status(&self) -> bool {
        matches!(self, Self::Status { .. })
    }
}
