//! Backend transport for chat requests and file uploads.
//!
//! This module defines the [`ChatBackend`] trait, the single seam between the
//! controller and the network, plus its HTTP implementation.
//!
//! # Wire contract
//!
//! Both modes `POST` to the same endpoint (`<base_url>/chat/`):
//!
//! - File mode: multipart form with one part named [`UPLOAD_FIELD`]; the reply
//!   is a JSON object whose `content` field holds the extracted text.
//! - Text mode: JSON body `{"messages": [...]}`; the reply body is raw text
//!   streamed in arbitrary chunks with no framing.
//!
//! Any status outside `2xx` is a failure in both modes.

pub mod decode;
mod error;
pub mod http;

pub use error::TransportError;
pub use http::HttpBackend;

use std::path::Path;
use std::pin::Pin;

use futures::Stream;
use serde::{Deserialize, Serialize};

use crate::conversation::Message;

/// Multipart field name carrying the uploaded file.
pub const UPLOAD_FIELD: &str = "files";

/// Stream of decoded reply fragments, ending at end-of-body.
pub type TextStream = Pin<Box<dyn Stream<Item = Result<String, TransportError>> + Send>>;

/// A file selected for upload.
#[derive(Clone, PartialEq, Eq)]
pub struct Attachment {
    /// File name sent with the multipart part and shown in the conversation.
    pub file_name: String,
    /// MIME type guessed from the file extension.
    pub mime_type: String,
    /// Raw file content.
    pub bytes: Vec<u8>,
}

impl std::fmt::Debug for Attachment {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Attachment")
            .field("file_name", &self.file_name)
            .field("mime_type", &self.mime_type)
            .field("size", &self.bytes.len())
            .finish()
    }
}

impl Attachment {
    /// Create an attachment from in-memory bytes.
    #[must_use]
    pub fn new(file_name: impl Into<String>, bytes: Vec<u8>) -> Self {
        let file_name = file_name.into();
        let mime_type = mime_guess::from_path(&file_name)
            .first_or_octet_stream()
            .essence_str()
            .to_string();
        Self {
            file_name,
            mime_type,
            bytes,
        }
    }

    /// Read an attachment from disk.
    pub async fn from_path(path: impl AsRef<Path>) -> Result<Self, TransportError> {
        let path = path.as_ref();
        let bytes = tokio::fs::read(path)
            .await
            .map_err(|source| TransportError::Attachment {
                path: path.to_path_buf(),
                source,
            })?;
        let file_name = path
            .file_name()
            .map_or_else(|| path.display().to_string(), |n| n.to_string_lossy().into_owned());
        Ok(Self::new(file_name, bytes))
    }

    /// Size in bytes.
    #[must_use]
    pub fn size(&self) -> usize {
        self.bytes.len()
    }
}

/// Body of a text-mode request.
#[derive(Debug, Serialize)]
pub struct ChatRequest<'a> {
    /// Full conversation including the new user turn.
    pub messages: &'a [Message],
}

/// JSON reply to a file upload.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
pub struct UploadReply {
    /// Text extracted from the uploaded document.
    #[serde(default)]
    pub content: Option<String>,
    /// Human-readable status from the backend.
    #[serde(default)]
    pub message: Option<String>,
}

/// A chat backend reachable over some transport.
///
/// Each call is exactly one outbound request.
#[async_trait::async_trait]
pub trait ChatBackend: Send + Sync + std::fmt::Debug {
    /// Upload a single file and return the backend's extraction reply.
    ///
    /// # Errors
    ///
    /// Returns an error on connection failure, non-success status, or a body
    /// that is not a JSON object.
    async fn upload(&self, attachment: Attachment) -> Result<UploadReply, TransportError>;

    /// Send the conversation and stream the assistant's reply.
    ///
    /// Resolves once response headers arrive; the returned stream yields the
    /// body as decoded text.
    ///
    /// # Errors
    ///
    /// Returns an error on connection failure or non-success status.
    async fn stream_chat(&self, messages: &[Message]) -> Result<TextStream, TransportError>;
}
