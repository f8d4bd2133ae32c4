//! HTTP implementation of [`ChatBackend`].

use std::time::Duration;

use reqwest::multipart::{Form, Part};
use url::Url;

use super::decode::decode_text_stream;
use super::{
    Attachment, ChatBackend, ChatRequest, TextStream, TransportError, UPLOAD_FIELD, UploadReply,
};
use crate::config::ApiConfig;
use crate::conversation::Message;

/// Join the configured base URL with the endpoint suffix.
///
/// # Example
///
/// ```rust
/// use chatbot_relay::transport::http::resolve_endpoint;
///
/// let url = resolve_endpoint("http://localhost:8000/", "/chat/").unwrap();
/// assert_eq!(url.as_str(), "http://localhost:8000/chat/");
/// ```
pub fn resolve_endpoint(base_url: &str, suffix: &str) -> Result<Url, TransportError> {
    let url = format!(
        "{}/{}",
        base_url.trim().trim_end_matches('/'),
        suffix.trim_start_matches('/')
    );
    Ok(Url::parse(&url)?)
}

/// Chat backend reached over HTTP.
///
/// Both upload and chat requests go to the same endpoint.
#[derive(Clone)]
pub struct HttpBackend {
    http: reqwest::Client,
    endpoint: Url,
}

impl std::fmt::Debug for HttpBackend {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HttpBackend")
            .field("endpoint", &self.endpoint.as_str())
            .finish()
    }
}

impl HttpBackend {
    /// Create a backend with a default client.
    #[must_use]
    pub fn new(endpoint: Url) -> Self {
        Self::with_client(reqwest::Client::new(), endpoint)
    }

    /// Create a backend with a preconfigured client.
    #[must_use]
    pub fn with_client(http: reqwest::Client, endpoint: Url) -> Self {
        Self { http, endpoint }
    }

    /// Build a backend from the `api` configuration section.
    pub fn from_config(config: &ApiConfig) -> Result<Self, TransportError> {
        let endpoint = resolve_endpoint(&config.base_url, &config.endpoint_suffix)?;

        let mut builder = reqwest::Client::builder();
        if let Some(secs) = config.request_timeout_secs {
            builder = builder.timeout(Duration::from_secs(secs));
        }

        Ok(Self::with_client(builder.build()?, endpoint))
    }

    /// The endpoint every request is posted to.
    #[must_use]
    pub fn endpoint(&self) -> &Url {
        &self.endpoint
    }
}

fn ensure_success(resp: &reqwest::Response) -> Result<(), TransportError> {
    let status = resp.status();
    if status.is_success() {
        Ok(())
    } else {
        Err(TransportError::Status { status })
    }
}

#[async_trait::async_trait]
impl ChatBackend for HttpBackend {
    async fn upload(&self, attachment: Attachment) -> Result<UploadReply, TransportError> {
        let size = attachment.size();
        let part = Part::bytes(attachment.bytes)
            .file_name(attachment.file_name.clone())
            .mime_str(&attachment.mime_type)?;
        let form = Form::new().part(UPLOAD_FIELD, part);

        tracing::debug!(
            endpoint = %self.endpoint,
            file_name = %attachment.file_name,
            size = size,
            "Uploading file"
        );

        let resp = self
            .http
            .post(self.endpoint.clone())
            .multipart(form)
            .send()
            .await?;
        ensure_success(&resp)?;

        let body = resp.bytes().await?;
        Ok(serde_json::from_slice(&body)?)
    }

    async fn stream_chat(&self, messages: &[Message]) -> Result<TextStream, TransportError> {
        tracing::debug!(
            endpoint = %self.endpoint,
            message_count = messages.len(),
            "Posting conversation"
        );

        let resp = self
            .http
            .post(self.endpoint.clone())
            .json(&ChatRequest { messages })
            .send()
            .await?;
        ensure_success(&resp)?;

        Ok(decode_text_stream(resp.bytes_stream()))
    }
}
