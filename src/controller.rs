//! Chat controller: one user action, one request.
//!
//! The controller owns the input draft (pending text and at most one pending
//! attachment) and the busy flag. [`ChatController::send`] runs the whole
//! send cycle:
//!
//! 1. Reject the action if a send is already in flight or the draft is empty
//! 2. Clear the draft and echo the user's message into the conversation
//! 3. Upload the file, or post the conversation and stream the reply into a
//!    placeholder message
//! 4. On any failure, append a single generic error message
//!
//! The busy flag is released on every exit path.

use std::path::Path;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, RwLock};

use futures::StreamExt;
use serde::Deserialize;
use uuid::Uuid;

use crate::conversation::{Conversation, Message};
use crate::transport::{Attachment, ChatBackend, TransportError};

/// Assistant message appended when a send fails for any reason.
pub const ERROR_REPLY: &str = "Error fetching response. Please try again.";

/// Input hint shown when no file is pending.
pub const DEFAULT_PLACEHOLDER: &str = "Type your message...";

/// What to do with a streamed placeholder when the stream fails.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum PartialReplyPolicy {
    /// Leave the placeholder with whatever text it received.
    #[default]
    Keep,
    /// Remove the placeholder before appending the error message.
    Discard,
}

impl PartialReplyPolicy {
    /// Configuration name of the policy.
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Keep => "keep",
            Self::Discard => "discard",
        }
    }
}

/// Result of [`ChatController::send`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SendOutcome {
    /// Nothing to send; no state changed.
    Empty,
    /// Another send is in flight; the draft was left untouched.
    Busy,
    /// The request completed and the conversation holds the reply.
    Completed,
    /// The request failed and an error message was appended.
    Failed,
}

#[derive(Debug, Default)]
struct Draft {
    text: String,
    attachment: Option<Attachment>,
}

enum Pending {
    File(Attachment),
    Text,
}

/// Drives sends against a [`ChatBackend`] and records them in a
/// [`Conversation`].
///
/// Cloning yields another handle to the same controller.
#[derive(Clone)]
pub struct ChatController {
    inner: Arc<ControllerInner>,
}

struct ControllerInner {
    conversation: Conversation,
    backend: Arc<dyn ChatBackend>,
    policy: PartialReplyPolicy,
    busy: AtomicBool,
    draft: Mutex<Draft>,
    last_extracted: RwLock<Option<String>>,
}

impl std::fmt::Debug for ChatController {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ChatController")
            .field("backend", &self.inner.backend)
            .field("policy", &self.inner.policy)
            .field("busy", &self.is_busy())
            .field("messages", &self.inner.conversation.len())
            .finish()
    }
}

/// Holds the busy flag for the duration of one send.
struct BusyGuard<'a>(&'a AtomicBool);

impl<'a> BusyGuard<'a> {
    fn acquire(flag: &'a AtomicBool) -> Option<Self> {
        flag.compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .ok()
            .map(|_| Self(flag))
    }
}

impl Drop for BusyGuard<'_> {
    fn drop(&mut self) {
        self.0.store(false, Ordering::Release);
    }
}

impl ChatController {
    /// Create a controller writing into `conversation`.
    pub fn new(
        conversation: Conversation,
        backend: Arc<dyn ChatBackend>,
        policy: PartialReplyPolicy,
    ) -> Self {
        Self {
            inner: Arc::new(ControllerInner {
                conversation,
                backend,
                policy,
                busy: AtomicBool::new(false),
                draft: Mutex::new(Draft::default()),
                last_extracted: RwLock::new(None),
            }),
        }
    }

    /// The conversation this controller writes to.
    #[must_use]
    pub fn conversation(&self) -> &Conversation {
        &self.inner.conversation
    }

    /// Partial-reply policy in effect.
    #[must_use]
    pub fn policy(&self) -> PartialReplyPolicy {
        self.inner.policy
    }

    /// Check whether a send is in flight.
    #[must_use]
    pub fn is_busy(&self) -> bool {
        self.inner.busy.load(Ordering::Acquire)
    }

    /// Replace the pending input text.
    pub fn set_text(&self, text: impl Into<String>) {
        self.draft().text = text.into();
    }

    /// Current pending input text.
    #[must_use]
    pub fn text(&self) -> String {
        self.draft().text.clone()
    }

    /// Select a file for the next send, replacing any previous selection.
    pub fn attach(&self, attachment: Attachment) {
        tracing::debug!(
            file_name = %attachment.file_name,
            size = attachment.size(),
            "Attachment selected"
        );
        self.draft().attachment = Some(attachment);
    }

    /// Read a file from disk and select it for the next send.
    pub async fn attach_path(&self, path: impl AsRef<Path>) -> Result<(), TransportError> {
        let attachment = Attachment::from_path(path).await?;
        self.attach(attachment);
        Ok(())
    }

    /// Drop the pending attachment, returning it.
    pub fn detach(&self) -> Option<Attachment> {
        self.draft().attachment.take()
    }

    /// File name of the pending attachment.
    #[must_use]
    pub fn attachment_name(&self) -> Option<String> {
        self.draft()
            .attachment
            .as_ref()
            .map(|a| a.file_name.clone())
    }

    /// Hint for the input line.
    #[must_use]
    pub fn input_placeholder(&self) -> String {
        match self.attachment_name() {
            Some(name) => format!("Attached: {name}"),
            None => DEFAULT_PLACEHOLDER.to_string(),
        }
    }

    /// Text extracted from the most recently uploaded file.
    #[must_use]
    pub fn last_extracted(&self) -> Option<String> {
        self.inner
            .last_extracted
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Send the pending text or attachment.
    ///
    /// A pending attachment takes precedence; any pending text is then
    /// discarded. Whitespace-only text with no attachment is a no-op.
    pub async fn send(&self) -> SendOutcome {
        let Some(_busy) = BusyGuard::acquire(&self.inner.busy) else {
            tracing::debug!("Send ignored, request already in flight");
            return SendOutcome::Busy;
        };

        let (pending, user_message) = {
            let mut draft = self.draft();
            if draft.attachment.is_none() && draft.text.trim().is_empty() {
                return SendOutcome::Empty;
            }
            let text = std::mem::take(&mut draft.text);
            match draft.attachment.take() {
                Some(attachment) => {
                    let echo = format!("Sent a file: {}", attachment.file_name);
                    (Pending::File(attachment), Message::user(echo))
                }
                None => (Pending::Text, Message::user(text)),
            }
        };

        let request_id = Uuid::new_v4().to_string();
        self.inner.conversation.append(user_message);

        let mut placeholder = None;
        let result = match pending {
            Pending::File(attachment) => self.upload(&request_id, attachment).await,
            Pending::Text => self.stream_reply(&request_id, &mut placeholder).await,
        };

        match result {
            Ok(()) => SendOutcome::Completed,
            Err(e) => {
                tracing::error!(
                    request_id = %request_id,
                    error = %e,
                    status_error = e.is_status(),
                    "Error fetching response"
                );
                self.settle_placeholder(placeholder);
                self.inner
                    .conversation
                    .append(Message::assistant(ERROR_REPLY));
                SendOutcome::Failed
            }
        }
    }

    async fn upload(&self, request_id: &str, attachment: Attachment) -> Result<(), TransportError> {
        let file_name = attachment.file_name.clone();

        tracing::info!(
            request_id = %request_id,
            mode = "file",
            file_name = %file_name,
            size = attachment.size(),
            "Uploading attachment"
        );

        let reply = self.inner.backend.upload(attachment).await?;

        if let Some(message) = &reply.message {
            tracing::info!(request_id = %request_id, backend_message = %message, "Upload acknowledged");
        }

        // An empty extraction is treated like a missing one.
        let Some(content) = reply.content.filter(|c| !c.is_empty()) else {
            tracing::warn!(request_id = %request_id, "Upload reply has no extracted content");
            return Ok(());
        };

        tracing::info!(
            request_id = %request_id,
            content_length = content.len(),
            "Extracted document text received"
        );

        *self
            .inner
            .last_extracted
            .write()
            .unwrap_or_else(PoisonError::into_inner) = Some(content.clone());

        let conversation = &self.inner.conversation;
        conversation.append(Message::assistant(format!("File uploaded: {file_name}")));
        conversation.append(Message::assistant(format!("Extracted Content:\n{content}")));
        Ok(())
    }

    async fn stream_reply(
        &self,
        request_id: &str,
        placeholder: &mut Option<usize>,
    ) -> Result<(), TransportError> {
        let conversation = &self.inner.conversation;
        let history = conversation.messages();

        tracing::info!(
            request_id = %request_id,
            mode = "text",
            message_count = history.len(),
            "Sending chat request"
        );

        let mut fragments = self.inner.backend.stream_chat(&history).await?;

        *placeholder = Some(conversation.append(Message::assistant("")));

        let mut reply = String::new();
        let mut chunk_count = 0usize;
        while let Some(fragment) = fragments.next().await {
            let fragment = fragment?;
            chunk_count += 1;
            reply.push_str(&fragment);
            conversation.replace_last(reply.as_str());
        }

        tracing::info!(
            request_id = %request_id,
            chunk_count = chunk_count,
            content_length = reply.len(),
            "Streamed reply complete"
        );
        Ok(())
    }

    fn settle_placeholder(&self, placeholder: Option<usize>) {
        let Some(index) = placeholder else {
            return;
        };
        if self.inner.policy != PartialReplyPolicy::Discard {
            return;
        }
        let conversation = &self.inner.conversation;
        // Only the placeholder itself may be removed, never an earlier turn.
        if conversation.len() == index + 1 {
            if let Some(partial) = conversation.remove_last() {
                tracing::debug!(
                    content_length = partial.content.len(),
                    "Discarded partial reply"
                );
            }
        }
    }

    fn draft(&self) -> MutexGuard<'_, Draft> {
        self.inner
            .draft
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
    }
}

#[cfg(test)]
mod tests {
    use tokio::sync::Notify;

    use super::*;
    use crate::conversation::MessageRole;
    use crate::transport::{TextStream, UploadReply};

    /// Backend answering from a fixed script and recording what it was sent.
    #[derive(Debug, Default)]
    struct ScriptedBackend {
        chunks: Vec<&'static str>,
        fail_status: bool,
        fail_after_chunks: bool,
        upload_reply: Option<UploadReply>,
        gate: Option<Arc<Notify>>,
        chat_requests: Mutex<Vec<Vec<Message>>>,
        uploads: Mutex<Vec<String>>,
    }

    impl ScriptedBackend {
        fn streaming(chunks: &[&'static str]) -> Self {
            Self {
                chunks: chunks.to_vec(),
                ..Self::default()
            }
        }

        fn request_count(&self) -> usize {
            self.chat_requests.lock().unwrap().len() + self.uploads.lock().unwrap().len()
        }
    }

    fn server_error() -> TransportError {
        TransportError::Status {
            status: reqwest::StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    #[async_trait::async_trait]
    impl ChatBackend for ScriptedBackend {
        async fn upload(&self, attachment: Attachment) -> Result<UploadReply, TransportError> {
            self.uploads.lock().unwrap().push(attachment.file_name);
            if self.fail_status {
                return Err(server_error());
            }
            Ok(self.upload_reply.clone().unwrap_or_default())
        }

        async fn stream_chat(&self, messages: &[Message]) -> Result<TextStream, TransportError> {
            self.chat_requests.lock().unwrap().push(messages.to_vec());
            if let Some(gate) = &self.gate {
                gate.notified().await;
            }
            if self.fail_status {
                return Err(server_error());
            }
            let mut items: Vec<Result<String, TransportError>> =
                self.chunks.iter().map(|c| Ok((*c).to_string())).collect();
            if self.fail_after_chunks {
                items.push(Err(server_error()));
            }
            Ok(Box::pin(futures::stream::iter(items)))
        }
    }

    fn controller_with(backend: ScriptedBackend) -> (ChatController, Arc<ScriptedBackend>) {
        controller_with_policy(backend, PartialReplyPolicy::Keep)
    }

    fn controller_with_policy(
        backend: ScriptedBackend,
        policy: PartialReplyPolicy,
    ) -> (ChatController, Arc<ScriptedBackend>) {
        let backend = Arc::new(backend);
        let controller = ChatController::new(
            Conversation::new(),
            Arc::clone(&backend) as Arc<dyn ChatBackend>,
            policy,
        );
        (controller, backend)
    }

    #[tokio::test]
    async fn test_streamed_text_reply() {
        let (controller, backend) = controller_with(ScriptedBackend::streaming(&["Hi", " there"]));

        controller.set_text("Hello");
        assert_eq!(controller.send().await, SendOutcome::Completed);

        assert_eq!(
            controller.conversation().messages(),
            vec![Message::user("Hello"), Message::assistant("Hi there")]
        );
        assert_eq!(controller.text(), "");
        assert!(!controller.is_busy());

        let requests = backend.chat_requests.lock().unwrap();
        assert_eq!(requests.len(), 1);
        assert_eq!(requests[0], vec![Message::user("Hello")]);
    }

    #[tokio::test]
    async fn test_request_carries_full_history() {
        let (controller, backend) = controller_with(ScriptedBackend::streaming(&["ok"]));

        controller.set_text("first");
        controller.send().await;
        controller.set_text("second");
        controller.send().await;

        let requests = backend.chat_requests.lock().unwrap();
        assert_eq!(
            requests[1],
            vec![
                Message::user("first"),
                Message::assistant("ok"),
                Message::user("second"),
            ]
        );
    }

    #[tokio::test]
    async fn test_streaming_grows_placeholder_in_place() {
        let (controller, _backend) =
            controller_with(ScriptedBackend::streaming(&["a", "b", "c"]));
        let mut events = controller.conversation().subscribe();

        controller.set_text("go");
        controller.send().await;

        let mut seen = Vec::new();
        for _ in 0..5 {
            seen.push(events.next().await.unwrap().unwrap());
        }

        let replaced: Vec<(usize, String)> = seen
            .iter()
            .filter_map(|e| match e {
                crate::conversation::ConversationEvent::LastReplaced { index, message } => {
                    Some((*index, message.content.clone()))
                }
                _ => None,
            })
            .collect();
        assert_eq!(
            replaced,
            vec![
                (1, "a".to_string()),
                (1, "ab".to_string()),
                (1, "abc".to_string()),
            ]
        );
        assert_eq!(controller.conversation().len(), 2);
    }

    #[tokio::test]
    async fn test_empty_send_is_noop() {
        let (controller, backend) = controller_with(ScriptedBackend::streaming(&["unused"]));

        assert_eq!(controller.send().await, SendOutcome::Empty);
        controller.set_text("   \n\t");
        assert_eq!(controller.send().await, SendOutcome::Empty);

        assert!(controller.conversation().is_empty());
        assert_eq!(backend.request_count(), 0);
        assert_eq!(controller.text(), "   \n\t");
        assert!(!controller.is_busy());
    }

    #[tokio::test]
    async fn test_file_upload_appends_extracted_content() {
        let (controller, backend) = controller_with(ScriptedBackend {
            upload_reply: Some(UploadReply {
                content: Some("line1\nline2".to_string()),
                message: Some("Text uploaded successfully".to_string()),
            }),
            ..ScriptedBackend::default()
        });

        controller.attach(Attachment::new("notes.txt", b"line1\nline2".to_vec()));
        assert_eq!(controller.input_placeholder(), "Attached: notes.txt");
        controller.set_text("ignored text");

        assert_eq!(controller.send().await, SendOutcome::Completed);
        assert_eq!(
            controller.conversation().messages(),
            vec![
                Message::user("Sent a file: notes.txt"),
                Message::assistant("File uploaded: notes.txt"),
                Message::assistant("Extracted Content:\nline1\nline2"),
            ]
        );
        assert!(controller.attachment_name().is_none());
        assert_eq!(controller.text(), "");
        assert_eq!(controller.input_placeholder(), DEFAULT_PLACEHOLDER);
        assert_eq!(controller.last_extracted().as_deref(), Some("line1\nline2"));
        assert_eq!(*backend.uploads.lock().unwrap(), vec!["notes.txt".to_string()]);
        assert!(backend.chat_requests.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_upload_without_content_adds_nothing() {
        let (controller, _backend) = controller_with(ScriptedBackend::default());

        controller.attach(Attachment::new("empty.bin", vec![]));
        assert_eq!(controller.send().await, SendOutcome::Completed);

        assert_eq!(
            controller.conversation().messages(),
            vec![Message::user("Sent a file: empty.bin")]
        );
        assert!(controller.last_extracted().is_none());
    }

    #[tokio::test]
    async fn test_upload_with_empty_content_adds_nothing() {
        let (controller, _backend) = controller_with(ScriptedBackend {
            upload_reply: Some(UploadReply {
                content: Some(String::new()),
                message: Some("Text uploaded successfully".to_string()),
            }),
            ..ScriptedBackend::default()
        });

        controller.attach(Attachment::new("blank.txt", vec![]));
        assert_eq!(controller.send().await, SendOutcome::Completed);

        assert_eq!(
            controller.conversation().messages(),
            vec![Message::user("Sent a file: blank.txt")]
        );
        assert!(controller.last_extracted().is_none());
    }

    #[tokio::test]
    async fn test_failed_upload_clears_attachment() {
        let (controller, _backend) = controller_with(ScriptedBackend {
            fail_status: true,
            ..ScriptedBackend::default()
        });

        controller.attach(Attachment::new("notes.txt", b"x".to_vec()));
        assert_eq!(controller.send().await, SendOutcome::Failed);

        assert!(controller.attachment_name().is_none());
        assert_eq!(
            controller.conversation().messages(),
            vec![
                Message::user("Sent a file: notes.txt"),
                Message::assistant(ERROR_REPLY),
            ]
        );
    }

    #[tokio::test]
    async fn test_status_failure_appends_single_error() {
        let (controller, _backend) = controller_with(ScriptedBackend {
            fail_status: true,
            ..ScriptedBackend::default()
        });

        controller.set_text("Hello");
        assert_eq!(controller.send().await, SendOutcome::Failed);

        assert_eq!(
            controller.conversation().messages(),
            vec![Message::user("Hello"), Message::assistant(ERROR_REPLY)]
        );
        assert!(!controller.is_busy());
    }

    #[tokio::test]
    async fn test_mid_stream_failure_keeps_partial_reply() {
        let (controller, _backend) = controller_with(ScriptedBackend {
            chunks: vec!["Partial", " answer"],
            fail_after_chunks: true,
            ..ScriptedBackend::default()
        });

        controller.set_text("Hello");
        assert_eq!(controller.send().await, SendOutcome::Failed);

        assert_eq!(
            controller.conversation().messages(),
            vec![
                Message::user("Hello"),
                Message::assistant("Partial answer"),
                Message::assistant(ERROR_REPLY),
            ]
        );
    }

    #[tokio::test]
    async fn test_mid_stream_failure_discards_partial_reply() {
        let (controller, _backend) = controller_with_policy(
            ScriptedBackend {
                chunks: vec!["Partial"],
                fail_after_chunks: true,
                ..ScriptedBackend::default()
            },
            PartialReplyPolicy::Discard,
        );

        controller.set_text("Hello");
        assert_eq!(controller.send().await, SendOutcome::Failed);

        assert_eq!(
            controller.conversation().messages(),
            vec![Message::user("Hello"), Message::assistant(ERROR_REPLY)]
        );
    }

    #[tokio::test]
    async fn test_discard_policy_ignores_failures_before_placeholder() {
        let (controller, _backend) = controller_with_policy(
            ScriptedBackend {
                fail_status: true,
                ..ScriptedBackend::default()
            },
            PartialReplyPolicy::Discard,
        );

        controller.set_text("Hello");
        controller.send().await;

        let messages = controller.conversation().messages();
        assert_eq!(messages.len(), 2);
        assert_eq!(messages[0].role, MessageRole::User);
    }

    #[tokio::test]
    async fn test_second_send_while_busy_is_rejected() {
        let gate = Arc::new(Notify::new());
        let (controller, backend) = controller_with(ScriptedBackend {
            chunks: vec!["done"],
            gate: Some(Arc::clone(&gate)),
            ..ScriptedBackend::default()
        });

        controller.set_text("first");
        let in_flight = tokio::spawn({
            let controller = controller.clone();
            async move { controller.send().await }
        });

        while !controller.is_busy() || backend.request_count() == 0 {
            tokio::task::yield_now().await;
        }

        // User message is echoed before the request resolves.
        assert_eq!(controller.conversation().messages(), vec![Message::user("first")]);

        controller.set_text("second");
        assert_eq!(controller.send().await, SendOutcome::Busy);
        assert_eq!(controller.text(), "second");

        gate.notify_one();
        assert_eq!(in_flight.await.unwrap(), SendOutcome::Completed);
        assert!(!controller.is_busy());
        assert_eq!(backend.request_count(), 1);

        gate.notify_one();
        assert_eq!(controller.send().await, SendOutcome::Completed);
        assert_eq!(backend.request_count(), 2);
    }

    #[tokio::test]
    async fn test_detach_restores_placeholder() {
        let (controller, _backend) = controller_with(ScriptedBackend::default());

        controller.attach(Attachment::new("a.txt", vec![]));
        controller.attach(Attachment::new("b.txt", vec![]));
        assert_eq!(controller.attachment_name().as_deref(), Some("b.txt"));

        let detached = controller.detach().unwrap();
        assert_eq!(detached.file_name, "b.txt");
        assert_eq!(controller.input_placeholder(), DEFAULT_PLACEHOLDER);
    }

    #[test]
    fn test_policy_names() {
        assert_eq!(PartialReplyPolicy::default(), PartialReplyPolicy::Keep);
        assert_eq!(PartialReplyPolicy::Discard.as_str(), "discard");
    }
}
