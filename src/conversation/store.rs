//! Conversation store with change notification.

use std::sync::{Arc, PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};

use tokio::sync::broadcast;
use tokio_stream::wrappers::BroadcastStream;

use super::Message;

/// Buffered change events per subscriber before it starts lagging.
const EVENT_CAPACITY: usize = 1024;

/// A mutation applied to a [`Conversation`].
///
/// Events are sent after the change is visible through
/// [`Conversation::messages`], in mutation order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConversationEvent {
    /// A message was added at `index` (always the new last position).
    Appended {
        /// Position of the new message.
        index: usize,
        /// The appended message.
        message: Message,
    },
    /// The last message was rewritten in place.
    LastReplaced {
        /// Position of the rewritten message.
        index: usize,
        /// The message after the rewrite.
        message: Message,
    },
    /// The last message was removed.
    Removed {
        /// Position the message occupied.
        index: usize,
    },
}

/// Stream of [`ConversationEvent`]s for one subscriber.
///
/// Yields `Err(Lagged(n))` when the subscriber fell more than the channel
/// capacity behind; the current state can then be re-read with
/// [`Conversation::messages`].
pub type ConversationEvents = BroadcastStream<ConversationEvent>;

/// Ordered message history of one chat session.
///
/// Cloning yields another handle to the same conversation.
#[derive(Debug, Clone)]
pub struct Conversation {
    inner: Arc<ConversationInner>,
}

#[derive(Debug)]
struct ConversationInner {
    messages: RwLock<Vec<Message>>,
    events: broadcast::Sender<ConversationEvent>,
}

impl Default for Conversation {
    fn default() -> Self {
        Self::new()
    }
}

impl Conversation {
    /// Create an empty conversation.
    #[must_use]
    pub fn new() -> Self {
        let (events, _) = broadcast::channel(EVENT_CAPACITY);
        Self {
            inner: Arc::new(ConversationInner {
                messages: RwLock::new(Vec::new()),
                events,
            }),
        }
    }

    /// Subscribe to changes made after this call.
    #[must_use]
    pub fn subscribe(&self) -> ConversationEvents {
        BroadcastStream::new(self.inner.events.subscribe())
    }

    /// Append a message and return its index.
    pub fn append(&self, message: Message) -> usize {
        let mut guard = self.write();
        guard.push(message.clone());
        let index = guard.len() - 1;
        self.notify(ConversationEvent::Appended { index, message });
        index
    }

    /// Overwrite the content of the last message.
    ///
    /// Returns `false` (and changes nothing) when the conversation is empty.
    pub fn replace_last(&self, content: impl Into<String>) -> bool {
        let mut guard = self.write();
        let index = guard.len().saturating_sub(1);
        let Some(last) = guard.last_mut() else {
            return false;
        };
        last.content = content.into();
        let message = last.clone();
        self.notify(ConversationEvent::LastReplaced { index, message });
        true
    }

    /// Remove and return the last message.
    pub fn remove_last(&self) -> Option<Message> {
        let mut guard = self.write();
        let removed = guard.pop()?;
        self.notify(ConversationEvent::Removed { index: guard.len() });
        Some(removed)
    }

    /// Get all messages in order.
    #[must_use]
    pub fn messages(&self) -> Vec<Message> {
        self.read().clone()
    }

    /// Get the last message, if any.
    #[must_use]
    pub fn last(&self) -> Option<Message> {
        self.read().last().cloned()
    }

    /// Number of messages.
    #[must_use]
    pub fn len(&self) -> usize {
        self.read().len()
    }

    /// Check if the conversation has no messages.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    // Sent while the write lock is held so event order matches mutation order.
    fn notify(&self, event: ConversationEvent) {
        // No subscribers is not an error.
        let _ = self.inner.events.send(event);
    }

    fn read(&self) -> RwLockReadGuard<'_, Vec<Message>> {
        self.inner
            .messages
            .read()
            .unwrap_or_else(PoisonError::into_inner)
    }

    fn write(&self) -> RwLockWriteGuard<'_, Vec<Message>> {
        self.inner
            .messages
            .write()
            .unwrap_or_else(PoisonError::into_inner)
    }
}
