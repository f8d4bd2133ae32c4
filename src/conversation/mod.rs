//! Conversation messages and the in-memory conversation store.
//!
//! The store holds the ordered message history of a single chat session and
//! notifies subscribers of every mutation, so any front end can re-render
//! without polling.
//!
//! # Architecture
//!
//! - [`Message`]: One `{role, content}` record
//! - [`Conversation`]: Shared, internally synchronized message list
//! - [`ConversationEvent`]: Change notification emitted after each mutation
//!
//! # Example
//!
//! ```rust
//! use chatbot_relay::conversation::{Conversation, Message};
//!
//! let conversation = Conversation::new();
//! conversation.append(Message::user("Hello!"));
//! conversation.append(Message::assistant(""));
//! conversation.replace_last("Hi");
//!
//! let messages = conversation.messages();
//! assert_eq!(messages.len(), 2);
//! assert_eq!(messages[1].content, "Hi");
//! ```

mod store;

pub use store::{Conversation, ConversationEvent, ConversationEvents};

use serde::{Deserialize, Serialize};

/// Role of a message author.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MessageRole {
    /// Message typed (or file sent) by the user.
    User,
    /// Reply produced by the backend, or a local status line.
    Assistant,
}

impl MessageRole {
    /// Wire name of the role.
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::User => "user",
            Self::Assistant => "assistant",
        }
    }
}

/// A message in a conversation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Message {
    /// Role of the message author.
    pub role: MessageRole,
    /// Plain text content. Line breaks are significant.
    pub content: String,
}

impl Message {
    /// Create a user message.
    #[must_use]
    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: MessageRole::User,
            content: content.into(),
        }
    }

    /// Create an assistant message.
    #[must_use]
    pub fn assistant(content: impl Into<String>) -> Self {
        Self {
            role: MessageRole::Assistant,
            content: content.into(),
        }
    }
}
