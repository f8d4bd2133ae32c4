//! Chatbot relay client
//!
//! A chat front end that relays user text or a single file upload to a backend
//! HTTP endpoint and streams the assistant's reply back into the conversation
//! token by token.
//!
//! # Architecture
//!
//! - **Conversation store**: ordered message list with change notifications
//! - **Transport**: HTTP driver for multipart uploads and streamed chat replies
//! - **Controller**: turns one user action into exactly one request and drives
//!   the resulting conversation updates
//! - **UI**: line-oriented terminal front end rendering from store events
//!
//! # Modules
//!
//! - [`config`]: Layered configuration (defaults, file, env, CLI)
//! - [`conversation`]: Message model and conversation store
//! - [`controller`]: Send action, busy flag and partial-reply policy
//! - [`transport`]: Backend trait, HTTP implementation and stream decoding
//! - [`ui`]: Terminal commands and rendering

// Allow pedantic clippy warnings that don't add value for this codebase
#![allow(clippy::missing_fields_in_debug)]
#![allow(clippy::match_same_arms)]
#![allow(clippy::default_trait_access)]

pub mod config;
pub mod controller;
pub mod conversation;
pub mod transport;
pub mod ui;

pub use controller::{ChatController, PartialReplyPolicy, SendOutcome};
pub use conversation::{Conversation, ConversationEvent, Message, MessageRole};
pub use transport::{Attachment, ChatBackend, HttpBackend, TransportError};
