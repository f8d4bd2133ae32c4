//! Terminal front end.
//!
//! # Structure
//!
//! - [`command`]: Parsing of input lines into user actions
//! - [`render`]: Conversation rendering driven by store events
//! - [`session`]: Input loop executing commands in order

pub mod command;
pub mod render;
pub mod session;

pub use command::Command;
pub use render::Renderer;
