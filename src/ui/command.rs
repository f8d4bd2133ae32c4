//! Input line parsing.

use std::path::PathBuf;

/// A user action typed on the input line.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    /// Select a file for the next send.
    Attach(PathBuf),
    /// Drop the pending file.
    Detach,
    /// Exit the front end.
    Quit,
    /// Use the line as the message text and send.
    Send(String),
}

impl Command {
    /// Parse one input line.
    ///
    /// Anything that is not a known `/command` is message text, sent verbatim.
    ///
    /// # Example
    ///
    /// ```rust
    /// use chatbot_relay::ui::Command;
    ///
    /// assert_eq!(Command::parse("/quit"), Command::Quit);
    /// assert_eq!(Command::parse("Hello"), Command::Send("Hello".to_string()));
    /// ```
    #[must_use]
    pub fn parse(line: &str) -> Self {
        let trimmed = line.trim();
        match trimmed.split_once(char::is_whitespace) {
            Some(("/attach", path)) if !path.trim().is_empty() => {
                Self::Attach(PathBuf::from(path.trim()))
            }
            None if trimmed == "/detach" => Self::Detach,
            None if trimmed == "/quit" || trimmed == "/exit" => Self::Quit,
            _ => Self::Send(line.to_string()),
        }
    }
}
