//! Conversation rendering for a line-oriented terminal.
//!
//! The last message's line is kept open so a streamed reply can be extended
//! by writing only the newly received suffix.

use std::io::{self, Write};

use futures::{FutureExt, StreamExt};
use tokio_stream::wrappers::errors::BroadcastStreamRecvError;
use tokio_util::sync::CancellationToken;

use crate::conversation::{Conversation, ConversationEvent, ConversationEvents, Message, MessageRole};

/// Printed when a partial reply is dropped from the conversation.
const DISCARDED_MARKER: &str = "(partial reply discarded)";

/// Label printed before a message's content.
#[must_use]
pub fn role_label(role: MessageRole) -> &'static str {
    match role {
        MessageRole::User => "you: ",
        MessageRole::Assistant => "assistant: ",
    }
}

#[derive(Debug, Clone, Copy)]
struct OpenLine {
    index: usize,
    printed: usize,
}

/// Writes conversation events to an output as plain text.
#[derive(Debug)]
pub struct Renderer<W: Write> {
    out: W,
    open: Option<OpenLine>,
    next_index: usize,
}

impl<W: Write> Renderer<W> {
    /// Create a renderer with nothing printed yet.
    pub fn new(out: W) -> Self {
        Self {
            out,
            open: None,
            next_index: 0,
        }
    }

    /// Render one store event.
    pub fn apply(&mut self, event: &ConversationEvent) -> io::Result<()> {
        match event {
            ConversationEvent::Appended { index, message } => self.start(*index, message)?,
            ConversationEvent::LastReplaced { index, message } => {
                self.extend(*index, message)?;
            }
            ConversationEvent::Removed { index } => {
                self.close()?;
                writeln!(self.out, "{DISCARDED_MARKER}")?;
                self.next_index = *index;
            }
        }
        self.out.flush()
    }

    /// Catch up from a snapshot after missing events.
    pub fn resync(&mut self, messages: &[Message]) -> io::Result<()> {
        if let Some(line) = self.open {
            if let Some(message) = messages.get(line.index) {
                self.extend(line.index, message)?;
            }
        }
        for (index, message) in messages.iter().enumerate().skip(self.next_index) {
            self.start(index, message)?;
        }
        self.out.flush()
    }

    /// Terminate the open line, if any.
    pub fn close(&mut self) -> io::Result<()> {
        if self.open.take().is_some() {
            writeln!(self.out)?;
        }
        Ok(())
    }

    /// Give back the underlying writer.
    pub fn into_inner(self) -> W {
        self.out
    }

    fn start(&mut self, index: usize, message: &Message) -> io::Result<()> {
        self.close()?;
        write!(self.out, "{}{}", role_label(message.role), message.content)?;
        self.open = Some(OpenLine {
            index,
            printed: message.content.len(),
        });
        self.next_index = index + 1;
        Ok(())
    }

    fn extend(&mut self, index: usize, message: &Message) -> io::Result<()> {
        let content = message.content.as_str();
        match &mut self.open {
            Some(line)
                if line.index == index
                    && content.len() >= line.printed
                    && content.is_char_boundary(line.printed) =>
            {
                self.out.write_all(content[line.printed..].as_bytes())?;
                line.printed = content.len();
                Ok(())
            }
            // Not a pure extension of what is on screen: print it again.
            _ => self.start(index, message),
        }
    }
}

/// Render events until `shutdown` is cancelled.
///
/// Events already buffered at shutdown are still printed. A lagging
/// subscriber resynchronizes from the conversation's current state.
/// Returns the writer once the last line is terminated.
pub async fn run<W: Write>(
    mut events: ConversationEvents,
    conversation: Conversation,
    out: W,
    shutdown: CancellationToken,
) -> io::Result<W> {
    let mut renderer = Renderer::new(out);
    loop {
        tokio::select! {
            biased;

            event = events.next() => match event {
                Some(Ok(event)) => renderer.apply(&event)?,
                Some(Err(BroadcastStreamRecvError::Lagged(missed))) => {
                    tracing::warn!(missed = missed, "Renderer lagged behind conversation");
                    renderer.resync(&conversation.messages())?;
                }
                None => break,
            },

            () = shutdown.cancelled() => {
                while let Some(Some(Ok(event))) = events.next().now_or_never() {
                    renderer.apply(&event)?;
                }
                // Covers anything the drain could not reach.
                renderer.resync(&conversation.messages())?;
                break;
            }
        }
    }
    renderer.close()?;
    renderer.out.flush()?;
    Ok(renderer.into_inner())
}
