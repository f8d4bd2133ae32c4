//! Input loop for the terminal front end.
//!
//! Commands are executed strictly in the order they were typed. Input keeps
//! being read while a reply streams in; lines that arrive meanwhile are
//! queued, acknowledged with a notice, and run once the reply completes.
//!
//! # Example
//!
//! ```rust,no_run
//! use chatbot_relay::ui::session;
//! # async fn demo(controller: chatbot_relay::ChatController) -> Result<(), std::io::Error> {
//! let lines = futures::stream::iter(vec![Ok::<_, std::io::Error>("Hello".to_string())]);
//! session::run(&controller, lines, std::io::stderr()).await?;
//! # Ok(())
//! # }
//! ```

use std::collections::VecDeque;
use std::io::Write;

use futures::future::LocalBoxFuture;
use futures::{FutureExt, Stream, StreamExt};

use super::Command;
use crate::controller::{ChatController, SendOutcome};

/// Shown when a line arrives while a reply is still streaming.
pub const QUEUED_NOTICE: &str = "Waiting for the previous reply; your message is queued.";

type InFlight = LocalBoxFuture<'static, SendOutcome>;

/// Execute input lines against `controller` until `/quit` or end of input.
///
/// Returns only after every accepted command has finished, including a send
/// that was in flight when input ended. Status lines are written to `notices`.
pub async fn run<S, E, W>(controller: &ChatController, mut lines: S, mut notices: W) -> Result<(), E>
where
    S: Stream<Item = Result<String, E>> + Unpin,
    W: Write,
{
    let mut queue: VecDeque<Command> = VecDeque::new();
    let mut in_flight: Option<InFlight> = None;
    let mut reading = true;

    notice(&mut notices, &controller.input_placeholder());

    loop {
        while in_flight.is_none() {
            let Some(command) = queue.pop_front() else {
                break;
            };
            match command {
                Command::Quit => return Ok(()),
                Command::Attach(path) => match controller.attach_path(&path).await {
                    Ok(()) => notice(&mut notices, &controller.input_placeholder()),
                    Err(e) => notice(&mut notices, &e.to_string()),
                },
                Command::Detach => {
                    controller.detach();
                    notice(&mut notices, &controller.input_placeholder());
                }
                Command::Send(text) => {
                    controller.set_text(text);
                    let controller = controller.clone();
                    in_flight = Some(async move { controller.send().await }.boxed_local());
                }
            }
        }

        if in_flight.is_none() && !reading {
            return Ok(());
        }

        tokio::select! {
            biased;

            outcome = settle(&mut in_flight), if in_flight.is_some() => {
                in_flight = None;
                tracing::debug!(outcome = ?outcome, queued = queue.len(), "Send finished");
                if matches!(outcome, SendOutcome::Completed | SendOutcome::Failed) {
                    notice(&mut notices, &controller.input_placeholder());
                }
            }

            line = lines.next(), if reading => match line {
                Some(line) => {
                    let command = Command::parse(&line?);
                    let busy = in_flight.is_some();
                    match &command {
                        // Nothing to keep.
                        Command::Send(text) if busy && text.trim().is_empty() => continue,
                        Command::Send(_) if busy => notice(&mut notices, QUEUED_NOTICE),
                        Command::Quit => reading = false,
                        _ => {}
                    }
                    queue.push_back(command);
                }
                None => reading = false,
            },
        }
    }
}

async fn settle(in_flight: &mut Option<InFlight>) -> SendOutcome {
    match in_flight {
        Some(send) => send.await,
        None => std::future::pending().await,
    }
}

fn notice<W: Write>(out: &mut W, text: &str) {
    // Status output is best effort.
    let _ = writeln!(out, "[{text}]");
}
