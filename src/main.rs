//! Chatbot terminal client
//!
//! Entry point for the line-oriented chat front end.

// Allow pedantic clippy warnings that don't add value for this codebase
#![allow(clippy::missing_fields_in_debug)]

use mimalloc::MiMalloc;

/// Global allocator for improved performance (M-MIMALLOC-APPS).
#[global_allocator]
static GLOBAL: MiMalloc = MiMalloc;

use std::sync::Arc;

use anyhow::Context;
use dotenvy::dotenv;
use tokio_util::codec::{FramedRead, LinesCodec};
use tokio_util::sync::CancellationToken;
use tracing::info;
use tracing_subscriber::{EnvFilter, fmt, layer::SubscriberExt, util::SubscriberInitExt};

use chatbot_relay::config::{AppConfig, LogFormat};
use chatbot_relay::ui::{render, session};
use chatbot_relay::{ChatBackend, ChatController, Conversation, HttpBackend};

// Single-threaded, like the event loop of a browser page.
#[tokio::main(flavor = "current_thread")]
async fn main() -> anyhow::Result<()> {
    // Load .env (if present)
    let _ = dotenv();

    let config = AppConfig::load().context("Configuration error")?;
    init_tracing(config.logging.format);

    let backend = HttpBackend::from_config(&config.api).context("Invalid backend endpoint")?;

    info!(
        name: "chat.config.loaded",
        endpoint = %backend.endpoint(),
        partial_reply = config.chat.partial_reply.as_str(),
        timeout_secs = ?config.api.request_timeout_secs,
        "Chat configuration loaded"
    );

    let conversation = Conversation::new();
    let controller = ChatController::new(
        conversation.clone(),
        Arc::new(backend) as Arc<dyn ChatBackend>,
        config.chat.partial_reply,
    );

    let shutdown = CancellationToken::new();
    let renderer = tokio::spawn(render::run(
        conversation.subscribe(),
        conversation,
        std::io::stdout(),
        shutdown.clone(),
    ));

    // Status lines go to stderr so stdout carries only the conversation.
    let lines = FramedRead::new(tokio::io::stdin(), LinesCodec::new());
    let input = session::run(&controller, lines, std::io::stderr()).await;

    shutdown.cancel();
    renderer
        .await
        .context("Renderer task failed")?
        .context("Failed to write conversation")?;
    input.context("Failed to read input")?;

    info!(name: "chat.exit", "Input closed, exiting");
    Ok(())
}

fn init_tracing(format: LogFormat) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"));
    let registry = tracing_subscriber::registry().with(filter);

    match format {
        LogFormat::Json => registry
            .with(fmt::layer().json().with_writer(std::io::stderr))
            .init(),
        LogFormat::Text => registry
            .with(fmt::layer().with_target(true).with_writer(std::io::stderr))
            .init(),
    }
}
