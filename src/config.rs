use clap::Parser;
use config::{Config, Environment, File};
use serde::Deserialize;

use crate::controller::PartialReplyPolicy;

/// Default backend base URL.
pub const DEFAULT_BASE_URL: &str = "http://localhost:8000";

/// Path appended to the base URL for both request modes.
pub const DEFAULT_ENDPOINT_SUFFIX: &str = "/chat/";

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    /// Config file path
    #[arg(short, long, env = "CONFIG_FILE")]
    pub config: Option<String>,

    /// Backend base URL (the chat endpoint is appended)
    #[arg(long, env = "API_BASE_URL")]
    pub base_url: Option<String>,

    /// What to do with a partially streamed reply when the stream fails
    #[arg(long, env = "PARTIAL_REPLY_POLICY", value_enum)]
    pub partial_reply: Option<PartialReplyPolicy>,

    /// Request timeout in seconds (no timeout when unset)
    #[arg(long, env = "REQUEST_TIMEOUT_SECS")]
    pub timeout_secs: Option<u64>,

    /// Log output format
    #[arg(long, env = "LOG_FORMAT", value_enum)]
    pub log_format: Option<LogFormat>,
}

#[derive(Debug, Deserialize, Clone)]
pub struct AppConfig {
    pub api: ApiConfig,
    pub chat: ChatConfig,
    pub logging: LoggingConfig,
}

#[derive(Debug, Deserialize, Clone)]
pub struct ApiConfig {
    pub base_url: String,
    pub endpoint_suffix: String,
    #[serde(default)]
    pub request_timeout_secs: Option<u64>,
}

#[derive(Debug, Deserialize, Clone)]
pub struct ChatConfig {
    pub partial_reply: PartialReplyPolicy,
}

#[derive(Debug, Deserialize, Clone)]
pub struct LoggingConfig {
    pub format: LogFormat,
}

/// Log output format.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    /// Human-readable lines.
    #[default]
    Text,
    /// One JSON object per event.
    Json,
}

impl LogFormat {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Text => "text",
            Self::Json => "json",
        }
    }
}

impl AppConfig {
    pub fn load() -> Result<Self, config::ConfigError> {
        Self::load_from_args(std::env::args())
    }

    /// Build the configuration from command-line style arguments.
    ///
    /// Priority: CLI flag > CLI env var > `CHATBOT_` env var > config file > defaults.
    pub fn load_from_args<I, T>(args: I) -> Result<Self, config::ConfigError>
    where
        I: IntoIterator<Item = T>,
        T: Into<std::ffi::OsString> + Clone,
    {
        let cli =
            Cli::try_parse_from(args).map_err(|e| config::ConfigError::Message(e.to_string()))?;

        let mut builder = Config::builder()
            .set_default("api.base_url", DEFAULT_BASE_URL)?
            .set_default("api.endpoint_suffix", DEFAULT_ENDPOINT_SUFFIX)?
            .set_default("chat.partial_reply", PartialReplyPolicy::default().as_str())?
            .set_default("logging.format", LogFormat::default().as_str())?;

        // An explicit file must exist; ./chatbot.{yaml,toml,json} is optional.
        builder = match &cli.config {
            Some(path) => builder.add_source(File::with_name(path)),
            None => builder.add_source(File::with_name("chatbot").required(false)),
        };

        // E.g. CHATBOT_API__BASE_URL=http://backend:8000
        builder = builder.add_source(
            Environment::with_prefix("CHATBOT")
                .prefix_separator("_")
                .separator("__")
                .try_parsing(true),
        );

        if let Some(url) = cli.base_url {
            builder = builder.set_override("api.base_url", url)?;
        }
        if let Some(policy) = cli.partial_reply {
            builder = builder.set_override("chat.partial_reply", policy.as_str())?;
        }
        if let Some(secs) = cli.timeout_secs {
            builder = builder.set_override("api.request_timeout_secs", secs)?;
        }
        if let Some(format) = cli.log_format {
            builder = builder.set_override("logging.format", format.as_str())?;
        }

        let loaded: Self = builder.build()?.try_deserialize()?;
        if loaded.api.base_url.trim().is_empty() {
            return Err(config::ConfigError::Message(
                "api.base_url cannot be empty".to_string(),
            ));
        }
        Ok(loaded)
    }
}
