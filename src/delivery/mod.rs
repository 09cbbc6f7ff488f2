// src/delivery/mod.rs
pub mod telegram;

use std::fmt;

/// Chat the bot talks to (numeric id or `@channel` username).
#[derive(Debug, Clone, PartialEq, Eq, Hash, serde::Serialize, serde::Deserialize)]
#[serde(transparent)]
pub struct ChatId(pub String);

impl ChatId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }
}

impl fmt::Display for ChatId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<i64> for ChatId {
    fn from(id: i64) -> Self {
        Self(id.to_string())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ParseMode {
    Plain,
    Markdown,
}

impl ParseMode {
    /// Value of the Bot API `parse_mode` field, if any.
    pub fn api_value(self) -> Option<&'static str> {
        match self {
            ParseMode::Plain => None,
            ParseMode::Markdown => Some("Markdown"),
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum DeliveryError {
    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("API rejected message: {0}")]
    Api(String),

    #[error("rate limited: retry after {retry_after_secs}s")]
    RateLimited { retry_after_secs: u64 },
}

/// Outbound message transport. One call, one message; no retries here.
#[async_trait::async_trait]
pub trait DeliveryChannel: Send + Sync {
    async fn send(&self, destination: &ChatId, text: &str, mode: ParseMode) -> Result<(), DeliveryError>;

    /// Human-readable name for logs (e.g. "telegram").
    fn channel_name(&self) -> &str;
}
