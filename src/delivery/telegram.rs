// src/delivery/telegram.rs
//! Telegram Bot API client: `sendMessage` for delivery and replies,
//! `getUpdates` long polling for inbound commands.
//!
//! The bot token is part of every request URL, so transport errors are
//! stripped of their URL before they leave this module.

use std::sync::atomic::{AtomicI64, Ordering};
use std::time::Duration;

use serde::Deserialize;

use crate::delivery::{ChatId, DeliveryChannel, DeliveryError, ParseMode};
use crate::listener::{Command, CommandSource, CommandSourceError, InboundCommand};

pub const DEFAULT_API_BASE: &str = "https://api.telegram.org";
pub const DEFAULT_POLL_TIMEOUT_SECS: u64 = 30;

#[derive(Debug, Deserialize)]
struct ApiResponse<T> {
    ok: bool,
    result: Option<T>,
    description: Option<String>,
    parameters: Option<ResponseParameters>,
}

#[derive(Debug, Deserialize)]
struct ResponseParameters {
    retry_after: Option<u64>,
}

#[derive(Debug, Deserialize)]
struct Update {
    update_id: i64,
    message: Option<Message>,
}

#[derive(Debug, Deserialize)]
struct Message {
    chat: Chat,
    text: Option<String>,
}

#[derive(Debug, Deserialize)]
struct Chat {
    id: i64,
}

pub struct TelegramBot {
    token: String,
    api_base: String,
    client: reqwest::Client,
    poll_timeout_secs: u64,
    send_timeout: Duration,
    /// Next `update_id` to ask for; 0 until the first batch arrives.
    offset: AtomicI64,
}

impl TelegramBot {
    pub fn new(token: String) -> Self {
        Self {
            token,
            api_base: DEFAULT_API_BASE.to_string(),
            client: reqwest::Client::new(),
            poll_timeout_secs: DEFAULT_POLL_TIMEOUT_SECS,
            send_timeout: Duration::from_secs(20),
            offset: AtomicI64::new(0),
        }
    }

    pub fn with_api_base(mut self, base: &str) -> Self {
        self.api_base = base.trim_end_matches('/').to_string();
        self
    }

    pub fn with_poll_timeout(mut self, secs: u64) -> Self {
        self.poll_timeout_secs = secs;
        self
    }

    fn method_url(&self, method: &str) -> String {
        format!("{}/bot{}/{}", self.api_base, self.token, method)
    }
}

#[async_trait::async_trait]
impl DeliveryChannel for TelegramBot {
    async fn send(&self, destination: &ChatId, text: &str, mode: ParseMode) -> Result<(), DeliveryError> {
        let mut body = serde_json::json!({
            "chat_id": destination.0,
            "text": text,
            "disable_web_page_preview": true,
        });
        if let Some(pm) = mode.api_value() {
            body["parse_mode"] = serde_json::Value::String(pm.to_string());
        }

        tracing::debug!(chat_id = %destination, parse_mode = ?mode, len = text.len(), "telegram sendMessage");

        let response = self
            .client
            .post(self.method_url("sendMessage"))
            .timeout(self.send_timeout)
            .json(&body)
            .send()
            .await
            .map_err(|e| DeliveryError::Http(e.without_url()))?;

        let status = response.status();
        let parsed: ApiResponse<serde_json::Value> = response
            .json()
            .await
            .map_err(|e| DeliveryError::Http(e.without_url()))?;

        if parsed.ok {
            return Ok(());
        }

        if status == reqwest::StatusCode::TOO_MANY_REQUESTS {
            let retry_after_secs = parsed
                .parameters
                .and_then(|p| p.retry_after)
                .unwrap_or(30);
            return Err(DeliveryError::RateLimited { retry_after_secs });
        }

        Err(DeliveryError::Api(
            parsed
                .description
                .unwrap_or_else(|| format!("Telegram API error (HTTP {status})")),
        ))
    }

    fn channel_name(&self) -> &str {
        "telegram"
    }
}

#[async_trait::async_trait]
impl CommandSource for TelegramBot {
    async fn next_commands(&self) -> Result<Vec<InboundCommand>, CommandSourceError> {
        let offset = self.offset.load(Ordering::Acquire);
        let mut query = vec![
            ("timeout", self.poll_timeout_secs.to_string()),
            ("allowed_updates", r#"["message"]"#.to_string()),
        ];
        if offset > 0 {
            query.push(("offset", offset.to_string()));
        }

        let response = self
            .client
            .get(self.method_url("getUpdates"))
            .query(&query)
            .timeout(Duration::from_secs(self.poll_timeout_secs + 10))
            .send()
            .await
            .map_err(|e| CommandSourceError::Http(e.without_url()))?;

        let parsed: ApiResponse<Vec<Update>> = response
            .json()
            .await
            .map_err(|e| CommandSourceError::Http(e.without_url()))?;

        if !parsed.ok {
            return Err(CommandSourceError::Api(
                parsed
                    .description
                    .unwrap_or_else(|| "getUpdates failed".to_string()),
            ));
        }

        let mut out = Vec::new();
        for update in parsed.result.unwrap_or_default() {
            self.offset.fetch_max(update.update_id + 1, Ordering::AcqRel);
            let Some(msg) = update.message else { continue };
            let Some(text) = msg.text.as_deref() else { continue };
            match Command::parse(text) {
                Some(command) => out.push(InboundCommand {
                    command,
                    reply_to: ChatId::from(msg.chat.id),
                }),
                None => tracing::debug!(update_id = update.update_id, "ignoring non-command message"),
            }
        }
        Ok(out)
    }
}
