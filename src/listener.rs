// src/listener.rs
//! # Interactive listener
//! Long-lived inbound command loop. Commands from one source are handled one
//! at a time; a "run now" cycle may overlap a scheduled one.

use std::sync::Arc;
use std::time::Duration;

use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::cycle::{Aggregator, Trigger};
use crate::delivery::{ChatId, DeliveryError, ParseMode};
use crate::digest::{escape_markdown, render_section};
use crate::scheduler::ScheduleEntry;

pub const REFRESH_ACK: &str = "🔄 Refreshing news, gold prices and real-estate...";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Command {
    /// Help text plus the status source only.
    Status,
    /// Full cycle to the configured destination.
    RunNow,
}

impl Command {
    /// Parse a chat message. Accepts a `@botname` suffix and trailing
    /// arguments; returns `None` for anything that is not a known command.
    pub fn parse(text: &str) -> Option<Self> {
        let first = text.split_whitespace().next()?;
        let name = first.strip_prefix('/')?;
        let name = name.split('@').next().unwrap_or(name);
        match name.to_ascii_lowercase().as_str() {
            "start" | "help" | "status" => Some(Command::Status),
            "refresh" | "now" => Some(Command::RunNow),
            _ => None,
        }
    }
}

/// A parsed command and where to answer it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InboundCommand {
    pub command: Command,
    pub reply_to: ChatId,
}

#[derive(Debug, thiserror::Error)]
pub enum CommandSourceError {
    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("API error: {0}")]
    Api(String),

    /// No more commands will ever arrive.
    #[error("command source closed")]
    Closed,
}

/// Inbound transport. Unknown commands are filtered out before they get here.
#[async_trait::async_trait]
pub trait CommandSource: Send + Sync {
    async fn next_commands(&self) -> Result<Vec<InboundCommand>, CommandSourceError>;
}

#[async_trait::async_trait]
impl<T: CommandSource + ?Sized> CommandSource for Arc<T> {
    async fn next_commands(&self) -> Result<Vec<InboundCommand>, CommandSourceError> {
        (**self).next_commands().await
    }
}

/// Static help text listing commands and the automatic schedule.
pub fn help_text(schedule: &[ScheduleEntry]) -> String {
    let times = if schedule.is_empty() {
        "never (no schedule configured)".to_string()
    } else {
        schedule
            .iter()
            .map(ToString::to_string)
            .collect::<Vec<_>>()
            .join(", ")
    };
    format!(
        "🤖 **Welcome to the news & gold price bot!**\n\
         📌 **Available commands:**\n\
         🔹 /start - show gold prices and this help\n\
         🔹 /refresh - fetch news, gold prices and real-estate now\n\
         🕒 Digests are sent automatically at {times}."
    )
}

pub struct InteractiveListener<S> {
    source: S,
    aggregator: Arc<Aggregator>,
    status_source: String,
    help: String,
    error_backoff: Duration,
}

impl<S: CommandSource> InteractiveListener<S> {
    pub fn new(source: S, aggregator: Arc<Aggregator>, status_source: &str, help: String) -> Self {
        Self {
            source,
            aggregator,
            status_source: status_source.to_string(),
            help,
            error_backoff: Duration::from_secs(5),
        }
    }

    /// Pause after a failed poll before asking again.
    pub fn with_error_backoff(mut self, backoff: Duration) -> Self {
        self.error_backoff = backoff;
        self
    }

    /// Runs until `shutdown` is cancelled or the source closes. A command
    /// being handled is finished before cancellation is observed.
    pub async fn run(self, shutdown: CancellationToken) {
        info!(status_source = %self.status_source, "listener starting");

        loop {
            let polled = tokio::select! {
                biased;

                _ = shutdown.cancelled() => {
                    info!("listener shutting down");
                    break;
                }

                res = self.source.next_commands() => res,
            };

            match polled {
                Ok(batch) => {
                    let total = batch.len();
                    for (handled, cmd) in batch.into_iter().enumerate() {
                        if shutdown.is_cancelled() {
                            warn!(dropped = total - handled, "shutdown with commands pending");
                            return;
                        }
                        self.dispatch(cmd).await;
                    }
                }
                Err(CommandSourceError::Closed) => {
                    info!("command source closed; listener stopping");
                    break;
                }
                Err(e) => {
                    warn!(error = %e, backoff_ms = self.error_backoff.as_millis() as u64, "command poll failed");
                    tokio::select! {
                        _ = shutdown.cancelled() => break,
                        _ = tokio::time::sleep(self.error_backoff) => {}
                    }
                }
            }
        }
    }

    /// Handle one command, always answering the invoking chat.
    pub async fn dispatch(&self, cmd: InboundCommand) {
        debug!(command = ?cmd.command, chat = %cmd.reply_to, "dispatching");
        let res = match cmd.command {
            Command::Status => self.status(&cmd.reply_to).await,
            Command::RunNow => self.run_now(&cmd.reply_to).await,
        };
        if let Err(e) = res {
            warn!(command = ?cmd.command, chat = %cmd.reply_to, error = %e, "reply not delivered");
        }
    }

    async fn status(&self, chat: &ChatId) -> Result<(), DeliveryError> {
        let body = match self.aggregator.fetch_section(&self.status_source).await {
            Some(section) => render_section(&section),
            None => format!(
                "❌ Unknown status source `{}`.",
                escape_markdown(&self.status_source)
            ),
        };
        let text = format!("{}\n\n{}", self.help, body);
        self.reply(chat, &text, ParseMode::Markdown).await
    }

    async fn run_now(&self, chat: &ChatId) -> Result<(), DeliveryError> {
        if let Err(e) = self.reply(chat, REFRESH_ACK, ParseMode::Plain).await {
            warn!(chat = %chat, error = %e, "refresh ack not delivered; running cycle anyway");
        }

        let trigger = Trigger::Command {
            requested_by: chat.clone(),
        };
        match self.aggregator.run_isolated(trigger).await {
            Ok(report) => match report.delivery {
                Ok(()) => Ok(()),
                Err(e) => {
                    let text = format!("⚠️ Digest was composed but could not be sent: {e}");
                    self.reply(chat, &text, ParseMode::Plain).await
                }
            },
            Err(e) => {
                warn!(error = %e, "interactive cycle aborted");
                self.reply(chat, "⚠️ Refresh failed unexpectedly.", ParseMode::Plain)
                    .await
            }
        }
    }

    async fn reply(&self, chat: &ChatId, text: &str, mode: ParseMode) -> Result<(), DeliveryError> {
        self.aggregator.delivery().send(chat, text, mode).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_known_commands() {
        assert_eq!(Command::parse("/start"), Some(Command::Status));
        assert_eq!(Command::parse("/help"), Some(Command::Status));
        assert_eq!(Command::parse("/refresh"), Some(Command::RunNow));
        assert_eq!(Command::parse("  /REFRESH now please"), Some(Command::RunNow));
        assert_eq!(Command::parse("/start@gold_news_bot"), Some(Command::Status));
    }

    #[test]
    fn ignores_everything_else() {
        assert_eq!(Command::parse("start"), None);
        assert_eq!(Command::parse("/stop"), None);
        assert_eq!(Command::parse(""), None);
        assert_eq!(Command::parse("hello /start"), None);
    }

    #[test]
    fn help_lists_schedule() {
        let sched: Vec<ScheduleEntry> = vec!["08:00".parse().unwrap(), "18:00".parse().unwrap()];
        let h = help_text(&sched);
        assert!(h.contains("/start"));
        assert!(h.contains("/refresh"));
        assert!(h.contains("08:00, 18:00"));
        assert!(help_text(&[]).contains("no schedule"));
    }
}
