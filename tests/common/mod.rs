// tests/common/mod.rs
#![allow(dead_code)]

use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use digest_bot::delivery::{ChatId, DeliveryChannel, DeliveryError, ParseMode};
use digest_bot::listener::{CommandSource, CommandSourceError, InboundCommand};
use digest_bot::source::{FetchError, Item, SourceFetcher, SourceResult};
use tokio::sync::mpsc;

/// Fetcher answering with a canned result after an optional delay.
pub struct StaticFetcher {
    pub result: SourceResult,
    pub delay: Duration,
    pub calls: AtomicUsize,
}

impl StaticFetcher {
    pub fn ok(items: Vec<Item>) -> Arc<Self> {
        Self::new(Ok(items), Duration::ZERO)
    }

    pub fn failing(err: FetchError) -> Arc<Self> {
        Self::new(Err(err), Duration::ZERO)
    }

    pub fn new(result: SourceResult, delay: Duration) -> Arc<Self> {
        Arc::new(Self {
            result,
            delay,
            calls: AtomicUsize::new(0),
        })
    }
}

#[async_trait]
impl SourceFetcher for StaticFetcher {
    async fn fetch(&self) -> SourceResult {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if !self.delay.is_zero() {
            tokio::time::sleep(self.delay).await;
        }
        self.result.clone()
    }

    fn kind(&self) -> &'static str {
        "static"
    }
}

/// Fetcher that panics mid-fetch.
pub struct PanickingFetcher;

#[async_trait]
impl SourceFetcher for PanickingFetcher {
    async fn fetch(&self) -> SourceResult {
        panic!("parser blew up");
    }

    fn kind(&self) -> &'static str {
        "panicking"
    }
}

pub fn headlines(prefix: &str, n: usize) -> Vec<Item> {
    (1..=n)
        .map(|i| Item::headline(format!("{prefix} {i}"), format!("https://example.test/{prefix}/{i}")))
        .collect()
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Sent {
    pub to: ChatId,
    pub text: String,
    pub mode: ParseMode,
}

/// Delivery channel that records every message; optionally rejects
/// messages sent in Markdown (i.e. digests and status replies).
#[derive(Default)]
pub struct RecordingChannel {
    pub sent: Mutex<Vec<Sent>>,
    pub fail_markdown: AtomicBool,
    pub delay: Mutex<Duration>,
}

impl RecordingChannel {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn failing_digests() -> Arc<Self> {
        let ch = Self::default();
        ch.fail_markdown.store(true, Ordering::SeqCst);
        Arc::new(ch)
    }

    pub fn with_delay(delay: Duration) -> Arc<Self> {
        let ch = Self::default();
        *ch.delay.lock().unwrap() = delay;
        Arc::new(ch)
    }

    pub fn sent(&self) -> Vec<Sent> {
        self.sent.lock().unwrap().clone()
    }

    pub fn sent_to(&self, chat: &ChatId) -> Vec<Sent> {
        self.sent().into_iter().filter(|s| &s.to == chat).collect()
    }
}

#[async_trait]
impl DeliveryChannel for RecordingChannel {
    async fn send(&self, destination: &ChatId, text: &str, mode: ParseMode) -> Result<(), DeliveryError> {
        let delay = *self.delay.lock().unwrap();
        if !delay.is_zero() {
            tokio::time::sleep(delay).await;
        }
        if mode == ParseMode::Markdown && self.fail_markdown.load(Ordering::SeqCst) {
            return Err(DeliveryError::Api("Bad Request: chat not found".into()));
        }
        self.sent.lock().unwrap().push(Sent {
            to: destination.clone(),
            text: text.to_string(),
            mode,
        });
        Ok(())
    }

    fn channel_name(&self) -> &str {
        "recording"
    }
}

/// Command source fed from a test through an mpsc channel; closing the
/// sender closes the source.
pub struct ChannelCommandSource {
    rx: tokio::sync::Mutex<mpsc::UnboundedReceiver<Vec<InboundCommand>>>,
}

impl ChannelCommandSource {
    pub fn new() -> (mpsc::UnboundedSender<Vec<InboundCommand>>, Self) {
        let (tx, rx) = mpsc::unbounded_channel();
        (
            tx,
            Self {
                rx: tokio::sync::Mutex::new(rx),
            },
        )
    }
}

#[async_trait]
impl CommandSource for ChannelCommandSource {
    async fn next_commands(&self) -> Result<Vec<InboundCommand>, CommandSourceError> {
        self.rx.lock().await.recv().await.ok_or(CommandSourceError::Closed)
    }
}

/// Poll `cond` on the (possibly paused) tokio clock until it holds.
pub async fn wait_until(mut cond: impl FnMut() -> bool, max: Duration) -> bool {
    let deadline = tokio::time::Instant::now() + max;
    while tokio::time::Instant::now() < deadline {
        if cond() {
            return true;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    cond()
}
