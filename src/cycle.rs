// src/cycle.rs
//! # Aggregation cycle
//! The one operation both triggers share: fetch every registered source
//! concurrently, compose the digest in registration order, deliver it once.
//!
//! `Aggregator` holds no mutable cycle state, so the scheduler and the
//! listener may run cycles at the same time; each builds its own digest.

use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use futures::future::join_all;
use metrics::{counter, gauge, histogram};
use tokio::time::Instant;
use tracing::{info, warn, Instrument};

use crate::config::Settings;
use crate::delivery::{ChatId, DeliveryChannel, DeliveryError, ParseMode};
use crate::digest::{compose, Digest, Section, SourceLabel};
use crate::metrics::ensure_metrics_described;
use crate::scheduler::ScheduleEntry;
use crate::source::{build_fetcher, fetch_bounded, FetchError, SourceFetcher, SourceResult};

/// What started a cycle.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Trigger {
    Scheduled(ScheduleEntry),
    Command { requested_by: ChatId },
}

impl Trigger {
    /// Metrics label.
    pub fn kind(&self) -> &'static str {
        match self {
            Trigger::Scheduled(_) => "scheduled",
            Trigger::Command { .. } => "command",
        }
    }
}

impl fmt::Display for Trigger {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Trigger::Scheduled(e) => write!(f, "scheduled {e}"),
            Trigger::Command { requested_by } => write!(f, "command from {requested_by}"),
        }
    }
}

/// Outcome of one cycle run. Lives only as long as the caller keeps it.
#[derive(Debug)]
pub struct CycleReport {
    pub id: u64,
    pub trigger: Trigger,
    pub ok_sections: usize,
    pub failed_sections: usize,
    pub elapsed: Duration,
    pub delivery: Result<(), DeliveryError>,
}

/// The cycle task died before producing a report (panic or runtime shutdown).
#[derive(Debug, thiserror::Error)]
#[error("cycle {id} aborted: {source}")]
pub struct CycleAborted {
    pub id: u64,
    #[source]
    pub source: tokio::task::JoinError,
}

struct RegisteredSource {
    label: SourceLabel,
    fetcher: Arc<dyn SourceFetcher>,
}

pub struct Aggregator {
    sources: Vec<RegisteredSource>,
    delivery: Arc<dyn DeliveryChannel>,
    destination: ChatId,
    fetch_timeout: Duration,
    next_id: AtomicU64,
}

impl Aggregator {
    pub fn new(delivery: Arc<dyn DeliveryChannel>, destination: ChatId, fetch_timeout: Duration) -> Self {
        Self {
            sources: Vec::new(),
            delivery,
            destination,
            fetch_timeout,
            next_id: AtomicU64::new(1),
        }
    }

    /// Register every configured source, in file order.
    pub fn from_settings(
        settings: &Settings,
        client: reqwest::Client,
        delivery: Arc<dyn DeliveryChannel>,
        destination: ChatId,
    ) -> Self {
        settings.sources.iter().fold(
            Self::new(delivery, destination, settings.fetch_timeout()),
            |agg, cfg| agg.with_source(SourceLabel::from(cfg), build_fetcher(cfg, client.clone())),
        )
    }

    /// Append a source; its position is its display position.
    pub fn with_source(mut self, label: SourceLabel, fetcher: Arc<dyn SourceFetcher>) -> Self {
        self.sources.push(RegisteredSource { label, fetcher });
        self
    }

    pub fn source_names(&self) -> Vec<&str> {
        self.sources.iter().map(|s| s.label.name.as_str()).collect()
    }

    pub fn delivery(&self) -> &Arc<dyn DeliveryChannel> {
        &self.delivery
    }

    /// Fetch all sources concurrently and compose. Total latency is bounded
    /// by the fetch timeout, not by the number of sources.
    pub async fn collect(&self) -> Digest {
        let fetches = self
            .sources
            .iter()
            .map(|s| fetch_isolated(s.label.name.clone(), Arc::clone(&s.fetcher), self.fetch_timeout));
        let results = join_all(fetches).await;

        compose(self.sources.iter().map(|s| s.label.clone()).zip(results))
    }

    /// Fetch a single registered source; `None` if the name is unknown.
    pub async fn fetch_section(&self, name: &str) -> Option<Section> {
        let src = self.sources.iter().find(|s| s.label.name == name)?;
        let result = fetch_isolated(src.label.name.clone(), Arc::clone(&src.fetcher), self.fetch_timeout).await;
        Some(Section {
            label: src.label.clone(),
            result,
        })
    }

    /// Run one full fetch-compose-deliver cycle. Delivery is attempted exactly
    /// once, after every source has resolved.
    pub async fn run_cycle(&self, trigger: Trigger) -> CycleReport {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        self.run_cycle_with_id(id, trigger).await
    }

    /// Like [`run_cycle`](Self::run_cycle) but on its own task, so a panic in
    /// a fetcher or the channel is reported instead of unwinding the caller.
    pub async fn run_isolated(self: &Arc<Self>, trigger: Trigger) -> Result<CycleReport, CycleAborted> {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let this = Arc::clone(self);
        tokio::spawn(async move { this.run_cycle_with_id(id, trigger).await })
            .await
            .map_err(|source| CycleAborted { id, source })
    }

    async fn run_cycle_with_id(&self, id: u64, trigger: Trigger) -> CycleReport {
        ensure_metrics_described();
        let span = tracing::info_span!("cycle", cycle_id = id, trigger = %trigger);

        async move {
            let t0 = Instant::now();
            counter!("digest_cycles_total", "trigger" => trigger.kind()).increment(1);

            let digest = self.collect().await;
            let text = digest.render();

            let delivery = self
                .delivery
                .send(&self.destination, &text, ParseMode::Markdown)
                .await;

            let elapsed = t0.elapsed();
            histogram!("digest_cycle_ms").record(elapsed.as_secs_f64() * 1_000.0);
            gauge!("digest_last_cycle_ts").set(chrono::Utc::now().timestamp() as f64);

            match &delivery {
                Ok(()) => info!(
                    ok = digest.ok_count(),
                    failed = digest.failed_count(),
                    elapsed_ms = elapsed.as_millis() as u64,
                    channel = self.delivery.channel_name(),
                    "digest delivered"
                ),
                Err(e) => {
                    counter!("digest_delivery_failures_total", "trigger" => trigger.kind())
                        .increment(1);
                    warn!(
                        error = %e,
                        channel = self.delivery.channel_name(),
                        "digest composed but delivery failed"
                    );
                }
            }

            CycleReport {
                id,
                trigger,
                ok_sections: digest.ok_count(),
                failed_sections: digest.failed_count(),
                elapsed,
                delivery,
            }
        }
        .instrument(span)
        .await
    }
}

/// One fetch on its own task: a slow, failing or panicking source degrades
/// only its own section.
async fn fetch_isolated(name: String, fetcher: Arc<dyn SourceFetcher>, limit: Duration) -> SourceResult {
    let kind = fetcher.kind();
    let res = tokio::spawn(async move { fetch_bounded(fetcher.as_ref(), limit).await })
        .await
        .unwrap_or_else(|e| Err(FetchError::BadResponse(format!("fetcher task failed: {e}"))));

    match &res {
        Ok(items) => tracing::debug!(source = %name, kind, items = items.len(), "source fetched"),
        Err(e) => {
            counter!("digest_source_failures_total", "source" => name.clone(), "reason" => e.reason())
                .increment(1);
            warn!(source = %name, kind, error = %e, "source failed; placeholder used");
        }
    }
    res
}
