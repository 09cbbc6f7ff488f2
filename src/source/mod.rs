// src/source/mod.rs
//! # Sources
//! One fetcher per external endpoint. Every variant resolves to the same
//! shape: `Ok(items)` or `Err(FetchError)`; markup and JSON handling stay
//! private to the variant.

pub mod html_table;
pub mod json_price;
pub mod rss;

use std::sync::Arc;
use std::time::Duration;

use once_cell::sync::OnceCell;
use regex::Regex;
use reqwest::header::USER_AGENT;

use crate::config::{SourceConfig, SourceKind};

/// Some price sites refuse requests without a browser-looking agent.
pub const BROWSER_USER_AGENT: &str = "Mozilla/5.0";

/// One entry of a source's content.
#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize)]
pub enum Item {
    /// Feed entry (news, real-estate).
    Headline { title: String, link: String },
    /// Price row: label plus buy/sell quotes exactly as published.
    Quote {
        label: String,
        buy: String,
        sell: String,
    },
}

impl Item {
    pub fn headline(title: impl Into<String>, link: impl Into<String>) -> Self {
        Item::Headline {
            title: title.into(),
            link: link.into(),
        }
    }

    pub fn quote(label: impl Into<String>, buy: impl Into<String>, sell: impl Into<String>) -> Self {
        Item::Quote {
            label: label.into(),
            buy: buy.into(),
            sell: sell.into(),
        }
    }
}

/// Why a fetch produced no content.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum FetchError {
    #[error("timed out")]
    Timeout,
    #[error("bad response: {0}")]
    BadResponse(String),
    #[error("malformed payload: {0}")]
    Parse(String),
}

impl FetchError {
    /// Stable label for logs and the `reason` metrics dimension.
    pub fn reason(&self) -> &'static str {
        match self {
            FetchError::Timeout => "timeout",
            FetchError::BadResponse(_) => "bad_response",
            FetchError::Parse(_) => "parse",
        }
    }
}

impl From<reqwest::Error> for FetchError {
    fn from(e: reqwest::Error) -> Self {
        if e.is_timeout() {
            FetchError::Timeout
        } else if e.is_decode() {
            FetchError::Parse(e.to_string())
        } else {
            FetchError::BadResponse(e.to_string())
        }
    }
}

/// Outcome of a single fetch attempt.
pub type SourceResult = Result<Vec<Item>, FetchError>;

#[async_trait::async_trait]
pub trait SourceFetcher: Send + Sync {
    async fn fetch(&self) -> SourceResult;
    /// Variant name, e.g. "rss".
    fn kind(&self) -> &'static str;
}

/// Run `fetcher` with an upper bound on wall time. Never panics into the
/// caller's timeline; elapsed bound folds into `FetchError::Timeout`.
pub async fn fetch_bounded(fetcher: &dyn SourceFetcher, limit: Duration) -> SourceResult {
    match tokio::time::timeout(limit, fetcher.fetch()).await {
        Ok(res) => res,
        Err(_) => Err(FetchError::Timeout),
    }
}

/// GET `url` and return the body, rejecting non-2xx statuses.
pub(crate) async fn get_text(client: &reqwest::Client, url: &str) -> Result<String, FetchError> {
    let resp = client
        .get(url)
        .header(USER_AGENT, BROWSER_USER_AGENT)
        .send()
        .await?;
    let status = resp.status();
    if !status.is_success() {
        return Err(FetchError::BadResponse(format!("HTTP {status}")));
    }
    Ok(resp.text().await?)
}

/// Build the fetcher variant named by `cfg.kind`.
pub fn build_fetcher(cfg: &SourceConfig, client: reqwest::Client) -> Arc<dyn SourceFetcher> {
    match &cfg.kind {
        SourceKind::Rss { url, limit } => Arc::new(rss::RssFetcher::from_url(url, *limit, client)),
        SourceKind::JsonPrice {
            url,
            path,
            label,
            buy_field,
            sell_field,
        } => Arc::new(
            json_price::JsonPriceFetcher::from_url(url, client)
                .with_path(path.clone())
                .with_label(label)
                .with_fields(buy_field, sell_field),
        ),
        SourceKind::HtmlTable {
            url,
            table_class,
            rows,
        } => Arc::new(
            html_table::HtmlTableFetcher::from_url(url, client)
                .with_table_class(table_class)
                .with_rows(*rows),
        ),
    }
}

/// Decode entities, strip tags and collapse whitespace.
pub fn normalize_text(s: &str) -> String {
    // 1) HTML entity decode
    let out = html_escape::decode_html_entities(s).to_string();

    // 2) Strip HTML tags
    static RE_TAGS: OnceCell<Regex> = OnceCell::new();
    let re_tags = RE_TAGS.get_or_init(|| Regex::new(r"(?is)</?[^>]+>").unwrap());
    let out = re_tags.replace_all(&out, " ");

    // 3) Collapse whitespace (nbsp included)
    static RE_WS: OnceCell<Regex> = OnceCell::new();
    let re_ws = RE_WS.get_or_init(|| Regex::new(r"[\s\u{00A0}]+").unwrap());
    let mut out = re_ws.replace_all(&out, " ").trim().to_string();

    // 4) Length cap: 500 chars
    if out.chars().count() > 500 {
        out = out.chars().take(500).collect();
    }

    out
}
