// src/source/rss.rs
use async_trait::async_trait;
use quick_xml::de::from_str;
use serde::Deserialize;

use crate::source::{get_text, normalize_text, FetchError, Item, SourceFetcher, SourceResult};

/// Number of feed entries kept when the config does not say otherwise.
pub const DEFAULT_FEED_LIMIT: usize = 5;

#[derive(Debug, Deserialize)]
struct Rss {
    channel: Channel,
}

#[derive(Debug, Deserialize)]
struct Channel {
    #[serde(rename = "item", default)]
    item: Vec<RawItem>,
}

#[derive(Debug, Deserialize)]
struct RawItem {
    title: Option<String>,
    link: Option<String>,
}

/// Feed-based source: first `limit` entries of an RSS 2.0 channel.
pub struct RssFetcher {
    mode: Mode,
    limit: usize,
}

enum Mode {
    Fixture(String),
    Http { url: String, client: reqwest::Client },
}

impl RssFetcher {
    /// Serve a fixed XML document; used by tests and offline runs.
    pub fn from_fixture_str(xml: &str) -> Self {
        Self {
            mode: Mode::Fixture(xml.to_string()),
            limit: DEFAULT_FEED_LIMIT,
        }
    }

    pub fn from_url(url: &str, limit: usize, client: reqwest::Client) -> Self {
        Self {
            mode: Mode::Http {
                url: url.to_string(),
                client,
            },
            limit,
        }
    }

    pub fn with_limit(mut self, limit: usize) -> Self {
        self.limit = limit;
        self
    }

    fn parse_items_from_str(&self, s: &str) -> SourceResult {
        let xml_clean = scrub_html_entities_for_xml(s);
        let rss: Rss = from_str(&xml_clean).map_err(|e| FetchError::Parse(format!("rss: {e}")))?;

        let mut out = Vec::with_capacity(self.limit.min(rss.channel.item.len()));
        for it in rss.channel.item {
            if out.len() == self.limit {
                break;
            }
            let title = normalize_text(it.title.as_deref().unwrap_or_default());
            let link = it.link.as_deref().unwrap_or_default().trim().to_string();
            // Entries without a title carry nothing worth showing.
            if title.is_empty() {
                continue;
            }
            out.push(Item::Headline { title, link });
        }
        Ok(out)
    }
}

#[async_trait]
impl SourceFetcher for RssFetcher {
    async fn fetch(&self) -> SourceResult {
        match &self.mode {
            Mode::Fixture(s) => self.parse_items_from_str(s),
            Mode::Http { url, client } => {
                let body = get_text(client, url).await.inspect_err(|e| {
                    tracing::debug!(error = %e, url = %url, "rss http error");
                })?;
                self.parse_items_from_str(&body)
            }
        }
    }

    fn kind(&self) -> &'static str {
        "rss"
    }
}

/// Feeds routinely leak HTML-only entities that XML parsers reject.
fn scrub_html_entities_for_xml(s: &str) -> String {
    s.replace("&nbsp;", " ")
        .replace("&ndash;", "-")
        .replace("&mdash;", "-")
        .replace("&ldquo;", "\"")
        .replace("&rdquo;", "\"")
        .replace("&lsquo;", "'")
        .replace("&rsquo;", "'")
}
