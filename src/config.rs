// src/config.rs
//! Process configuration, loaded once at startup.
//!
//! Credentials come from the environment (`TELEGRAM_BOT_TOKEN` or `TOKEN`,
//! plus `CHAT_ID`). Everything else comes from an optional TOML/JSON file:
//! 1) `$DIGEST_CONFIG_PATH`
//! 2) `config/digest.toml`
//! 3) `config/digest.json`
//! 4) built-in defaults

use anyhow::{anyhow, bail, Context, Result};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::fs;
use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::scheduler::ScheduleEntry;
use crate::source::{html_table, rss};

pub const ENV_CONFIG_PATH: &str = "DIGEST_CONFIG_PATH";
pub const ENV_TOKEN: &str = "TELEGRAM_BOT_TOKEN";
pub const ENV_TOKEN_LEGACY: &str = "TOKEN";
pub const ENV_CHAT_ID: &str = "CHAT_ID";
pub const ENV_METRICS_ADDR: &str = "METRICS_ADDR";

/// Schedule entries have minute precision; a slower tick could step over one.
pub const MAX_TICK_SECS: u64 = 60;

/// Bot credential and delivery destination.
#[derive(Clone)]
pub struct Credentials {
    pub token: String,
    pub chat_id: String,
}

// Hand-written so the token never ends up in a log line.
impl std::fmt::Debug for Credentials {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Credentials")
            .field("token_len", &self.token.len())
            .field("chat_id", &self.chat_id)
            .finish()
    }
}

impl Credentials {
    pub fn from_env() -> Result<Self> {
        let token = std::env::var(ENV_TOKEN)
            .or_else(|_| std::env::var(ENV_TOKEN_LEGACY))
            .map_err(|_| anyhow!("missing {ENV_TOKEN} (or {ENV_TOKEN_LEGACY}) env var"))?;
        let chat_id =
            std::env::var(ENV_CHAT_ID).map_err(|_| anyhow!("missing {ENV_CHAT_ID} env var"))?;

        let token = token.trim().to_string();
        let chat_id = chat_id.trim().to_string();
        if token.is_empty() {
            bail!("bot token must not be empty");
        }
        if chat_id.is_empty() {
            bail!("{ENV_CHAT_ID} must not be empty");
        }
        Ok(Self { token, chat_id })
    }
}

fn default_tick_secs() -> u64 {
    60
}
fn default_fetch_timeout_secs() -> u64 {
    15
}
fn default_status_source() -> String {
    "gold".to_string()
}
fn default_marker() -> String {
    "📌".to_string()
}
fn default_feed_limit() -> usize {
    rss::DEFAULT_FEED_LIMIT
}
fn default_buy_field() -> String {
    "buy".to_string()
}
fn default_sell_field() -> String {
    "sell".to_string()
}
fn default_table_class() -> String {
    html_table::DEFAULT_TABLE_CLASS.to_string()
}
fn default_table_rows() -> usize {
    html_table::DEFAULT_ROWS
}

/// One registered source. Registration order is display order.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SourceConfig {
    pub name: String,
    pub heading: String,
    /// Leading symbol for headline items.
    #[serde(default = "default_marker")]
    pub marker: String,
    /// Shown when the source answered with zero items.
    #[serde(default)]
    pub empty_text: Option<String>,
    #[serde(flatten)]
    pub kind: SourceKind,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum SourceKind {
    Rss {
        url: String,
        #[serde(default = "default_feed_limit")]
        limit: usize,
    },
    JsonPrice {
        url: String,
        path: Vec<String>,
        label: String,
        #[serde(default = "default_buy_field")]
        buy_field: String,
        #[serde(default = "default_sell_field")]
        sell_field: String,
    },
    HtmlTable {
        url: String,
        #[serde(default = "default_table_class")]
        table_class: String,
        #[serde(default = "default_table_rows")]
        rows: usize,
    },
}

impl SourceKind {
    pub fn url(&self) -> &str {
        match self {
            SourceKind::Rss { url, .. }
            | SourceKind::JsonPrice { url, .. }
            | SourceKind::HtmlTable { url, .. } => url,
        }
    }
}

/// File-backed settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Settings {
    #[serde(default = "default_schedule")]
    pub schedule: Vec<ScheduleEntry>,
    #[serde(default = "default_tick_secs")]
    pub tick_secs: u64,
    #[serde(default = "default_fetch_timeout_secs")]
    pub fetch_timeout_secs: u64,
    /// Source answered by the status command.
    #[serde(default = "default_status_source")]
    pub status_source: String,
    #[serde(default = "default_sources")]
    pub sources: Vec<SourceConfig>,
    #[serde(default)]
    pub metrics_addr: Option<String>,
}

fn default_schedule() -> Vec<ScheduleEntry> {
    ["08:00", "09:00", "18:00"]
        .iter()
        .filter_map(|s| s.parse().ok())
        .collect()
}

fn default_sources() -> Vec<SourceConfig> {
    vec![
        SourceConfig {
            name: "news".into(),
            heading: "📰 **Today's news:**".into(),
            marker: "📌".into(),
            empty_text: Some("No new articles.".into()),
            kind: SourceKind::Rss {
                url: "https://dantri.com.vn/rss/home.rss".into(),
                limit: rss::DEFAULT_FEED_LIMIT,
            },
        },
        SourceConfig {
            name: "gold".into(),
            heading: "📢 **Gold prices today:**".into(),
            marker: default_marker(),
            empty_text: Some("No gold prices published.".into()),
            kind: SourceKind::JsonPrice {
                url: "https://www.doji.vn/api/data".into(),
                path: vec![
                    "GiaVang".into(),
                    "data".into(),
                    "SJC".into(),
                    "Hồ Chí Minh".into(),
                ],
                label: "SJC HCM".into(),
                buy_field: default_buy_field(),
                sell_field: default_sell_field(),
            },
        },
        SourceConfig {
            name: "land".into(),
            heading: "🏡 **Real-estate news:**".into(),
            marker: "🏡".into(),
            empty_text: Some("No new real-estate articles.".into()),
            kind: SourceKind::Rss {
                url: "https://dantri.com.vn/rss/bat-dong-san.rss".into(),
                limit: rss::DEFAULT_FEED_LIMIT,
            },
        },
    ]
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            schedule: default_schedule(),
            tick_secs: default_tick_secs(),
            fetch_timeout_secs: default_fetch_timeout_secs(),
            status_source: default_status_source(),
            sources: default_sources(),
            metrics_addr: None,
        }
    }
}

impl Settings {
    pub fn tick(&self) -> Duration {
        Duration::from_secs(self.tick_secs)
    }

    pub fn fetch_timeout(&self) -> Duration {
        Duration::from_secs(self.fetch_timeout_secs)
    }

    pub fn validate(&self) -> Result<()> {
        if !(1..=MAX_TICK_SECS).contains(&self.tick_secs) {
            bail!("tick_secs must be between 1 and {MAX_TICK_SECS}");
        }
        if self.fetch_timeout_secs == 0 {
            bail!("fetch_timeout_secs must be at least 1");
        }
        let mut seen = HashSet::new();
        for s in &self.sources {
            if s.name.trim().is_empty() {
                bail!("source name must not be empty");
            }
            if !seen.insert(s.name.as_str()) {
                bail!("duplicate source name `{}`", s.name);
            }
            if s.kind.url().trim().is_empty() {
                bail!("source `{}` has an empty url", s.name);
            }
        }
        if !seen.contains(self.status_source.as_str()) {
            bail!(
                "status_source `{}` is not a registered source",
                self.status_source
            );
        }
        if let Some(addr) = &self.metrics_addr {
            addr.parse::<SocketAddr>()
                .with_context(|| format!("invalid metrics_addr `{addr}`"))?;
        }
        Ok(())
    }

    /// `METRICS_ADDR` wins over the file value.
    pub fn apply_env_overrides(&mut self) {
        if let Ok(addr) = std::env::var(ENV_METRICS_ADDR) {
            let addr = addr.trim();
            if !addr.is_empty() {
                self.metrics_addr = Some(addr.to_string());
            }
        }
    }
}

/// Load and validate settings from an explicit path. Supports TOML or JSON formats.
pub fn load_settings_from(path: &Path) -> Result<Settings> {
    let settings = read_settings(path)?;
    settings.validate()?;
    Ok(settings)
}

fn read_settings(path: &Path) -> Result<Settings> {
    let content = fs::read_to_string(path)
        .with_context(|| format!("reading settings from {}", path.display()))?;
    let ext = path
        .extension()
        .and_then(|s| s.to_str())
        .unwrap_or_default()
        .to_ascii_lowercase();
    parse_settings(&content, ext.as_str())
        .with_context(|| format!("parsing settings from {}", path.display()))
}

/// Load settings using env var + fallbacks (see module docs). Validation runs
/// once, after env overrides are applied.
pub fn load_settings_default() -> Result<Settings> {
    let mut settings = match locate_settings_file()? {
        Some(path) => {
            tracing::info!(path = %path.display(), "loading settings file");
            read_settings(&path)?
        }
        None => {
            tracing::info!("no settings file found, using built-in defaults");
            Settings::default()
        }
    };
    settings.apply_env_overrides();
    settings.validate()?;
    Ok(settings)
}

fn locate_settings_file() -> Result<Option<PathBuf>> {
    if let Ok(p) = std::env::var(ENV_CONFIG_PATH) {
        let pb = PathBuf::from(p);
        if pb.exists() {
            return Ok(Some(pb));
        }
        bail!("{ENV_CONFIG_PATH} points to non-existent path");
    }
    for candidate in ["config/digest.toml", "config/digest.json"] {
        let pb = PathBuf::from(candidate);
        if pb.exists() {
            return Ok(Some(pb));
        }
    }
    Ok(None)
}

fn parse_settings(s: &str, hint_ext: &str) -> Result<Settings> {
    match hint_ext {
        "toml" => Ok(toml::from_str(s)?),
        "json" => Ok(serde_json::from_str(s)?),
        _ => serde_json::from_str(s)
            .or_else(|_| toml::from_str(s))
            .context("settings are neither JSON nor valid TOML"),
    }
}
