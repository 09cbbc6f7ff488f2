// src/source/html_table.rs
use async_trait::async_trait;
use once_cell::sync::OnceCell;
use regex::Regex;

use crate::source::{get_text, normalize_text, FetchError, Item, SourceFetcher, SourceResult};

pub const DEFAULT_TABLE_CLASS: &str = "table-responsive";
pub const DEFAULT_ROWS: usize = 3;

/// Price source scraped from an HTML table: the first `<table>` carrying
/// `table_class`, header row skipped, next `rows` rows as `label | buy | sell`.
pub struct HtmlTableFetcher {
    mode: Mode,
    table_class: String,
    rows: usize,
}

enum Mode {
    Fixture(String),
    Http { url: String, client: reqwest::Client },
}

fn re_table() -> &'static Regex {
    static RE: OnceCell<Regex> = OnceCell::new();
    RE.get_or_init(|| Regex::new(r"(?is)<table\b([^>]*)>(.*?)</table\s*>").unwrap())
}

fn re_class() -> &'static Regex {
    static RE: OnceCell<Regex> = OnceCell::new();
    RE.get_or_init(|| Regex::new(r#"(?is)\bclass\s*=\s*(?:"([^"]*)"|'([^']*)')"#).unwrap())
}

fn re_row() -> &'static Regex {
    static RE: OnceCell<Regex> = OnceCell::new();
    RE.get_or_init(|| Regex::new(r"(?is)<tr\b[^>]*>(.*?)</tr\s*>").unwrap())
}

fn re_cell() -> &'static Regex {
    static RE: OnceCell<Regex> = OnceCell::new();
    RE.get_or_init(|| Regex::new(r"(?is)<td\b[^>]*>(.*?)</td\s*>").unwrap())
}

impl HtmlTableFetcher {
    pub fn from_fixture_str(html: &str) -> Self {
        Self {
            mode: Mode::Fixture(html.to_string()),
            table_class: DEFAULT_TABLE_CLASS.to_string(),
            rows: DEFAULT_ROWS,
        }
    }

    pub fn from_url(url: &str, client: reqwest::Client) -> Self {
        Self {
            mode: Mode::Http {
                url: url.to_string(),
                client,
            },
            table_class: DEFAULT_TABLE_CLASS.to_string(),
            rows: DEFAULT_ROWS,
        }
    }

    pub fn with_table_class(mut self, class: &str) -> Self {
        self.table_class = class.to_string();
        self
    }

    pub fn with_rows(mut self, rows: usize) -> Self {
        self.rows = rows;
        self
    }

    fn has_class(&self, attrs: &str) -> bool {
        re_class().captures_iter(attrs).any(|c| {
            c.get(1)
                .or_else(|| c.get(2))
                .is_some_and(|m| m.as_str().split_whitespace().any(|cls| cls == self.table_class))
        })
    }

    fn parse(&self, html: &str) -> SourceResult {
        let table = re_table()
            .captures_iter(html)
            .find(|c| self.has_class(c.get(1).map_or("", |m| m.as_str())))
            .and_then(|c| c.get(2))
            .ok_or_else(|| FetchError::Parse(format!("no table.{}", self.table_class)))?;

        let mut out = Vec::with_capacity(self.rows);
        for row in re_row().captures_iter(table.as_str()).skip(1).take(self.rows) {
            let cells: Vec<String> = re_cell()
                .captures_iter(&row[1])
                .map(|c| normalize_text(&c[1]))
                .collect();
            // Short rows (spacers, banners) are skipped, not errors.
            if cells.len() < 3 {
                continue;
            }
            out.push(Item::Quote {
                label: cells[0].clone(),
                buy: cells[1].clone(),
                sell: cells[2].clone(),
            });
        }
        Ok(out)
    }
}

#[async_trait]
impl SourceFetcher for HtmlTableFetcher {
    async fn fetch(&self) -> SourceResult {
        match &self.mode {
            Mode::Fixture(s) => self.parse(s),
            Mode::Http { url, client } => {
                let body = get_text(client, url).await?;
                self.parse(&body)
            }
        }
    }

    fn kind(&self) -> &'static str {
        "html_table"
    }
}
