// src/digest.rs
//! # Digest
//! Pure composition of per-source results into one deliverable message.
//! Section order is the order the results are handed in (registration order),
//! never completion order. A failed source keeps its section and shows a
//! placeholder; an empty source shows its "no content" text.

use crate::config::SourceConfig;
use crate::source::{Item, SourceResult};

/// Substitute text for a source that could not be fetched.
pub const FAILED_PLACEHOLDER: &str = "❌ Source unavailable right now.";
pub const DEFAULT_EMPTY_TEXT: &str = "No new content.";
/// Body used when no sources are registered at all.
pub const NO_SOURCES_TEXT: &str = "No sources configured.";

/// Presentation attributes of one source.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SourceLabel {
    pub name: String,
    pub heading: String,
    pub marker: String,
    pub empty_text: String,
}

impl SourceLabel {
    /// Label whose heading is the bare source name.
    pub fn plain(name: &str) -> Self {
        Self {
            name: name.to_string(),
            heading: name.to_string(),
            marker: "📌".to_string(),
            empty_text: DEFAULT_EMPTY_TEXT.to_string(),
        }
    }
}

impl From<&SourceConfig> for SourceLabel {
    fn from(cfg: &SourceConfig) -> Self {
        Self {
            name: cfg.name.clone(),
            heading: cfg.heading.clone(),
            marker: cfg.marker.clone(),
            empty_text: cfg
                .empty_text
                .clone()
                .unwrap_or_else(|| DEFAULT_EMPTY_TEXT.to_string()),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Section {
    pub label: SourceLabel,
    pub result: SourceResult,
}

impl Section {
    pub fn is_failed(&self) -> bool {
        self.result.is_err()
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct Digest {
    pub sections: Vec<Section>,
}

impl Digest {
    pub fn failed_count(&self) -> usize {
        self.sections.iter().filter(|s| s.is_failed()).count()
    }

    pub fn ok_count(&self) -> usize {
        self.sections.len() - self.failed_count()
    }

    /// Markdown text ready for the delivery channel.
    pub fn render(&self) -> String {
        if self.sections.is_empty() {
            return NO_SOURCES_TEXT.to_string();
        }
        self.sections
            .iter()
            .map(render_section)
            .collect::<Vec<_>>()
            .join("\n\n")
    }
}

/// Build a digest from results in registration order. Never fails.
pub fn compose<I>(results: I) -> Digest
where
    I: IntoIterator<Item = (SourceLabel, SourceResult)>,
{
    Digest {
        sections: results
            .into_iter()
            .map(|(label, result)| Section { label, result })
            .collect(),
    }
}

/// Heading line followed by the section body.
pub fn render_section(section: &Section) -> String {
    let body = match &section.result {
        Err(_) => FAILED_PLACEHOLDER.to_string(),
        Ok(items) if items.is_empty() => section.label.empty_text.clone(),
        Ok(items) => items
            .iter()
            .map(|it| render_item(it, &section.label.marker))
            .collect::<Vec<_>>()
            .join("\n\n"),
    };
    format!("{}\n{}", section.label.heading, body)
}

fn render_item(item: &Item, marker: &str) -> String {
    match item {
        Item::Headline { title, link } => {
            format!("{marker} {}\n🔗 {}", escape_markdown(title), escape_markdown(link))
        }
        Item::Quote { label, buy, sell } => format!(
            "🏙 **{}**\n💰 Buy: {} | Sell: {}",
            escape_markdown(label),
            escape_markdown(buy),
            escape_markdown(sell)
        ),
    }
}

/// Escape the characters that legacy Telegram Markdown treats as entity
/// delimiters, so scraped text cannot break the message.
pub fn escape_markdown(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    for ch in text.chars() {
        if matches!(ch, '_' | '*' | '`' | '[') {
            out.push('\\');
        }
        out.push(ch);
    }
    out
}
