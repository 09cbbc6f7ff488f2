// src/source/json_price.rs
use async_trait::async_trait;
use serde_json::Value;

use crate::source::{get_text, FetchError, Item, SourceFetcher, SourceResult};

/// Price source backed by a JSON API: walk `path`, then read the buy/sell
/// fields of the object found there.
pub struct JsonPriceFetcher {
    mode: Mode,
    path: Vec<String>,
    label: String,
    buy_field: String,
    sell_field: String,
}

enum Mode {
    Fixture(String),
    Http { url: String, client: reqwest::Client },
}

impl JsonPriceFetcher {
    pub fn from_fixture_str(body: &str) -> Self {
        Self::with_mode(Mode::Fixture(body.to_string()))
    }

    pub fn from_url(url: &str, client: reqwest::Client) -> Self {
        Self::with_mode(Mode::Http {
            url: url.to_string(),
            client,
        })
    }

    fn with_mode(mode: Mode) -> Self {
        Self {
            mode,
            path: Vec::new(),
            label: String::new(),
            buy_field: "buy".to_string(),
            sell_field: "sell".to_string(),
        }
    }

    pub fn with_path(mut self, path: Vec<String>) -> Self {
        self.path = path;
        self
    }

    pub fn with_label(mut self, label: &str) -> Self {
        self.label = label.to_string();
        self
    }

    pub fn with_fields(mut self, buy: &str, sell: &str) -> Self {
        self.buy_field = buy.to_string();
        self.sell_field = sell.to_string();
        self
    }

    fn parse(&self, body: &str) -> SourceResult {
        let root: Value =
            serde_json::from_str(body).map_err(|e| FetchError::Parse(format!("json: {e}")))?;

        let mut node = &root;
        for (depth, key) in self.path.iter().enumerate() {
            node = node.get(key).ok_or_else(|| {
                FetchError::Parse(format!("missing `{}`", self.path[..=depth].join(".")))
            })?;
        }

        let buy = price_field(node, &self.buy_field)?;
        let sell = price_field(node, &self.sell_field)?;
        Ok(vec![Item::Quote {
            label: self.label.clone(),
            buy,
            sell,
        }])
    }
}

/// Quotes come back as strings ("82,500") or bare numbers depending on the day.
fn price_field(node: &Value, field: &str) -> Result<String, FetchError> {
    match node.get(field) {
        Some(Value::String(s)) if !s.trim().is_empty() => Ok(s.trim().to_string()),
        Some(Value::Number(n)) => Ok(n.to_string()),
        Some(_) => Err(FetchError::Parse(format!("`{field}` is not a price"))),
        None => Err(FetchError::Parse(format!("missing `{field}`"))),
    }
}

#[async_trait]
impl SourceFetcher for JsonPriceFetcher {
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
        "json_price"
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sjc(body: &str) -> JsonPriceFetcher {
        JsonPriceFetcher::from_fixture_str(body)
            .with_path(vec![
                "GiaVang".into(),
                "data".into(),
                "SJC".into(),
                "Hồ Chí Minh".into(),
            ])
            .with_label("SJC HCM")
    }

    #[tokio::test]
    async fn reads_nested_quote() {
        let body = r#"{"GiaVang":{"data":{"SJC":{"Hồ Chí Minh":{"buy":"82,500","sell":"84,500"}}}}}"#;
        let items = sjc(body).fetch().await.unwrap();
        assert_eq!(items, vec![Item::quote("SJC HCM", "82,500", "84,500")]);
    }

    #[tokio::test]
    async fn numeric_prices_are_accepted() {
        let body = r#"{"GiaVang":{"data":{"SJC":{"Hồ Chí Minh":{"buy":82500,"sell":84500}}}}}"#;
        let items = sjc(body).fetch().await.unwrap();
        assert_eq!(items, vec![Item::quote("SJC HCM", "82500", "84500")]);
    }

    #[tokio::test]
    async fn missing_path_names_the_gap() {
        let body = r#"{"GiaVang":{"data":{}}}"#;
        let err = sjc(body).fetch().await.unwrap_err();
        assert_eq!(err, FetchError::Parse("missing `GiaVang.data.SJC`".into()));
    }

    #[tokio::test]
    async fn missing_field_is_a_parse_error() {
        let body = r#"{"GiaVang":{"data":{"SJC":{"Hồ Chí Minh":{"buy":"1"}}}}}"#;
        let err = sjc(body).fetch().await.unwrap_err();
        assert_eq!(err, FetchError::Parse("missing `sell`".into()));
    }

    #[tokio::test]
    async fn non_json_is_a_parse_error() {
        let err = sjc("<html/>").fetch().await.unwrap_err();
        assert_eq!(err.reason(), "parse");
    }
}
