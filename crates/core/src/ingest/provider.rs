use crate::config::ProviderSettings;
use crate::domain::payload::{Profile, Quote};
use crate::ingest::types::{ListResponse, TrendRow, UpgradeRow};
use anyhow::{Context, Result};
use reqwest::header::{HeaderMap, HeaderValue};
use reqwest::StatusCode;
use serde::de::DeserializeOwned;
use serde_json::Value;
use std::time::Duration;

const DEFAULT_TIMEOUT_SECS: u64 = 10;
const QUOTE_PATH: &str = "/v1/quote";
const PROFILE_PATH: &str = "/v1/profile";
const TREND_PATH: &str = "/v1/recommendation-trend";
const UPGRADES_PATH: &str = "/v1/upgrade-history";

/// Narrow interface to one upstream market-data provider. Each call fails independently.
#[async_trait::async_trait]
pub trait MarketDataProvider: Send + Sync {
    fn provider_name(&self) -> &str;

    async fn fetch_quote(&self, symbol: &str) -> Result<Quote>;

    async fn fetch_profile(&self, symbol: &str) -> Result<Profile>;

    async fn fetch_recommendation_trend(&self, symbol: &str) -> Result<Vec<TrendRow>>;

    async fn fetch_upgrade_history(&self, symbol: &str) -> Result<Vec<UpgradeRow>>;
}

#[derive(Debug, Clone)]
pub struct HttpJsonProvider {
    http: reqwest::Client,
    name: String,
    base_url: String,
    api_key: Option<String>,
    retries: u32,
}

impl HttpJsonProvider {
    pub fn from_settings(settings: &ProviderSettings, retries: u32) -> Result<Self> {
        let base_url = settings
            .base_url
            .clone()
            .filter(|s| !s.trim().is_empty())
            .with_context(|| format!("base URL for provider {} is required", settings.name))?;

        // Per-call deadlines are enforced by the orchestrator; this only stops a hung socket.
        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(DEFAULT_TIMEOUT_SECS))
            .build()
            .context("failed to build provider http client")?;

        Ok(Self {
            http,
            name: settings.name.clone(),
            base_url,
            api_key: settings.api_key.clone(),
            retries: retries.max(1),
        })
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url.trim_end_matches('/'), path)
    }

    fn headers(&self) -> Result<HeaderMap> {
        let mut headers = HeaderMap::new();
        if let Some(api_key) = &self.api_key {
            headers.insert("x-api-key", HeaderValue::from_str(api_key)?);
        }
        Ok(headers)
    }

    async fn fetch_once<T: DeserializeOwned>(&self, path: &str, symbol: &str) -> Result<FetchOutcome<T>> {
        let res = self
            .http
            .get(self.url(path))
            .headers(self.headers()?)
            .query(&[("symbol", symbol)])
            .send()
            .await
            .with_context(|| format!("{} request to {path} failed", self.name))?;

        let status = res.status();
        let text = res
            .text()
            .await
            .context("failed to read provider response")?;

        if !status.is_success() {
            let retryable = status == StatusCode::TOO_MANY_REQUESTS || status.is_server_error();
            let err = anyhow::anyhow!("{} HTTP {status} on {path}: {text}", self.name);
            return Ok(if retryable {
                FetchOutcome::Retry(err)
            } else {
                FetchOutcome::Fatal(err)
            });
        }

        let raw_json = serde_json::from_str::<Value>(&text)
            .with_context(|| format!("provider response is not valid JSON: {text}"))?;
        let parsed = serde_json::from_value::<T>(raw_json)
            .with_context(|| format!("failed to parse {} response from {path}", self.name))?;
        Ok(FetchOutcome::Done(parsed))
    }

    async fn fetch_json<T: DeserializeOwned>(&self, path: &str, symbol: &str) -> Result<T> {
        let mut attempt: u32 = 0;
        loop {
            attempt += 1;
            let err = match self.fetch_once::<T>(path, symbol).await {
                Ok(FetchOutcome::Done(parsed)) => return Ok(parsed),
                Ok(FetchOutcome::Fatal(err)) => return Err(err),
                Ok(FetchOutcome::Retry(err)) | Err(err) => err,
            };
            if attempt >= self.retries {
                return Err(err);
            }
            let backoff = Duration::from_millis(250 << (attempt - 1));
            tracing::warn!(
                provider = %self.name,
                path,
                symbol,
                attempt,
                ?backoff,
                error = %err,
                "provider fetch failed; retrying"
            );
            tokio::time::sleep(backoff).await;
        }
    }

    async fn fetch_list<T: DeserializeOwned>(&self, path: &str, symbol: &str) -> Result<Vec<T>> {
        let resp: ListResponse<T> = self.fetch_json(path, symbol).await?;
        validate_symbol(&resp.symbol, symbol)?;
        Ok(resp.items)
    }
}

enum FetchOutcome<T> {
    Done(T),
    Retry(anyhow::Error),
    Fatal(anyhow::Error),
}

#[async_trait::async_trait]
impl MarketDataProvider for HttpJsonProvider {
    fn provider_name(&self) -> &str {
        &self.name
    }

    async fn fetch_quote(&self, symbol: &str) -> Result<Quote> {
        let quote: Quote = self.fetch_json(QUOTE_PATH, symbol).await?;
        validate_symbol(&quote.symbol, symbol)?;
        validate_quote(&quote)?;
        Ok(quote)
    }

    async fn fetch_profile(&self, symbol: &str) -> Result<Profile> {
        self.fetch_json(PROFILE_PATH, symbol).await
    }

    async fn fetch_recommendation_trend(&self, symbol: &str) -> Result<Vec<TrendRow>> {
        self.fetch_list(TREND_PATH, symbol).await
    }

    async fn fetch_upgrade_history(&self, symbol: &str) -> Result<Vec<UpgradeRow>> {
        let rows: Vec<UpgradeRow> = self.fetch_list(UPGRADES_PATH, symbol).await?;
        for row in &rows {
            anyhow::ensure!(!row.firm.trim().is_empty(), "upgrade row firm must be non-empty");
        }
        Ok(rows)
    }
}

fn validate_symbol(got: &str, expected: &str) -> Result<()> {
    anyhow::ensure!(
        got.trim().eq_ignore_ascii_case(expected.trim()),
        "provider symbol mismatch: expected {expected}, got {got}"
    );
    Ok(())
}

fn validate_quote(quote: &Quote) -> Result<()> {
    anyhow::ensure!(
        quote.price.is_finite() && quote.price > 0.0,
        "quote price must be positive (got {})",
        quote.price
    );
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::rating::RatingTier;
    use serde_json::json;

    #[test]
    fn parses_trend_envelope_with_flattened_counts() {
        let v = json!({
            "symbol": "AAPL",
            "items": [
                {"period": "0m", "strongBuy": 10, "buy": 5, "hold": 3, "sell": 1, "strongSell": 1},
                {"period": "-1m", "buy": 2}
            ]
        });
        let parsed: ListResponse<TrendRow> = serde_json::from_value(v).unwrap();
        assert_eq!(parsed.items.len(), 2);
        assert_eq!(parsed.items[0].counts.get(RatingTier::StrongBuy), 10);
        assert_eq!(parsed.items[1].counts.total(), 2);
    }

    #[test]
    fn parses_upgrade_rows_with_missing_from_grade() {
        let v = json!({
            "symbol": "AAPL",
            "items": [
                {"firm": "Acme", "toGrade": "Buy", "occurredAt": "2026-02-03T14:00:00Z"},
                {"firm": "Beta", "fromGrade": "Hold", "toGrade": "Sell", "action": "down", "occurredAt": "2026-02-01T09:30:00Z"}
            ]
        });
        let parsed: ListResponse<UpgradeRow> = serde_json::from_value(v).unwrap();
        assert_eq!(parsed.items[0].from_grade, None);
        assert_eq!(parsed.items[1].action.as_deref(), Some("down"));
    }

    #[test]
    fn rejects_symbol_mismatch_and_bad_price() {
        assert!(validate_symbol("msft", "MSFT").is_ok());
        assert!(validate_symbol("AAPL", "MSFT").is_err());

        let q: Quote = serde_json::from_value(json!({"symbol": "AAPL", "price": 0.0})).unwrap();
        assert!(validate_quote(&q).is_err());
    }

    #[test]
    fn requires_base_url() {
        let settings = ProviderSettings {
            name: "primary".into(),
            base_url: None,
            api_key: None,
        };
        assert!(HttpJsonProvider::from_settings(&settings, 2).is_err());
    }
}
