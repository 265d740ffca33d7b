//! Market data provider: tiered index endpoints over HTTP
//!
//! Responses may be a bare array or an envelope (`{data: [...]}` or
//! `{stocks: [...]}`); anything else is an unrecognized shape, reported
//! distinctly from transport failures.

use crate::error::QueryError;
use crate::models::StockRecord;
use reqwest::Client;
use std::time::Duration;
use tracing::{error, info};

/// Named scope of the remote dataset.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Tier {
    Nifty50,
    Nifty100,
    Nifty500,
    AllSymbols,
}

impl Tier {
    pub fn from_source(source: &str) -> Option<Self> {
        match source {
            "nifty50" => Some(Tier::Nifty50),
            "nifty100" => Some(Tier::Nifty100),
            "nifty500" => Some(Tier::Nifty500),
            "allSymbols" | "all_symbols" => Some(Tier::AllSymbols),
            _ => None,
        }
    }

    pub fn endpoint(&self) -> &'static str {
        match self {
            Tier::Nifty50 => "/api/index/NIFTY 50",
            Tier::Nifty100 => "/api/index/NIFTY 100",
            Tier::Nifty500 => "/api/index/NIFTY 500",
            Tier::AllSymbols => "/api/allSymbols",
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            Tier::Nifty50 => "nifty50",
            Tier::Nifty100 => "nifty100",
            Tier::Nifty500 => "nifty500",
            Tier::AllSymbols => "allSymbols",
        }
    }
}

#[async_trait::async_trait]
pub trait MarketDataProvider: Send + Sync {
    async fn fetch(&self, tier: Tier) -> crate::Result<Vec<StockRecord>>;
}

pub struct HttpMarketDataProvider {
    client: Client,
    base_url: String,
    host: String,
    api_key: String,
}

impl HttpMarketDataProvider {
    pub fn new(host: String, api_key: String) -> Self {
        let client = Client::builder()
            .pool_idle_timeout(Duration::from_secs(90))
            .pool_max_idle_per_host(8)
            .timeout(Duration::from_secs(30))
            .build()
            .expect("Failed to build HTTP client");

        Self {
            client,
            base_url: format!("https://{}", host),
            host,
            api_key,
        }
    }
}

#[async_trait::async_trait]
impl MarketDataProvider for HttpMarketDataProvider {
    async fn fetch(&self, tier: Tier) -> crate::Result<Vec<StockRecord>> {
        let url = format!("{}{}", self.base_url, tier.endpoint());
        info!(tier = tier.name(), "fetching stock data");

        let response = self
            .client
            .get(&url)
            .header("x-rapidapi-key", &self.api_key)
            .header("x-rapidapi-host", &self.host)
            .send()
            .await
            .map_err(|e| {
                error!("data provider request failed: {}", e);
                QueryError::DataFetch(format!("provider request failed: {}", e))
            })?;

        let status = response.status();
        if !status.is_success() {
            error!(%status, tier = tier.name(), "data provider error");
            return Err(QueryError::DataFetch(format!(
                "provider returned {}",
                status
            )));
        }

        let body: serde_json::Value = response
            .json()
            .await
            .map_err(|e| QueryError::DataFetch(format!("provider body unreadable: {}", e)))?;

        unwrap_envelope(body)
    }
}

/// Accept a bare array or a `data`/`stocks` envelope.
pub(crate) fn unwrap_envelope(body: serde_json::Value) -> crate::Result<Vec<StockRecord>> {
    match body {
        serde_json::Value::Array(records) => Ok(records),
        serde_json::Value::Object(mut map) => {
            for key in ["data", "stocks"] {
                if let Some(serde_json::Value::Array(records)) = map.remove(key) {
                    return Ok(records);
                }
            }
            Err(QueryError::UnrecognizedShape(
                "expected an array or a data/stocks envelope".to_string(),
            ))
        }
        _ => Err(QueryError::UnrecognizedShape(
            "provider response is not array-shaped".to_string(),
        )),
    }
}
