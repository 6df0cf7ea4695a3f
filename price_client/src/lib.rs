// CoinGecko client: coin catalog and market chart history

use async_trait::async_trait;
use reqwest::{Client, StatusCode};
use sales_core::{CatalogCoin, PriceSample, PriceSource, PriceWindow, SourceError, SourceResult};
use serde::{de::DeserializeOwned, Deserialize, Serialize};
use std::time::Duration;
use thiserror::Error;
use tracing::{debug, error, info};

#[derive(Error, Debug)]
pub enum CoinGeckoError {
    #[error("HTTP request error: {0}")]
    Http(#[from] reqwest::Error),
    #[error("JSON parsing error: {0}")]
    Json(#[from] serde_json::Error),
    #[error("API error (HTTP {status}): {message}")]
    Api { status: u16, message: String },
    #[error("Rate limit exceeded")]
    RateLimit,
}

impl From<CoinGeckoError> for SourceError {
    fn from(err: CoinGeckoError) -> Self {
        match err {
            CoinGeckoError::Http(e) => SourceError::Transport(e.to_string()),
            CoinGeckoError::Json(e) => SourceError::Parse(e.to_string()),
            CoinGeckoError::Api { status, message } => SourceError::Api { status, message },
            CoinGeckoError::RateLimit => SourceError::RateLimit,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CoinGeckoClientConfig {
    /// CoinGecko API base URL
    pub api_url: String,
    /// Request timeout in seconds
    pub request_timeout_seconds: u64,
    /// Quote currency for market chart requests
    pub vs_currency: String,
}

impl Default for CoinGeckoClientConfig {
    fn default() -> Self {
        Self {
            api_url: "https://api.coingecko.com/api/v3".to_string(),
            request_timeout_seconds: 30,
            vs_currency: "usd".to_string(),
        }
    }
}

/// `/coins/{id}/market_chart/range` response. Only `prices` is kept.
#[derive(Debug, Deserialize)]
pub struct MarketChartResponse {
    #[serde(default)]
    pub prices: Vec<PriceSample>,
}

#[derive(Clone)]
pub struct CoinGeckoClient {
    config: CoinGeckoClientConfig,
    http_client: Client,
}

impl CoinGeckoClient {
    pub fn new(config: CoinGeckoClientConfig) -> Result<Self, CoinGeckoError> {
        let http_client = Client::builder()
            .timeout(Duration::from_secs(config.request_timeout_seconds))
            .build()?;

        Ok(Self {
            config,
            http_client,
        })
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.config.api_url.trim_end_matches('/'), path)
    }

    /// Fetch every listed coin with its contract addresses per platform
    pub async fn get_coin_list(&self) -> Result<Vec<CatalogCoin>, CoinGeckoError> {
        let url = self.url("/coins/list");
        let body = self
            .get_text(&url, &[("include_platform", "true".to_string())])
            .await?;

        let coins = parse_coin_list(&body)?;
        info!("📚 Loaded {} coins from CoinGecko catalog", coins.len());
        Ok(coins)
    }

    /// Fetch price samples for `coin_id` between `window.from` and `window.to`
    pub async fn get_market_chart_range(
        &self,
        coin_id: &str,
        window: PriceWindow,
    ) -> Result<Vec<PriceSample>, CoinGeckoError> {
        let url = self.url(&format!("/coins/{}/market_chart/range", coin_id));
        let params = [
            ("vs_currency", self.config.vs_currency.clone()),
            ("from", window.from.to_string()),
            ("to", window.to.to_string()),
        ];

        let body = self.get_text(&url, &params).await?;
        let samples = parse_market_chart(&body)?;

        debug!(
            "📈 {} price samples for {} in [{}, {}]",
            samples.len(),
            coin_id,
            window.from,
            window.to
        );
        Ok(samples)
    }

    async fn get_text(
        &self,
        url: &str,
        params: &[(&str, String)],
    ) -> Result<String, CoinGeckoError> {
        debug!("🌐 CoinGecko API URL: {} with params: {:?}", url, params);

        let response = self.http_client.get(url).query(params).send().await?;
        let status = response.status();

        if status == StatusCode::TOO_MANY_REQUESTS {
            error!("❌ CoinGecko rate limit hit for {}", url);
            return Err(CoinGeckoError::RateLimit);
        }

        if !status.is_success() {
            let text = response.text().await.unwrap_or_default();
            error!("❌ CoinGecko API error - Status: {}, Body: {}", status, text);
            return Err(CoinGeckoError::Api {
                status: status.as_u16(),
                message: text,
            });
        }

        Ok(response.text().await?)
    }
}

fn parse_json<T: DeserializeOwned>(body: &str) -> Result<T, CoinGeckoError> {
    Ok(serde_json::from_str(body)?)
}

/// Parse a `/coins/list?include_platform=true` body
pub fn parse_coin_list(body: &str) -> Result<Vec<CatalogCoin>, CoinGeckoError> {
    parse_json(body)
}

/// Parse a market chart body into its `[millis, price]` samples
pub fn parse_market_chart(body: &str) -> Result<Vec<PriceSample>, CoinGeckoError> {
    let response: MarketChartResponse = parse_json(body)?;
    Ok(response.prices)
}

#[async_trait]
impl PriceSource for CoinGeckoClient {
    async fn fetch_coin_catalog(&self) -> SourceResult<Vec<CatalogCoin>> {
        self.get_coin_list().await.map_err(SourceError::from)
    }

    async fn fetch_price_range(
        &self,
        coin_id: &str,
        window: PriceWindow,
    ) -> SourceResult<Vec<PriceSample>> {
        self.get_market_chart_range(coin_id, window)
            .await
            .map_err(SourceError::from)
    }
}
