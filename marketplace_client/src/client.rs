use crate::{
    error::MarketplaceError,
    types::{EventsRequest, EventsResponse, MarketplaceClientConfig},
};
use async_trait::async_trait;
use reqwest::Client;
use sales_core::{EventDocument, EventSource, SourceResult};
use std::time::Duration;
use tracing::{debug, error, info};

/// Marketplace events API client
#[derive(Debug, Clone)]
pub struct MarketplaceClient {
    client: Client,
    config: MarketplaceClientConfig,
}

impl MarketplaceClient {
    /// Create a new client with custom configuration
    pub fn with_config(config: MarketplaceClientConfig) -> Result<Self, MarketplaceError> {
        let client = Client::builder()
            .timeout(Duration::from_secs(config.timeout_seconds))
            .connect_timeout(Duration::from_secs(30))
            .pool_idle_timeout(Duration::from_secs(90))
            .build()?;

        Ok(Self { client, config })
    }

    pub fn events_url(&self) -> String {
        format!("{}/events", self.config.base_url.trim_end_matches('/'))
    }

    /// Fetch a single page of successful sale events
    pub async fn get_events_page(
        &self,
        request: &EventsRequest,
    ) -> Result<Vec<EventDocument>, MarketplaceError> {
        let url = self.events_url();

        debug!(
            "📡 Events request: {} page={} offset={} limit={} occurred_before={}",
            url,
            request.page,
            request.offset(),
            request.page_size,
            request.occurred_before
        );

        let start_time = std::time::Instant::now();
        let response = self
            .client
            .get(&url)
            .query(&request.query_params())
            .send()
            .await?;
        let elapsed = start_time.elapsed();
        let status = response.status();

        debug!("📨 Events response: {} in {:.2}s", status, elapsed.as_secs_f64());

        if !status.is_success() {
            let text = response.text().await.unwrap_or_default();
            error!("❌ Events API error - Status: {}, Body: {}", status, text);

            return Err(match status.as_u16() {
                401 | 403 => MarketplaceError::AuthError,
                429 => MarketplaceError::RateLimit,
                code => MarketplaceError::ApiError {
                    status: code,
                    message: text,
                },
            });
        }

        let response_text = response.text().await?;
        let events = Self::parse_events_page(&response_text)?;

        info!(
            "✅ Page {} returned {} events ({} bytes)",
            request.page,
            events.len(),
            response_text.len()
        );
        Ok(events)
    }

    /// Parse an `/events` response body.
    ///
    /// A body without `asset_events` yields an empty page. Any event that is
    /// not a JSON object makes the whole page unparsable.
    pub fn parse_events_page(body: &str) -> Result<Vec<EventDocument>, MarketplaceError> {
        let response: EventsResponse = serde_json::from_str(body).map_err(|e| {
            let sample_size = body.len().min(500);
            let sample = body.get(..sample_size).unwrap_or(body);
            error!("❌ Failed to parse events response: {} (sample: {})", e, sample);
            MarketplaceError::ParseError {
                message: format!("JSON parse error: {} (response size: {} bytes)", e, body.len()),
            }
        })?;

        response
            .asset_events
            .unwrap_or_default()
            .into_iter()
            .map(|raw| {
                EventDocument::from_raw(raw).map_err(|e| MarketplaceError::ParseError {
                    message: e.to_string(),
                })
            })
            .collect()
    }
}

#[async_trait]
impl EventSource for MarketplaceClient {
    async fn fetch_events_page(
        &self,
        page: u32,
        page_size: u32,
        occurred_before: &str,
    ) -> SourceResult<Vec<EventDocument>> {
        let request = EventsRequest::new(page, page_size, occurred_before);
        self.get_events_page(&request).await.map_err(Into::into)
    }
}
