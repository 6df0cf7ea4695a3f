use serde::{Deserialize, Serialize};
use serde_json::value::RawValue;

/// Event type filter: completed sales only
pub const EVENT_TYPE_SUCCESSFUL: &str = "successful";

/// Configuration for the marketplace events API client
#[derive(Debug, Clone)]
pub struct MarketplaceClientConfig {
    pub base_url: String,
    pub timeout_seconds: u64,
}

impl Default for MarketplaceClientConfig {
    fn default() -> Self {
        Self {
            base_url: "https://api.opensea.io/api/v1".to_string(),
            timeout_seconds: 30,
        }
    }
}

/// One page request against `/events`
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct EventsRequest {
    pub page: u32,
    pub page_size: u32,
    pub occurred_before: String,
}

impl EventsRequest {
    pub fn new(page: u32, page_size: u32, occurred_before: &str) -> Self {
        Self {
            page,
            page_size,
            occurred_before: occurred_before.to_string(),
        }
    }

    /// Offset of the first item of this page
    pub fn offset(&self) -> u64 {
        self.page as u64 * self.page_size as u64
    }

    /// Query string pairs, in the order the API documents them
    pub fn query_params(&self) -> Vec<(&'static str, String)> {
        vec![
            ("only_opensea", "false".to_string()),
            ("offset", self.offset().to_string()),
            ("limit", self.page_size.to_string()),
            ("occurred_before", self.occurred_before.clone()),
            ("event_type", EVENT_TYPE_SUCCESSFUL.to_string()),
        ]
    }
}

/// Body of an `/events` response. Individual events stay as raw JSON.
#[derive(Debug, Deserialize)]
pub struct EventsResponse {
    #[serde(default)]
    pub asset_events: Option<Vec<Box<RawValue>>>,
}
