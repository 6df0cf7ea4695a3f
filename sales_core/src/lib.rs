pub mod event;
pub mod price;
pub mod timeframe;
pub mod token;

pub use event::{EventDocument, PaymentToken};
pub use price::{PricePoint, PriceSample, PriceWindow};
pub use timeframe::{created_date_to_epoch, parse_created_date, CREATED_DATE_FORMAT};
pub use token::{CatalogCoin, ObservedToken, ResolvedTokenId, NATIVE_COIN_ID, NATIVE_SYMBOL};

use async_trait::async_trait;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum SalesError {
    #[error("Invalid event document: {0}")]
    InvalidEvent(String),
    #[error("Timestamp parsing error: {0}")]
    TimestampParse(String),
}

pub type Result<T> = std::result::Result<T, SalesError>;

/// Failure reported by one of the external read-only APIs.
///
/// Every variant is recoverable from the pipeline's point of view: the
/// affected fetch is treated as "no data".
#[derive(Error, Debug, Clone, PartialEq)]
pub enum SourceError {
    #[error("Transport error: {0}")]
    Transport(String),
    #[error("Parse error: {0}")]
    Parse(String),
    #[error("API error (HTTP {status}): {message}")]
    Api { status: u16, message: String },
    #[error("Rate limit exceeded")]
    RateLimit,
}

pub type SourceResult<T> = std::result::Result<T, SourceError>;

/// Paginated source of completed marketplace sale events
#[async_trait]
pub trait EventSource: Send + Sync {
    /// Fetch one page of successful sale events that occurred before `occurred_before`.
    ///
    /// An empty vector means the upstream data is exhausted for this cursor.
    async fn fetch_events_page(
        &self,
        page: u32,
        page_size: u32,
        occurred_before: &str,
    ) -> SourceResult<Vec<EventDocument>>;
}

/// Price-reference catalog and history API
#[async_trait]
pub trait PriceSource: Send + Sync {
    /// Fetch the full list of known coins with their per-platform contract addresses
    async fn fetch_coin_catalog(&self) -> SourceResult<Vec<CatalogCoin>>;

    /// Fetch `(timestamp millis, price)` samples for one coin inside `window`
    async fn fetch_price_range(
        &self,
        coin_id: &str,
        window: PriceWindow,
    ) -> SourceResult<Vec<PriceSample>>;
}
