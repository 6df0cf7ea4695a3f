use serde::{Deserialize, Serialize};

/// Closed time range, in epoch seconds, for a price-history request
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PriceWindow {
    pub from: i64,
    pub to: i64,
}

impl PriceWindow {
    pub fn new(from: i64, to: i64) -> Self {
        Self { from, to }
    }
}

/// Raw `[timestamp_millis, price]` pair from the market chart endpoint
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PriceSample(pub f64, pub f64);

impl PriceSample {
    pub fn timestamp_millis(&self) -> i64 {
        self.0 as i64
    }

    pub fn price(&self) -> f64 {
        self.1
    }
}

/// Persisted USD price of one symbol at one instant
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PricePoint {
    pub symbol: String,
    /// Seconds since epoch
    pub timestamp: i64,
    pub usd_price: f64,
}

impl PricePoint {
    /// Tag an API sample with `symbol`, converting its millisecond timestamp to seconds
    pub fn from_sample(symbol: &str, sample: PriceSample) -> Self {
        Self {
            symbol: symbol.to_string(),
            timestamp: sample.timestamp_millis().div_euclid(1000),
            usd_price: sample.price(),
        }
    }
}
