use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Catalog id of the chain's native asset
pub const NATIVE_COIN_ID: &str = "ethereum";

/// Symbol of the chain's native asset, the implicit settlement currency
pub const NATIVE_SYMBOL: &str = "ETH";

/// Distinct payment token observed across stored events.
///
/// `address` and `name` are the first values seen for the symbol in the
/// store's grouping order; empty when the events carry none.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ObservedToken {
    pub symbol: String,
    pub address: String,
    pub name: String,
}

/// Entry of the price-reference catalog (`/coins/list?include_platform=true`)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CatalogCoin {
    pub id: String,
    #[serde(default)]
    pub symbol: Option<String>,
    #[serde(default)]
    pub name: Option<String>,
    /// Platform name to contract address; the API sends `null` or `""` for unknown
    #[serde(default)]
    pub platforms: HashMap<String, Option<String>>,
}

impl CatalogCoin {
    /// Contract address on `platform`, or `None` when missing or empty
    pub fn platform_address(&self, platform: &str) -> Option<&str> {
        self.platforms
            .get(platform)
            .and_then(|addr| addr.as_deref())
            .filter(|addr| !addr.is_empty())
    }
}

/// Canonical price-catalog id paired with the symbol it was resolved from
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ResolvedTokenId {
    pub id: String,
    pub symbol: String,
}

impl ResolvedTokenId {
    pub fn new(id: impl Into<String>, symbol: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            symbol: symbol.into(),
        }
    }

    /// The `(ethereum, ETH)` pair that every resolution includes
    pub fn native() -> Self {
        Self::new(NATIVE_COIN_ID, NATIVE_SYMBOL)
    }

    pub fn is_native(&self) -> bool {
        self.id == NATIVE_COIN_ID && self.symbol == NATIVE_SYMBOL
    }
}
