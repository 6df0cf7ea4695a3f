use persistence_layer::EventStore;
use sales_core::{CatalogCoin, ObservedToken, PriceSource, ResolvedTokenId};
use std::collections::HashMap;
use tracing::{debug, info, warn};

use crate::{OrchestratorError, Result, Stage};

/// Maps observed payment tokens to price catalog ids by contract address
pub struct TokenResolver<'a> {
    store: &'a dyn EventStore,
    prices: &'a dyn PriceSource,
    platform: &'a str,
}

impl<'a> TokenResolver<'a> {
    pub fn new(store: &'a dyn EventStore, prices: &'a dyn PriceSource, platform: &'a str) -> Self {
        Self {
            store,
            prices,
            platform,
        }
    }

    /// Resolved ids, always starting with the native pair.
    ///
    /// A catalog that cannot be fetched resolves to the native pair alone.
    pub async fn resolve_tokens(&self) -> Result<Vec<ResolvedTokenId>> {
        let observed = self
            .store
            .unique_tokens()
            .await
            .map_err(OrchestratorError::storage(Stage::ResolveTokens))?;
        debug!("{} distinct payment tokens in store", observed.len());

        let catalog = match self.prices.fetch_coin_catalog().await {
            Ok(catalog) => catalog,
            Err(e) => {
                warn!("⚠️ Coin catalog unavailable, resolving native token only: {}", e);
                return Ok(vec![ResolvedTokenId::native()]);
            }
        };

        let resolved = resolve_against_catalog(&observed, &catalog, self.platform);
        info!(
            "🔗 Resolved {} token ids from {} observed tokens",
            resolved.len(),
            observed.len()
        );
        Ok(resolved)
    }
}

/// Pair every catalog coin whose `platform` address equals an observed
/// token address with that token's symbol. Comparison is exact and empty
/// addresses never match. The native pair comes first and appears once.
pub fn resolve_against_catalog(
    observed: &[ObservedToken],
    catalog: &[CatalogCoin],
    platform: &str,
) -> Vec<ResolvedTokenId> {
    let mut by_address: HashMap<&str, Vec<&str>> = HashMap::new();
    for token in observed.iter().filter(|t| !t.address.is_empty()) {
        by_address
            .entry(token.address.as_str())
            .or_default()
            .push(token.symbol.as_str());
    }

    let mut resolved = vec![ResolvedTokenId::native()];

    for coin in catalog {
        let Some(address) = coin.platform_address(platform) else {
            continue;
        };
        let Some(symbols) = by_address.get(address) else {
            continue;
        };

        for symbol in symbols {
            let id = ResolvedTokenId::new(coin.id.as_str(), *symbol);
            if !id.is_native() {
                resolved.push(id);
            }
        }
    }

    resolved
}
