use persistence_layer::PriceStore;
use sales_core::{PricePoint, PriceSource, PriceWindow, ResolvedTokenId};
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::{OrchestratorError, Result, Stage};

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PriceLoadStats {
    pub ids_requested: u64,
    pub ids_failed: u64,
    pub points_fetched: u64,
    pub points_stored: u64,
}

/// Replaces the price collection with fresh history for each resolved id
pub struct PriceHistoryLoader<'a> {
    source: &'a dyn PriceSource,
    store: &'a dyn PriceStore,
    window: PriceWindow,
}

impl<'a> PriceHistoryLoader<'a> {
    pub fn new(
        source: &'a dyn PriceSource,
        store: &'a dyn PriceStore,
        window: PriceWindow,
    ) -> Self {
        Self {
            source,
            store,
            window,
        }
    }

    pub async fn load_history(&self, ids: &[ResolvedTokenId]) -> Result<PriceLoadStats> {
        let mut stats = PriceLoadStats::default();

        self.store
            .clear_prices()
            .await
            .map_err(OrchestratorError::storage(Stage::LoadPrices))?;
        debug!("Cleared price collection");

        for token in ids {
            stats.ids_requested += 1;

            let samples = match self.source.fetch_price_range(&token.id, self.window).await {
                Ok(samples) => samples,
                Err(e) => {
                    warn!("⚠️ No price history for {} ({}): {}", token.id, token.symbol, e);
                    stats.ids_failed += 1;
                    continue;
                }
            };

            if samples.is_empty() {
                debug!("{} returned no samples", token.id);
                continue;
            }

            let points: Vec<PricePoint> = samples
                .into_iter()
                .map(|sample| PricePoint::from_sample(&token.symbol, sample))
                .collect();
            stats.points_fetched += points.len() as u64;

            stats.points_stored += self
                .store
                .insert_prices(&points)
                .await
                .map_err(OrchestratorError::storage(Stage::LoadPrices))?;

            debug!("{} ({}): {} price points", token.id, token.symbol, points.len());
        }

        info!(
            "💵 Price history: {} ids, {} failed, {} points fetched, {} stored",
            stats.ids_requested, stats.ids_failed, stats.points_fetched, stats.points_stored
        );
        Ok(stats)
    }
}
