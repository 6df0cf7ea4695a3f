use config_manager::PipelineConfig;
use persistence_layer::EventStore;
use sales_core::{EventSource, SourceError};
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::{OrchestratorError, Result, Stage};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct IngestSettings {
    pub page_size: u32,
    /// Last page index requested, inclusive
    pub max_page: u32,
    pub insert_records: bool,
}

impl From<&PipelineConfig> for IngestSettings {
    fn from(config: &PipelineConfig) -> Self {
        Self {
            page_size: config.page_size,
            max_page: config.max_page,
            insert_records: config.insert_records,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct IngestStats {
    /// Non-empty pages received
    pub pages_fetched: u32,
    pub events_fetched: u64,
    pub events_stored: u64,
}

/// Walks the events API backwards from a cursor, one page at a time
pub struct EventIngestor<'a> {
    source: &'a dyn EventSource,
    store: &'a dyn EventStore,
    settings: IngestSettings,
}

impl<'a> EventIngestor<'a> {
    pub fn new(
        source: &'a dyn EventSource,
        store: &'a dyn EventStore,
        settings: IngestSettings,
    ) -> Self {
        Self {
            source,
            store,
            settings,
        }
    }

    /// Fetch pages `0..=max_page` of events older than `occurred_before`.
    ///
    /// Stops at the first empty or unusable page. Each page is written
    /// before the next one is requested.
    pub async fn ingest(&self, occurred_before: &str) -> Result<IngestStats> {
        let mut stats = IngestStats::default();

        info!(
            "📥 Ingesting events before {} ({} per page, up to page {})",
            occurred_before, self.settings.page_size, self.settings.max_page
        );

        for page in 0..=self.settings.max_page {
            let events = match self
                .source
                .fetch_events_page(page, self.settings.page_size, occurred_before)
                .await
            {
                Ok(events) => events,
                Err(SourceError::Parse(message)) => {
                    warn!("⚠️ Page {} could not be parsed, stopping: {}", page, message);
                    break;
                }
                Err(e) => {
                    warn!("⚠️ Page {} fetch failed, treating as empty: {}", page, e);
                    break;
                }
            };

            if events.is_empty() {
                info!("No more events after page {}", page);
                break;
            }

            stats.pages_fetched += 1;
            stats.events_fetched += events.len() as u64;

            if self.settings.insert_records {
                let stored = self
                    .store
                    .insert_events(&events)
                    .await
                    .map_err(OrchestratorError::storage(Stage::Ingest))?;
                stats.events_stored += stored;
                debug!("Page {}: stored {} events", page, stored);
            } else {
                debug!("Page {}: {} events (dry run, not stored)", page, events.len());
            }
        }

        info!(
            "✅ Ingestion done: {} pages, {} events fetched, {} stored",
            stats.pages_fetched, stats.events_fetched, stats.events_stored
        );
        Ok(stats)
    }
}
