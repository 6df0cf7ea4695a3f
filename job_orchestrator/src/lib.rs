use chrono::{DateTime, Utc};
use config_manager::{StorageBackend, SystemConfig};
use marketplace_client::{MarketplaceClient, MarketplaceClientConfig};
use persistence_layer::{
    MemoryStore, PersistenceError, PostgresClient, PostgresConfig, SalesStore,
};
use price_client::{CoinGeckoClient, CoinGeckoClientConfig};
use sales_core::{EventSource, PriceSource, PriceWindow, ResolvedTokenId};
use serde::Serialize;
use std::fmt;
use std::sync::Arc;
use thiserror::Error;
use tracing::{error, info};
use uuid::Uuid;

pub mod cursor_reporter;
pub mod deduplicator;
pub mod ingestor;
pub mod price_history;
pub mod token_resolver;

pub use cursor_reporter::{CursorReport, CursorReporter};
pub use deduplicator::{DedupStats, Deduplicator};
pub use ingestor::{EventIngestor, IngestSettings, IngestStats};
pub use price_history::{PriceHistoryLoader, PriceLoadStats};
pub use token_resolver::{resolve_against_catalog, TokenResolver};

/// Pipeline stage, used to say where a fatal failure happened
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum Stage {
    Connect,
    Ingest,
    Deduplicate,
    ResolveTokens,
    LoadPrices,
    ReportCursor,
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Stage::Connect => "connect",
            Stage::Ingest => "ingest",
            Stage::Deduplicate => "deduplicate",
            Stage::ResolveTokens => "resolve tokens",
            Stage::LoadPrices => "load prices",
            Stage::ReportCursor => "report cursor",
        };
        f.write_str(name)
    }
}

#[derive(Error, Debug)]
pub enum OrchestratorError {
    #[error("Storage failure during {stage}: {source}")]
    Storage {
        stage: Stage,
        source: PersistenceError,
    },
    #[error("Configuration error: {0}")]
    Config(String),
    #[error("Client setup error: {0}")]
    Client(String),
}

impl OrchestratorError {
    /// Adapter for `map_err` that tags a storage failure with its stage
    pub fn storage(stage: Stage) -> impl FnOnce(PersistenceError) -> Self {
        move |source| OrchestratorError::Storage { stage, source }
    }
}

impl From<config_manager::ConfigurationError> for OrchestratorError {
    fn from(err: config_manager::ConfigurationError) -> Self {
        OrchestratorError::Config(err.to_string())
    }
}

impl From<marketplace_client::MarketplaceError> for OrchestratorError {
    fn from(err: marketplace_client::MarketplaceError) -> Self {
        OrchestratorError::Client(err.to_string())
    }
}

impl From<price_client::CoinGeckoError> for OrchestratorError {
    fn from(err: price_client::CoinGeckoError) -> Self {
        OrchestratorError::Client(err.to_string())
    }
}

pub type Result<T> = std::result::Result<T, OrchestratorError>;

/// Outcome of one full pipeline run
#[derive(Debug, Clone, Serialize)]
pub struct PipelineReport {
    pub run_id: Uuid,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
    /// Absent when marketplace querying is disabled
    pub ingest: Option<IngestStats>,
    pub dedup: DedupStats,
    pub resolved_tokens: Vec<ResolvedTokenId>,
    pub prices: PriceLoadStats,
    /// Earliest stored event, the cursor for the next run
    pub cursor: Option<CursorReport>,
}

/// Runs ingest, dedup, token resolution, price loading and cursor
/// reporting in sequence against one store.
pub struct PipelineOrchestrator {
    config: SystemConfig,
    events: Arc<dyn EventSource>,
    prices: Arc<dyn PriceSource>,
    store: Arc<dyn SalesStore>,
}

impl PipelineOrchestrator {
    pub fn new(
        config: SystemConfig,
        events: Arc<dyn EventSource>,
        prices: Arc<dyn PriceSource>,
        store: Arc<dyn SalesStore>,
    ) -> Self {
        Self {
            config,
            events,
            prices,
            store,
        }
    }

    /// Build the HTTP clients and the configured storage backend
    pub async fn from_config(config: SystemConfig) -> Result<Self> {
        config.validate()?;

        let marketplace = MarketplaceClient::with_config(MarketplaceClientConfig {
            base_url: config.marketplace.api_base_url.clone(),
            timeout_seconds: config.marketplace.request_timeout_seconds,
        })?;

        let coingecko = CoinGeckoClient::new(CoinGeckoClientConfig {
            api_url: config.coingecko.api_base_url.clone(),
            request_timeout_seconds: config.coingecko.request_timeout_seconds,
            vs_currency: config.coingecko.vs_currency.clone(),
        })?;

        let store: Arc<dyn SalesStore> = match config.database.backend {
            StorageBackend::Postgres => {
                let pg_config = PostgresConfig {
                    database_url: config.database.postgres_url.clone(),
                    database_name: config.database.database_name.clone(),
                    events_table: config.database.events_collection.clone(),
                    prices_table: config.database.prices_collection.clone(),
                    max_connections: config.database.max_connections,
                };
                let client = PostgresClient::connect(&pg_config).await.map_err(|e| {
                    error!("❌ Failed to connect to PostgreSQL: {}", e);
                    OrchestratorError::storage(Stage::Connect)(e)
                })?;
                Arc::new(client)
            }
            StorageBackend::Memory => {
                info!("Using in-memory store; nothing will outlive this run");
                Arc::new(MemoryStore::new())
            }
        };

        Ok(Self::new(config, Arc::new(marketplace), Arc::new(coingecko), store))
    }

    pub fn config(&self) -> &SystemConfig {
        &self.config
    }

    /// Run every stage once. Storage failures abort the run; upstream API
    /// failures only shrink what gets loaded.
    pub async fn run(&self) -> Result<PipelineReport> {
        let run_id = Uuid::new_v4();
        let started_at = Utc::now();
        let pipeline = &self.config.pipeline;

        info!(
            "🚀 Pipeline run {} starting (query_marketplace={}, insert_records={}, occurred_before={})",
            run_id, pipeline.query_marketplace, pipeline.insert_records, pipeline.occurred_before
        );

        let ingest = if pipeline.query_marketplace {
            let ingestor = EventIngestor::new(
                self.events.as_ref(),
                self.store.events(),
                IngestSettings::from(pipeline),
            );
            Some(ingestor.ingest(&pipeline.occurred_before).await?)
        } else {
            info!("⏭️  Marketplace querying disabled, skipping ingestion");
            None
        };

        let dedup = Deduplicator::new(self.store.events()).deduplicate().await?;

        let resolved_tokens = TokenResolver::new(
            self.store.events(),
            self.prices.as_ref(),
            &self.config.coingecko.platform,
        )
        .resolve_tokens()
        .await?;

        let window = PriceWindow::new(
            self.config.price_history.from_timestamp,
            self.config.price_history.to_timestamp,
        );
        let prices = PriceHistoryLoader::new(
            self.prices.as_ref(),
            self.store.prices(),
            window,
        )
        .load_history(&resolved_tokens)
        .await?;

        let cursor = CursorReporter::new(self.store.events()).report_cursor().await?;

        let finished_at = Utc::now();
        info!(
            "✅ Pipeline run {} finished in {:.1}s",
            run_id,
            (finished_at - started_at).num_milliseconds() as f64 / 1000.0
        );

        Ok(PipelineReport {
            run_id,
            started_at,
            finished_at,
            ingest,
            dedup,
            resolved_tokens,
            prices,
            cursor,
        })
    }
}
