//! Stage-by-stage behaviour of the ingestion pipeline against scripted
//! upstream APIs and the in-memory store

use async_trait::async_trait;
use config_manager::SystemConfig;
use job_orchestrator::{
    CursorReporter, Deduplicator, EventIngestor, IngestSettings, OrchestratorError,
    PipelineOrchestrator, PriceHistoryLoader, Stage, TokenResolver,
};
use persistence_layer::{
    DuplicateGroup, EventStore, MemoryStore, PersistenceError, PriceStore, StorageId,
};
use sales_core::{
    CatalogCoin, EventDocument, EventSource, ObservedToken, PricePoint, PriceSample, PriceSource,
    PriceWindow, ResolvedTokenId, SourceError, SourceResult,
};
use serde_json::json;
use std::collections::HashMap;
use std::sync::{Arc, Mutex};

const WETH_ADDRESS: &str = "0xc02aaa39b223fe8d0a0e5c4f27ead9083c756cc2";

fn sale(id: u64, created_date: &str, token: Option<(&str, &str)>) -> EventDocument {
    let payment_token = token.map(|(symbol, address)| {
        json!({"symbol": symbol, "address": address, "name": symbol, "decimals": 18})
    });
    let doc = json!({
        "id": id,
        "created_date": created_date,
        "event_type": "successful",
        "payment_token": payment_token,
    });
    EventDocument::from_json(&doc.to_string()).unwrap()
}

fn page(start_id: u64, len: u64) -> Vec<EventDocument> {
    (start_id..start_id + len)
        .map(|id| sale(id, "2021-03-10T00:00:00", Some(("ETH", ""))))
        .collect()
}

/// Serves pre-scripted pages, then empty pages (or the same page forever)
struct ScriptedEventSource {
    pages: Vec<SourceResult<Vec<EventDocument>>>,
    endless: bool,
    requested: Mutex<Vec<(u32, u32, String)>>,
}

impl ScriptedEventSource {
    fn new(pages: Vec<SourceResult<Vec<EventDocument>>>) -> Self {
        Self {
            pages,
            endless: false,
            requested: Mutex::new(Vec::new()),
        }
    }

    fn endless() -> Self {
        Self {
            pages: vec![Ok(page(1, 1))],
            endless: true,
            requested: Mutex::new(Vec::new()),
        }
    }

    fn requested_pages(&self) -> Vec<u32> {
        self.requested.lock().unwrap().iter().map(|r| r.0).collect()
    }
}

#[async_trait]
impl EventSource for ScriptedEventSource {
    async fn fetch_events_page(
        &self,
        page: u32,
        page_size: u32,
        occurred_before: &str,
    ) -> SourceResult<Vec<EventDocument>> {
        self.requested
            .lock()
            .unwrap()
            .push((page, page_size, occurred_before.to_string()));

        if self.endless {
            return self.pages[0].clone();
        }
        self.pages
            .get(page as usize)
            .cloned()
            .unwrap_or_else(|| Ok(Vec::new()))
    }
}

struct FakePriceSource {
    catalog: SourceResult<Vec<CatalogCoin>>,
    histories: HashMap<String, SourceResult<Vec<PriceSample>>>,
    requested: Mutex<Vec<(String, PriceWindow)>>,
}

impl FakePriceSource {
    fn new(catalog: SourceResult<Vec<CatalogCoin>>) -> Self {
        Self {
            catalog,
            histories: HashMap::new(),
            requested: Mutex::new(Vec::new()),
        }
    }

    fn with_history(mut self, coin_id: &str, history: SourceResult<Vec<PriceSample>>) -> Self {
        self.histories.insert(coin_id.to_string(), history);
        self
    }
}

#[async_trait]
impl PriceSource for FakePriceSource {
    async fn fetch_coin_catalog(&self) -> SourceResult<Vec<CatalogCoin>> {
        self.catalog.clone()
    }

    async fn fetch_price_range(
        &self,
        coin_id: &str,
        window: PriceWindow,
    ) -> SourceResult<Vec<PriceSample>> {
        self.requested
            .lock()
            .unwrap()
            .push((coin_id.to_string(), window));
        self.histories
            .get(coin_id)
            .cloned()
            .unwrap_or_else(|| Ok(Vec::new()))
    }
}

/// Store whose every operation fails
struct BrokenStore;

fn broken() -> PersistenceError {
    PersistenceError::InvalidIdentifier("broken".to_string())
}

#[async_trait]
impl EventStore for BrokenStore {
    async fn insert_events(&self, _events: &[EventDocument]) -> persistence_layer::Result<u64> {
        Err(broken())
    }
    async fn duplicate_groups(&self) -> persistence_layer::Result<Vec<DuplicateGroup>> {
        Err(broken())
    }
    async fn delete_events(&self, _ids: &[StorageId]) -> persistence_layer::Result<u64> {
        Err(broken())
    }
    async fn unique_tokens(&self) -> persistence_layer::Result<Vec<ObservedToken>> {
        Err(broken())
    }
    async fn earliest_created_date(&self) -> persistence_layer::Result<Option<String>> {
        Err(broken())
    }
    async fn count_events(&self) -> persistence_layer::Result<u64> {
        Err(broken())
    }
}

#[async_trait]
impl PriceStore for BrokenStore {
    async fn clear_prices(&self) -> persistence_layer::Result<()> {
        Err(broken())
    }
    async fn insert_prices(&self, _points: &[PricePoint]) -> persistence_layer::Result<u64> {
        Err(broken())
    }
    async fn count_prices(&self) -> persistence_layer::Result<u64> {
        Err(broken())
    }
}

fn weth_coin() -> CatalogCoin {
    CatalogCoin {
        id: "weth".to_string(),
        symbol: Some("weth".to_string()),
        name: Some("WETH".to_string()),
        platforms: HashMap::from([("ethereum".to_string(), Some(WETH_ADDRESS.to_string()))]),
    }
}

fn blank_coin(id: &str) -> CatalogCoin {
    CatalogCoin {
        id: id.to_string(),
        symbol: None,
        name: None,
        platforms: HashMap::from([("ethereum".to_string(), Some(String::new()))]),
    }
}

fn settings(insert_records: bool) -> IngestSettings {
    IngestSettings {
        page_size: 50,
        max_page: 200,
        insert_records,
    }
}

// ---------------------------------------------------------------------------
// Ingestion
// ---------------------------------------------------------------------------

#[tokio::test]
async fn test_pagination_stops_at_first_empty_page() {
    let source = ScriptedEventSource::new(vec![Ok(page(1, 50)), Ok(page(51, 50)), Ok(vec![])]);
    let store = MemoryStore::new();

    let stats = EventIngestor::new(&source, &store, settings(true))
        .ingest("1616599000")
        .await
        .unwrap();

    assert_eq!(stats.pages_fetched, 2);
    assert_eq!(stats.events_fetched, 100);
    assert_eq!(stats.events_stored, 100);
    assert_eq!(store.count_events().await.unwrap(), 100);
    assert_eq!(source.requested_pages(), vec![0, 1, 2]);

    let requests = source.requested.lock().unwrap().clone();
    assert!(requests
        .iter()
        .all(|(_, size, cursor)| *size == 50 && cursor == "1616599000"));
}

#[tokio::test]
async fn test_pagination_hard_stops_at_page_200() {
    let source = ScriptedEventSource::endless();
    let store = MemoryStore::new();

    let stats = EventIngestor::new(&source, &store, settings(true))
        .ingest("1616599000")
        .await
        .unwrap();

    let requested = source.requested_pages();
    assert_eq!(requested.len(), 201);
    assert_eq!(requested.first(), Some(&0));
    assert_eq!(requested.last(), Some(&200));
    assert_eq!(stats.pages_fetched, 201);
    assert_eq!(store.count_events().await.unwrap(), 201);
}

#[tokio::test]
async fn test_fetch_failures_end_pagination() {
    let source = ScriptedEventSource::new(vec![
        Ok(page(1, 50)),
        Err(SourceError::Transport("connection reset".to_string())),
        Ok(page(101, 50)),
    ]);
    let store = MemoryStore::new();

    let stats = EventIngestor::new(&source, &store, settings(true))
        .ingest("1616599000")
        .await
        .unwrap();
    assert_eq!(stats.pages_fetched, 1);
    assert_eq!(source.requested_pages(), vec![0, 1]);

    let source = ScriptedEventSource::new(vec![Err(SourceError::Parse("bad body".to_string()))]);
    let stats = EventIngestor::new(&source, &store, settings(true))
        .ingest("1616599000")
        .await
        .unwrap();
    assert_eq!(stats.pages_fetched, 0);
    assert_eq!(store.count_events().await.unwrap(), 50);
}

#[tokio::test]
async fn test_dry_run_ingest_stores_nothing() {
    let source = ScriptedEventSource::new(vec![Ok(page(1, 50)), Ok(page(51, 10))]);
    let store = MemoryStore::new();

    let stats = EventIngestor::new(&source, &store, settings(false))
        .ingest("1616599000")
        .await
        .unwrap();

    assert_eq!(stats.pages_fetched, 2);
    assert_eq!(stats.events_fetched, 60);
    assert_eq!(stats.events_stored, 0);
    assert_eq!(store.count_events().await.unwrap(), 0);
}

#[tokio::test]
async fn test_insert_failure_is_fatal() {
    let source = ScriptedEventSource::new(vec![Ok(page(1, 50))]);

    let err = EventIngestor::new(&source, &BrokenStore, settings(true))
        .ingest("1616599000")
        .await
        .unwrap_err();

    assert!(matches!(
        err,
        OrchestratorError::Storage {
            stage: Stage::Ingest,
            ..
        }
    ));
    assert_eq!(source.requested_pages(), vec![0]);
}

// ---------------------------------------------------------------------------
// Deduplication
// ---------------------------------------------------------------------------

#[tokio::test]
async fn test_dedup_keeps_one_record_per_source_id() {
    let store = MemoryStore::new();
    store
        .insert_events(&[
            sale(1, "2021-03-01T00:00:00", None),
            sale(2, "2021-03-02T00:00:00", None),
            sale(1, "2021-03-01T00:00:00", None),
            sale(3, "2021-03-03T00:00:00", None),
            sale(1, "2021-03-01T00:00:00", None),
            sale(2, "2021-03-02T00:00:00", None),
        ])
        .await
        .unwrap();

    let stats = Deduplicator::new(&store).deduplicate().await.unwrap();
    assert_eq!(stats.groups, 2);
    assert_eq!(stats.duplicates_found, 3);
    assert_eq!(stats.removed, 3);
    assert_eq!(store.count_events().await.unwrap(), 3);
    assert!(store.duplicate_groups().await.unwrap().is_empty());

    let again = Deduplicator::new(&store).deduplicate().await.unwrap();
    assert_eq!(again.groups, 0);
    assert_eq!(again.removed, 0);
    assert_eq!(store.count_events().await.unwrap(), 3);
}

// ---------------------------------------------------------------------------
// Token resolution
// ---------------------------------------------------------------------------

#[tokio::test]
async fn test_empty_store_resolves_native_only() {
    let store = MemoryStore::new();
    let prices = FakePriceSource::new(Ok(vec![weth_coin()]));

    let resolved = TokenResolver::new(&store, &prices, "ethereum")
        .resolve_tokens()
        .await
        .unwrap();
    assert_eq!(resolved, vec![ResolvedTokenId::native()]);
}

#[tokio::test]
async fn test_weth_address_resolves() {
    let store = MemoryStore::new();
    store
        .insert_events(&[
            sale(1, "2021-03-01T00:00:00", Some(("ETH", ""))),
            sale(2, "2021-03-02T00:00:00", Some(("WETH", WETH_ADDRESS))),
            sale(3, "2021-03-03T00:00:00", None),
        ])
        .await
        .unwrap();
    let prices = FakePriceSource::new(Ok(vec![blank_coin("nothing"), weth_coin()]));

    let resolved = TokenResolver::new(&store, &prices, "ethereum")
        .resolve_tokens()
        .await
        .unwrap();

    assert_eq!(
        resolved,
        vec![ResolvedTokenId::native(), ResolvedTokenId::new("weth", "WETH")]
    );
    assert_eq!(resolved.iter().filter(|id| id.is_native()).count(), 1);
}

#[tokio::test]
async fn test_catalog_failure_degrades_to_native() {
    let store = MemoryStore::new();
    store
        .insert_events(&[sale(1, "2021-03-01T00:00:00", Some(("WETH", WETH_ADDRESS)))])
        .await
        .unwrap();
    let prices = FakePriceSource::new(Err(SourceError::Api {
        status: 503,
        message: "unavailable".to_string(),
    }));

    let resolved = TokenResolver::new(&store, &prices, "ethereum")
        .resolve_tokens()
        .await
        .unwrap();
    assert_eq!(resolved, vec![ResolvedTokenId::native()]);
}

#[tokio::test]
async fn test_unique_token_read_failure_is_fatal() {
    let prices = FakePriceSource::new(Ok(vec![]));
    let err = TokenResolver::new(&BrokenStore, &prices, "ethereum")
        .resolve_tokens()
        .await
        .unwrap_err();
    assert!(matches!(
        err,
        OrchestratorError::Storage {
            stage: Stage::ResolveTokens,
            ..
        }
    ));
}

// ---------------------------------------------------------------------------
// Price history
// ---------------------------------------------------------------------------

#[tokio::test]
async fn test_price_loading_replaces_prior_content() {
    let store = MemoryStore::new();
    store
        .insert_prices(&[PricePoint {
            symbol: "STALE".to_string(),
            timestamp: 1,
            usd_price: 0.5,
        }])
        .await
        .unwrap();

    let window = PriceWindow::new(1_615_744_719, 1_616_599_000);
    let prices = FakePriceSource::new(Ok(vec![]))
        .with_history(
            "ethereum",
            Ok(vec![
                PriceSample(1_615_748_400_000.0, 1795.5),
                PriceSample(1_615_752_000_999.0, 1801.25),
            ]),
        )
        .with_history("weth", Err(SourceError::RateLimit));

    let ids = vec![ResolvedTokenId::native(), ResolvedTokenId::new("weth", "WETH")];
    let stats = PriceHistoryLoader::new(&prices, &store, window)
        .load_history(&ids)
        .await
        .unwrap();

    assert_eq!(stats.ids_requested, 2);
    assert_eq!(stats.ids_failed, 1);
    assert_eq!(stats.points_stored, 2);

    let points = store.price_points().await;
    assert_eq!(
        points,
        vec![
            PricePoint {
                symbol: "ETH".to_string(),
                timestamp: 1_615_748_400,
                usd_price: 1795.5,
            },
            PricePoint {
                symbol: "ETH".to_string(),
                timestamp: 1_615_752_000,
                usd_price: 1801.25,
            },
        ]
    );

    let requested = prices.requested.lock().unwrap().clone();
    assert_eq!(requested.len(), 2);
    assert!(requested.iter().all(|(_, w)| *w == window));

    // A second run with no data at all still wipes the collection
    let empty = FakePriceSource::new(Ok(vec![]));
    PriceHistoryLoader::new(&empty, &store, window)
        .load_history(&ids)
        .await
        .unwrap();
    assert_eq!(store.count_prices().await.unwrap(), 0);
}

// ---------------------------------------------------------------------------
// Cursor report
// ---------------------------------------------------------------------------

#[tokio::test]
async fn test_cursor_reports_earliest_event() {
    let store = MemoryStore::new();
    store
        .insert_events(&[
            sale(1, "2021-03-05T00:00:00", None),
            sale(2, "2021-03-01T00:00:00", None),
            sale(3, "2021-03-03T12:00:00.500000", None),
        ])
        .await
        .unwrap();

    let report = CursorReporter::new(&store).report_cursor().await.unwrap().unwrap();
    assert_eq!(report.created_date, "2021-03-01T00:00:00");
    assert_eq!(report.epoch_seconds, Some(1_614_556_800));
}

#[tokio::test]
async fn test_cursor_on_empty_store_or_bad_date() {
    let store = MemoryStore::new();
    assert!(CursorReporter::new(&store).report_cursor().await.unwrap().is_none());

    store
        .insert_events(&[sale(1, "01/03/2021", None)])
        .await
        .unwrap();
    let report = CursorReporter::new(&store).report_cursor().await.unwrap().unwrap();
    assert_eq!(report.created_date, "01/03/2021");
    assert_eq!(report.epoch_seconds, None);
}

// ---------------------------------------------------------------------------
// Whole pipeline
// ---------------------------------------------------------------------------

fn pipeline_config(query_marketplace: bool, insert_records: bool) -> SystemConfig {
    let mut config = SystemConfig::default();
    config.pipeline.occurred_before = "1616599000".to_string();
    config.pipeline.query_marketplace = query_marketplace;
    config.pipeline.insert_records = insert_records;
    config
}

#[tokio::test]
async fn test_full_run_end_to_end() {
    let first = vec![
        sale(10, "2021-03-04T00:00:00", Some(("WETH", WETH_ADDRESS))),
        sale(11, "2021-03-02T08:30:00", Some(("ETH", ""))),
    ];
    let second = vec![
        sale(10, "2021-03-04T00:00:00", Some(("WETH", WETH_ADDRESS))),
        sale(12, "2021-03-01T00:00:00", None),
    ];
    let events = Arc::new(ScriptedEventSource::new(vec![Ok(first), Ok(second)]));
    let prices = Arc::new(
        FakePriceSource::new(Ok(vec![weth_coin()]))
            .with_history("ethereum", Ok(vec![PriceSample(1_615_748_400_000.0, 1795.5)]))
            .with_history("weth", Ok(vec![PriceSample(1_615_748_400_000.0, 1796.0)])),
    );
    let store = Arc::new(MemoryStore::new());

    let orchestrator = PipelineOrchestrator::new(
        pipeline_config(true, true),
        events.clone(),
        prices.clone(),
        store.clone(),
    );
    let report = orchestrator.run().await.unwrap();

    let ingest = report.ingest.unwrap();
    assert_eq!(ingest.pages_fetched, 2);
    assert_eq!(ingest.events_stored, 4);
    assert_eq!(report.dedup.removed, 1);
    assert_eq!(store.count_events().await.unwrap(), 3);
    assert_eq!(
        report.resolved_tokens,
        vec![ResolvedTokenId::native(), ResolvedTokenId::new("weth", "WETH")]
    );
    assert_eq!(report.prices.points_stored, 2);
    assert_eq!(store.count_prices().await.unwrap(), 2);

    let cursor = report.cursor.unwrap();
    assert_eq!(cursor.created_date, "2021-03-01T00:00:00");
    assert_eq!(cursor.epoch_seconds, Some(1_614_556_800));
}

#[tokio::test]
async fn test_run_without_marketplace_skips_ingestion() {
    let events = Arc::new(ScriptedEventSource::new(vec![Ok(page(1, 5))]));
    let prices = Arc::new(FakePriceSource::new(Ok(vec![])));
    let store = Arc::new(MemoryStore::new());

    let orchestrator = PipelineOrchestrator::new(
        pipeline_config(false, true),
        events.clone(),
        prices,
        store.clone(),
    );
    let report = orchestrator.run().await.unwrap();

    assert!(report.ingest.is_none());
    assert!(events.requested_pages().is_empty());
    assert_eq!(report.resolved_tokens, vec![ResolvedTokenId::native()]);
    assert!(report.cursor.is_none());
}

#[tokio::test]
async fn test_run_aborts_on_storage_failure() {
    let events = Arc::new(ScriptedEventSource::new(vec![Ok(page(1, 5))]));
    let prices = Arc::new(FakePriceSource::new(Ok(vec![])));

    let orchestrator = PipelineOrchestrator::new(
        pipeline_config(true, true),
        events,
        prices.clone(),
        Arc::new(BrokenStore),
    );
    let err = orchestrator.run().await.unwrap_err();

    assert!(err.to_string().starts_with("Storage failure during ingest"));
    assert!(prices.requested.lock().unwrap().is_empty());
}

#[tokio::test]
async fn test_run_without_inserting_still_dedups_and_replaces_prices() {
    let store = Arc::new(MemoryStore::new());
    store
        .insert_events(&[
            sale(1, "2021-03-01T00:00:00", Some(("ETH", ""))),
            sale(1, "2021-03-01T00:00:00", Some(("ETH", ""))),
        ])
        .await
        .unwrap();
    store
        .insert_prices(&[PricePoint {
            symbol: "STALE".to_string(),
            timestamp: 1,
            usd_price: 0.5,
        }])
        .await
        .unwrap();

    let events = Arc::new(ScriptedEventSource::new(vec![Ok(page(100, 3))]));
    let prices = Arc::new(
        FakePriceSource::new(Ok(vec![]))
            .with_history("ethereum", Ok(vec![PriceSample(1_615_748_400_000.0, 1795.5)])),
    );

    let config = pipeline_config(true, false);
    assert!(!SystemConfig::default().pipeline.insert_records);

    let report = PipelineOrchestrator::new(config, events, prices, store.clone())
        .run()
        .await
        .unwrap();

    // Fetched pages are not stored
    assert_eq!(report.ingest.unwrap().events_stored, 0);

    assert_eq!(report.dedup.removed, 1);
    assert_eq!(store.count_events().await.unwrap(), 1);

    assert_eq!(
        store.price_points().await,
        vec![PricePoint {
            symbol: "ETH".to_string(),
            timestamp: 1_615_748_400,
            usd_price: 1795.5,
        }]
    );
}
