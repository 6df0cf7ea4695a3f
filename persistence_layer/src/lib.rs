use async_trait::async_trait;
use sales_core::{EventDocument, ObservedToken, PricePoint};
use serde::{Deserialize, Serialize};
use thiserror::Error;

pub mod memory_store;
pub mod postgres_client;

pub use memory_store::MemoryStore;
pub use postgres_client::{PostgresClient, PostgresConfig};

/// Identifier the store assigns to a persisted event, distinct from the
/// upstream source identifier
pub type StorageId = i64;

/// Stored events sharing one source identifier
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DuplicateGroup {
    pub source_id: String,
    /// Storage ids of every member; the first one is the survivor
    pub members: Vec<StorageId>,
}

impl DuplicateGroup {
    /// Every member except the survivor
    pub fn redundant(&self) -> &[StorageId] {
        self.members.get(1..).unwrap_or(&[])
    }
}

#[derive(Error, Debug)]
pub enum PersistenceError {
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),
    #[error("Invalid identifier: {0}")]
    InvalidIdentifier(String),
}

pub type Result<T> = std::result::Result<T, PersistenceError>;

/// Events collection: append-only apart from duplicate removal
#[async_trait]
pub trait EventStore: Send + Sync {
    /// Store a batch of events, returning how many were written
    async fn insert_events(&self, events: &[EventDocument]) -> Result<u64>;

    /// Groups of more than one stored event sharing a source identifier
    /// (a JSON string or number)
    async fn duplicate_groups(&self) -> Result<Vec<DuplicateGroup>>;

    /// Delete every event whose storage id is in `ids`, in one operation
    async fn delete_events(&self, ids: &[StorageId]) -> Result<u64>;

    /// One entry per distinct payment-token symbol, first-seen address and name.
    /// Only JSON string values count; any other address or name reads as empty.
    async fn unique_tokens(&self) -> Result<Vec<ObservedToken>>;

    /// Smallest string `created_date` across stored events
    async fn earliest_created_date(&self) -> Result<Option<String>>;

    async fn count_events(&self) -> Result<u64>;
}

/// Price collection: dropped and replaced on every run
#[async_trait]
pub trait PriceStore: Send + Sync {
    async fn clear_prices(&self) -> Result<()>;

    async fn insert_prices(&self, points: &[PricePoint]) -> Result<u64>;

    async fn count_prices(&self) -> Result<u64>;
}

/// A backend providing both collections
pub trait SalesStore: EventStore + PriceStore {
    fn events(&self) -> &dyn EventStore;

    fn prices(&self) -> &dyn PriceStore;
}

impl<T: EventStore + PriceStore> SalesStore for T {
    fn events(&self) -> &dyn EventStore {
        self
    }

    fn prices(&self) -> &dyn PriceStore {
        self
    }
}
