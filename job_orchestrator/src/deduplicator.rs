use persistence_layer::{EventStore, StorageId};
use serde::{Deserialize, Serialize};
use tracing::info;

use crate::{OrchestratorError, Result, Stage};

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DedupStats {
    /// Source ids stored more than once
    pub groups: u64,
    /// Records beyond the first in each group
    pub duplicates_found: u64,
    pub removed: u64,
}

/// Keeps one stored event per source id
pub struct Deduplicator<'a> {
    store: &'a dyn EventStore,
}

impl<'a> Deduplicator<'a> {
    pub fn new(store: &'a dyn EventStore) -> Self {
        Self { store }
    }

    pub async fn deduplicate(&self) -> Result<DedupStats> {
        let groups = self
            .store
            .duplicate_groups()
            .await
            .map_err(OrchestratorError::storage(Stage::Deduplicate))?;

        let redundant: Vec<StorageId> = groups
            .iter()
            .flat_map(|group| group.redundant().iter().copied())
            .collect();

        let mut stats = DedupStats {
            groups: groups.len() as u64,
            duplicates_found: redundant.len() as u64,
            removed: 0,
        };

        if !redundant.is_empty() {
            stats.removed = self
                .store
                .delete_events(&redundant)
                .await
                .map_err(OrchestratorError::storage(Stage::Deduplicate))?;
        }

        info!(
            "🧹 Dedup: {} duplicated ids, {} redundant records, {} removed",
            stats.groups, stats.duplicates_found, stats.removed
        );
        Ok(stats)
    }
}
