use async_trait::async_trait;
use sales_core::{EventDocument, ObservedToken, PricePoint};
use std::collections::{BTreeMap, HashSet};
use tokio::sync::Mutex;
use tracing::debug;

use crate::{DuplicateGroup, EventStore, PriceStore, Result, StorageId};

#[derive(Debug, Default)]
struct MemoryState {
    next_id: StorageId,
    events: BTreeMap<StorageId, EventDocument>,
    prices: Vec<PricePoint>,
}

/// In-process store for both collections, ordered by storage id
#[derive(Debug, Default)]
pub struct MemoryStore {
    state: Mutex<MemoryState>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Raw documents currently stored, in storage order
    pub async fn event_documents(&self) -> Vec<String> {
        let state = self.state.lock().await;
        state
            .events
            .values()
            .map(|doc| doc.raw_json().to_string())
            .collect()
    }

    pub async fn price_points(&self) -> Vec<PricePoint> {
        self.state.lock().await.prices.clone()
    }
}

#[async_trait]
impl EventStore for MemoryStore {
    async fn insert_events(&self, events: &[EventDocument]) -> Result<u64> {
        let mut state = self.state.lock().await;
        for event in events {
            state.next_id += 1;
            let id = state.next_id;
            state.events.insert(id, event.clone());
        }
        debug!("Stored {} events in memory", events.len());
        Ok(events.len() as u64)
    }

    async fn duplicate_groups(&self) -> Result<Vec<DuplicateGroup>> {
        let state = self.state.lock().await;
        let mut groups: BTreeMap<String, Vec<StorageId>> = BTreeMap::new();

        for (id, event) in &state.events {
            if let Some(source_id) = event.source_id() {
                groups.entry(source_id).or_default().push(*id);
            }
        }

        Ok(groups
            .into_iter()
            .filter(|(_, members)| members.len() > 1)
            .map(|(source_id, members)| DuplicateGroup { source_id, members })
            .collect())
    }

    async fn delete_events(&self, ids: &[StorageId]) -> Result<u64> {
        let mut state = self.state.lock().await;
        let before = state.events.len();
        let doomed: HashSet<StorageId> = ids.iter().copied().collect();
        state.events.retain(|id, _| !doomed.contains(id));
        Ok((before - state.events.len()) as u64)
    }

    async fn unique_tokens(&self) -> Result<Vec<ObservedToken>> {
        let state = self.state.lock().await;
        let mut seen = HashSet::new();
        let mut tokens = Vec::new();

        for event in state.events.values() {
            let Some(token) = event.payment_token() else {
                continue;
            };
            let Some(symbol) = token.symbol else {
                continue;
            };
            if seen.insert(symbol.clone()) {
                tokens.push(ObservedToken {
                    symbol,
                    address: token.address.unwrap_or_default(),
                    name: token.name.unwrap_or_default(),
                });
            }
        }

        Ok(tokens)
    }

    async fn earliest_created_date(&self) -> Result<Option<String>> {
        let state = self.state.lock().await;
        Ok(state
            .events
            .values()
            .filter_map(|event| event.created_date())
            .min()
            .map(str::to_string))
    }

    async fn count_events(&self) -> Result<u64> {
        Ok(self.state.lock().await.events.len() as u64)
    }
}

#[async_trait]
impl PriceStore for MemoryStore {
    async fn clear_prices(&self) -> Result<()> {
        self.state.lock().await.prices.clear();
        Ok(())
    }

    async fn insert_prices(&self, points: &[PricePoint]) -> Result<u64> {
        let mut state = self.state.lock().await;
        state.prices.extend_from_slice(points);
        Ok(points.len() as u64)
    }

    async fn count_prices(&self) -> Result<u64> {
        Ok(self.state.lock().await.prices.len() as u64)
    }
}
