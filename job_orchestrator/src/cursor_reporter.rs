use persistence_layer::EventStore;
use sales_core::created_date_to_epoch;
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::{OrchestratorError, Result, Stage};

/// Earliest stored event time, to be used as the next `occurred_before`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CursorReport {
    pub created_date: String,
    /// `None` when `created_date` is not in the expected layout
    pub epoch_seconds: Option<i64>,
}

pub struct CursorReporter<'a> {
    store: &'a dyn EventStore,
}

impl<'a> CursorReporter<'a> {
    pub fn new(store: &'a dyn EventStore) -> Self {
        Self { store }
    }

    pub async fn report_cursor(&self) -> Result<Option<CursorReport>> {
        let earliest = self
            .store
            .earliest_created_date()
            .await
            .map_err(OrchestratorError::storage(Stage::ReportCursor))?;

        let Some(created_date) = earliest else {
            warn!("⚠️ No stored events, no cursor to report");
            return Ok(None);
        };

        let epoch_seconds = match created_date_to_epoch(&created_date) {
            Ok(seconds) => Some(seconds),
            Err(e) => {
                warn!("⚠️ Earliest created_date is unparsable: {}", e);
                None
            }
        };

        match epoch_seconds {
            Some(seconds) => info!("⏪ Earliest event: {} ({})", created_date, seconds),
            None => info!("⏪ Earliest event: {}", created_date),
        }

        Ok(Some(CursorReport {
            created_date,
            epoch_seconds,
        }))
    }
}
