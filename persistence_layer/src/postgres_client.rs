use async_trait::async_trait;
use sales_core::{EventDocument, ObservedToken, PricePoint};
use sqlx::postgres::{PgConnectOptions, PgPoolOptions};
use sqlx::{PgPool, Row};
use std::str::FromStr;
use std::time::Duration;
use tracing::{debug, info};

use crate::{DuplicateGroup, EventStore, PersistenceError, PriceStore, Result, StorageId};

/// Connection settings and collection (table) names
#[derive(Debug, Clone)]
pub struct PostgresConfig {
    pub database_url: String,
    /// Overrides the database named in `database_url` when non-empty
    pub database_name: String,
    pub events_table: String,
    pub prices_table: String,
    pub max_connections: u32,
}

/// PostgreSQL-backed events and price collections.
///
/// Events are kept as `json` (not `jsonb`) so the stored text is exactly
/// what the API returned.
#[derive(Debug, Clone)]
pub struct PostgresClient {
    pool: PgPool,
    events_table: String,
    prices_table: String,
}

impl PostgresClient {
    /// Connect, then create both tables if they are missing
    pub async fn connect(config: &PostgresConfig) -> Result<Self> {
        check_identifier(&config.events_table)?;
        check_identifier(&config.prices_table)?;

        let mut options = PgConnectOptions::from_str(&config.database_url)?;
        if !config.database_name.is_empty() {
            options = options.database(&config.database_name);
        }

        let pool = PgPoolOptions::new()
            .max_connections(config.max_connections)
            .acquire_timeout(Duration::from_secs(30))
            .idle_timeout(Duration::from_secs(600))
            .connect_with(options)
            .await?;

        info!(
            "PostgreSQL pool initialized: database={}, max_connections={}",
            config.database_name, config.max_connections
        );

        let client = Self {
            pool,
            events_table: config.events_table.clone(),
            prices_table: config.prices_table.clone(),
        };
        client.ensure_tables().await?;
        Ok(client)
    }

    async fn ensure_tables(&self) -> Result<()> {
        sqlx::query(&format!(
            "CREATE TABLE IF NOT EXISTS {} (
                storage_id BIGSERIAL PRIMARY KEY,
                document JSON NOT NULL
            )",
            self.events_table
        ))
        .execute(&self.pool)
        .await?;

        sqlx::query(&format!(
            "CREATE TABLE IF NOT EXISTS {} (
                symbol TEXT NOT NULL,
                timestamp BIGINT NOT NULL,
                usd_price DOUBLE PRECISION NOT NULL
            )",
            self.prices_table
        ))
        .execute(&self.pool)
        .await?;

        debug!(
            "Ensured tables {} and {} exist",
            self.events_table, self.prices_table
        );
        Ok(())
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }
}

/// Table names are spliced into SQL, so only plain identifiers are allowed
fn check_identifier(name: &str) -> Result<()> {
    let mut chars = name.chars();
    let valid = chars
        .next()
        .map(|c| c.is_ascii_alphabetic() || c == '_')
        .unwrap_or(false)
        && chars.all(|c| c.is_ascii_alphanumeric() || c == '_');

    if valid {
        Ok(())
    } else {
        Err(PersistenceError::InvalidIdentifier(name.to_string()))
    }
}

#[async_trait]
impl EventStore for PostgresClient {
    async fn insert_events(&self, events: &[EventDocument]) -> Result<u64> {
        if events.is_empty() {
            return Ok(0);
        }

        let documents: Vec<String> = events.iter().map(|e| e.raw_json().to_string()).collect();

        let result = sqlx::query(&format!(
            "INSERT INTO {} (document) SELECT d::json FROM unnest($1::text[]) AS d",
            self.events_table
        ))
        .bind(&documents)
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected())
    }

    async fn duplicate_groups(&self) -> Result<Vec<DuplicateGroup>> {
        let rows = sqlx::query(&format!(
            "SELECT document->>'id' AS source_id,
                    array_agg(storage_id ORDER BY storage_id) AS members
             FROM {}
             WHERE json_typeof(document->'id') IN ('string', 'number')
             GROUP BY document->>'id'
             HAVING COUNT(*) > 1",
            self.events_table
        ))
        .fetch_all(&self.pool)
        .await?;

        rows.iter()
            .map(|row| -> Result<DuplicateGroup> {
                Ok(DuplicateGroup {
                    source_id: row.try_get("source_id")?,
                    members: row.try_get("members")?,
                })
            })
            .collect()
    }

    async fn delete_events(&self, ids: &[StorageId]) -> Result<u64> {
        if ids.is_empty() {
            return Ok(0);
        }

        let result = sqlx::query(&format!(
            "DELETE FROM {} WHERE storage_id = ANY($1)",
            self.events_table
        ))
        .bind(ids)
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected())
    }

    async fn unique_tokens(&self) -> Result<Vec<ObservedToken>> {
        let rows = sqlx::query(&format!(
            "SELECT symbol, address, name FROM (
                SELECT DISTINCT ON (symbol) storage_id, symbol, address, name
                FROM (
                    SELECT storage_id,
                           CASE WHEN json_typeof(token->'symbol') = 'string'
                                THEN token->>'symbol' END AS symbol,
                           CASE WHEN json_typeof(token->'address') = 'string'
                                THEN token->>'address' ELSE '' END AS address,
                           CASE WHEN json_typeof(token->'name') = 'string'
                                THEN token->>'name' ELSE '' END AS name
                    FROM (SELECT storage_id, document->'payment_token' AS token FROM {}) AS events
                ) AS projected
                WHERE symbol IS NOT NULL
                ORDER BY symbol, storage_id
             ) AS tokens
             ORDER BY storage_id",
            self.events_table
        ))
        .fetch_all(&self.pool)
        .await?;

        rows.iter()
            .map(|row| -> Result<ObservedToken> {
                Ok(ObservedToken {
                    symbol: row.try_get("symbol")?,
                    address: row.try_get("address")?,
                    name: row.try_get("name")?,
                })
            })
            .collect()
    }

    async fn earliest_created_date(&self) -> Result<Option<String>> {
        let row = sqlx::query(&format!(
            "SELECT document->>'created_date' AS created_date
             FROM {}
             WHERE json_typeof(document->'created_date') = 'string'
             ORDER BY document->>'created_date' COLLATE \"C\" ASC
             LIMIT 1",
            self.events_table
        ))
        .fetch_optional(&self.pool)
        .await?;

        match row {
            Some(row) => Ok(Some(row.try_get("created_date")?)),
            None => Ok(None),
        }
    }

    async fn count_events(&self) -> Result<u64> {
        let row = sqlx::query(&format!("SELECT COUNT(*) AS count FROM {}", self.events_table))
            .fetch_one(&self.pool)
            .await?;
        let count: i64 = row.try_get("count")?;
        Ok(count as u64)
    }
}

#[async_trait]
impl PriceStore for PostgresClient {
    async fn clear_prices(&self) -> Result<()> {
        sqlx::query(&format!("TRUNCATE TABLE {}", self.prices_table))
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    async fn insert_prices(&self, points: &[PricePoint]) -> Result<u64> {
        if points.is_empty() {
            return Ok(0);
        }

        let symbols: Vec<&str> = points.iter().map(|p| p.symbol.as_str()).collect();
        let timestamps: Vec<i64> = points.iter().map(|p| p.timestamp).collect();
        let prices: Vec<f64> = points.iter().map(|p| p.usd_price).collect();

        let result = sqlx::query(&format!(
            "INSERT INTO {} (symbol, timestamp, usd_price)
             SELECT * FROM unnest($1::text[], $2::bigint[], $3::float8[])",
            self.prices_table
        ))
        .bind(&symbols)
        .bind(&timestamps)
        .bind(&prices)
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected())
    }

    async fn count_prices(&self) -> Result<u64> {
        let row = sqlx::query(&format!("SELECT COUNT(*) AS count FROM {}", self.prices_table))
            .fetch_one(&self.pool)
            .await?;
        let count: i64 = row.try_get("count")?;
        Ok(count as u64)
    }
}
