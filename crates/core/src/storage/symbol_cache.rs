use crate::cache::{CacheEntry, FreshnessCache};
use crate::domain::payload::{normalize_symbol, AggregatedPayload, Provenance};
use crate::error::StorageError;
use chrono::{DateTime, Utc};
use serde_json::Value;

/// `symbol_cache` table: one row per uppercase ticker, overwritten in place.
#[derive(Debug, Clone)]
pub struct PgSymbolCache {
    pool: sqlx::PgPool,
}

impl PgSymbolCache {
    pub fn new(pool: sqlx::PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait::async_trait]
impl FreshnessCache for PgSymbolCache {
    async fn get(&self, symbol: &str) -> Result<Option<CacheEntry>, StorageError> {
        let key = normalize_symbol(symbol);
        let row = sqlx::query_as::<_, (String, Value, String, DateTime<Utc>)>(
            "SELECT symbol, payload, provenance, updated_at \
             FROM symbol_cache \
             WHERE symbol = $1",
        )
        .persistent(false)
        .bind(&key)
        .fetch_optional(&self.pool)
        .await?;

        let Some((symbol, payload, provenance, updated_at)) = row else {
            return Ok(None);
        };

        let payload = serde_json::from_value::<AggregatedPayload>(payload).map_err(|source| {
            StorageError::Corrupt {
                symbol: symbol.clone(),
                source,
            }
        })?;
        let provenance = provenance
            .parse::<Provenance>()
            .map_err(|e| StorageError::InvalidRow {
                symbol: symbol.clone(),
                detail: e.to_string(),
            })?;

        Ok(Some(CacheEntry {
            symbol,
            payload,
            updated_at,
            provenance,
        }))
    }

    async fn put(
        &self,
        symbol: &str,
        payload: &AggregatedPayload,
        provenance: Provenance,
        updated_at: DateTime<Utc>,
    ) -> Result<CacheEntry, StorageError> {
        let key = normalize_symbol(symbol);
        let json = serde_json::to_value(payload)?;

        sqlx::query(
            "INSERT INTO symbol_cache (symbol, payload, provenance, updated_at) \
             VALUES ($1, $2, $3, $4) \
             ON CONFLICT (symbol) DO UPDATE \
               SET payload = EXCLUDED.payload, provenance = EXCLUDED.provenance, updated_at = EXCLUDED.updated_at",
        )
        .persistent(false)
        .bind(&key)
        .bind(json)
        .bind(provenance.as_str())
        .bind(updated_at)
        .execute(&self.pool)
        .await?;

        tracing::debug!(symbol = %key, %provenance, "symbol_cache upsert");

        Ok(CacheEntry {
            symbol: key,
            payload: payload.clone(),
            updated_at,
            provenance,
        })
    }

    async fn clear(&self, symbol: &str) -> Result<bool, StorageError> {
        let res = sqlx::query("DELETE FROM symbol_cache WHERE symbol = $1")
            .persistent(false)
            .bind(normalize_symbol(symbol))
            .execute(&self.pool)
            .await?;
        Ok(res.rows_affected() > 0)
    }

    async fn clear_all(&self) -> Result<u64, StorageError> {
        let res = sqlx::query("DELETE FROM symbol_cache")
            .persistent(false)
            .execute(&self.pool)
            .await?;
        Ok(res.rows_affected())
    }
}
