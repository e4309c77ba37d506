use crate::cache::{CacheEntry, FreshnessCache};
use crate::domain::payload::{normalize_symbol, AggregatedPayload, Provenance};
use crate::error::StorageError;
use chrono::{DateTime, Utc};
use std::collections::HashMap;
use tokio::sync::RwLock;

/// Process-local cache for tests and runs without `DATABASE_URL`.
#[derive(Debug, Default)]
pub struct InMemoryCache {
    entries: RwLock<HashMap<String, CacheEntry>>,
}

impl InMemoryCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn len(&self) -> usize {
        self.entries.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.entries.read().await.is_empty()
    }
}

#[async_trait::async_trait]
impl FreshnessCache for InMemoryCache {
    async fn get(&self, symbol: &str) -> Result<Option<CacheEntry>, StorageError> {
        Ok(self.entries.read().await.get(&normalize_symbol(symbol)).cloned())
    }

    async fn put(
        &self,
        symbol: &str,
        payload: &AggregatedPayload,
        provenance: Provenance,
        updated_at: DateTime<Utc>,
    ) -> Result<CacheEntry, StorageError> {
        let key = normalize_symbol(symbol);
        let entry = CacheEntry {
            symbol: key.clone(),
            payload: payload.clone(),
            updated_at,
            provenance,
        };
        self.entries.write().await.insert(key, entry.clone());
        Ok(entry)
    }

    async fn clear(&self, symbol: &str) -> Result<bool, StorageError> {
        Ok(self.entries.write().await.remove(&normalize_symbol(symbol)).is_some())
    }

    async fn clear_all(&self) -> Result<u64, StorageError> {
        let mut guard = self.entries.write().await;
        let n = guard.len() as u64;
        guard.clear();
        Ok(n)
    }
}
