use crate::domain::payload::{AggregatedPayload, Provenance};
use crate::error::StorageError;
use chrono::{DateTime, Duration, Utc};

pub mod memory;

pub use memory::InMemoryCache;

/// Last merged payload for a symbol. Overwritten on every refresh, never appended.
#[derive(Debug, Clone, PartialEq)]
pub struct CacheEntry {
    pub symbol: String,
    pub payload: AggregatedPayload,
    pub updated_at: DateTime<Utc>,
    pub provenance: Provenance,
}

impl CacheEntry {
    pub fn age(&self, now: DateTime<Utc>) -> Duration {
        now - self.updated_at
    }
}

/// Symbol-keyed store. Entries never expire on their own; callers judge staleness with
/// [`is_fresh`] at read time. Concurrent writers for one symbol are last-write-wins.
#[async_trait::async_trait]
pub trait FreshnessCache: Send + Sync {
    async fn get(&self, symbol: &str) -> Result<Option<CacheEntry>, StorageError>;

    async fn put(
        &self,
        symbol: &str,
        payload: &AggregatedPayload,
        provenance: Provenance,
        updated_at: DateTime<Utc>,
    ) -> Result<CacheEntry, StorageError>;

    /// Returns whether an entry existed.
    async fn clear(&self, symbol: &str) -> Result<bool, StorageError>;

    /// Returns the number of entries removed.
    async fn clear_all(&self) -> Result<u64, StorageError>;
}

pub fn is_fresh(entry: &CacheEntry, ttl: Duration, now: DateTime<Utc>) -> bool {
    entry.age(now) < ttl
}
