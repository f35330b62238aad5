//! Cache persistence seam.

use anyhow::Result;
use async_trait::async_trait;

use super::hashing::CacheKey;

/// Storage behind [`super::CacheGate`]. Implementations report errors
/// normally; the gate decides that every cache error is survivable.
#[async_trait]
pub trait CacheStore: Send + Sync {
    /// Returns the payload stored under `key`, if any, updating the
    /// entry's hit bookkeeping in the same operation.
    async fn fetch(&self, key: &CacheKey) -> Result<Option<serde_json::Value>>;

    /// Stores `payload` under `key`, replacing any previous payload.
    async fn put(&self, key: &CacheKey, payload: &serde_json::Value) -> Result<()>;
}
