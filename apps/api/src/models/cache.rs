use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;

/// Row shape of `content_cache`. Keyed by hex digest, shared globally
/// across principals; `hit_count` and `last_used_at` move on every hit.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct CacheEntryRow {
    pub content_hash: String,
    pub payload: serde_json::Value,
    pub hit_count: i64,
    pub created_at: DateTime<Utc>,
    pub last_used_at: DateTime<Utc>,
}
