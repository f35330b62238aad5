//! Postgres content cache.

use anyhow::Result;
use async_trait::async_trait;
use sqlx::PgPool;

use super::hashing::CacheKey;
use super::store::CacheStore;
use crate::models::cache::CacheEntryRow;

pub struct PgCacheStore {
    pool: PgPool,
}

impl PgCacheStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl CacheStore for PgCacheStore {
    async fn fetch(&self, key: &CacheKey) -> Result<Option<serde_json::Value>> {
        // The hit-count bump and the read are one statement, so stats stay
        // consistent under concurrent hits.
        let row = sqlx::query_as::<_, CacheEntryRow>(
            r#"
            UPDATE content_cache
            SET hit_count = hit_count + 1, last_used_at = NOW()
            WHERE content_hash = $1
            RETURNING *
            "#,
        )
        .bind(key.as_str())
        .fetch_optional(&self.pool)
        .await?;
        Ok(row.map(|r| r.payload))
    }

    async fn put(&self, key: &CacheKey, payload: &serde_json::Value) -> Result<()> {
        // Last write wins; two racing computations for the same key both
        // succeed and the later payload stays.
        sqlx::query(
            r#"
            INSERT INTO content_cache (content_hash, payload)
            VALUES ($1, $2)
            ON CONFLICT (content_hash)
            DO UPDATE SET payload = EXCLUDED.payload, last_used_at = NOW()
            "#,
        )
        .bind(key.as_str())
        .bind(payload)
        .execute(&self.pool)
        .await?;
        Ok(())
    }
}
