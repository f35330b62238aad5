use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use uuid::Uuid;

/// Row shape of `usage_counters`. One row per authenticated principal,
/// created lazily on first touch. `tier` stays TEXT in storage; unknown
/// values degrade to FREE on read.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct UsageCounterRow {
    pub user_id: Uuid,
    pub tier: String,
    pub period_count: i64,
    pub period_anchor: DateTime<Utc>,
    pub bonus_credits: i64,
    pub total_used: i64,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}
