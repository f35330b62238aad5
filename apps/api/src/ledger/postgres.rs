//! Postgres ledger backend.
//!
//! Every mutation is a single conditional statement so concurrent
//! requests race through row-level atomicity instead of advisory locks.
//! Only authenticated users reach this store; anonymous fingerprints are
//! never written to the database.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::PgPool;
use uuid::Uuid;

use super::store::{CounterState, GrantOutcome, LedgerStore};
use super::LedgerError;
use crate::models::usage::UsageCounterRow;
use crate::principal::Principal;
use crate::tiers::Tier;

pub struct PgLedgerStore {
    pool: PgPool,
}

impl PgLedgerStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    fn user_id(principal: &Principal) -> Result<Uuid, LedgerError> {
        match principal {
            Principal::User(id) => Ok(*id),
            Principal::Anonymous(_) => Err(LedgerError::InvalidPrincipal(
                "anonymous usage is tracked in memory, not in the database".to_string(),
            )),
        }
    }
}

#[async_trait]
impl LedgerStore for PgLedgerStore {
    async fn load_or_create(
        &self,
        principal: &Principal,
        tier: Tier,
        now: DateTime<Utc>,
    ) -> Result<CounterState, LedgerError> {
        let user_id = Self::user_id(principal)?;

        let existing = sqlx::query_as::<_, UsageCounterRow>(
            "SELECT * FROM usage_counters WHERE user_id = $1",
        )
        .bind(user_id)
        .fetch_optional(&self.pool)
        .await?;
        if let Some(row) = existing {
            return Ok(row.into());
        }

        // First sight of this user. ON CONFLICT covers the create race;
        // the RETURNING row carries the anchor as Postgres stored it,
        // which is what later anchor comparisons must use.
        let inserted = sqlx::query_as::<_, UsageCounterRow>(
            r#"
            INSERT INTO usage_counters
                (user_id, tier, period_count, period_anchor, bonus_credits, total_used)
            VALUES ($1, $2, 0, $3, 0, 0)
            ON CONFLICT (user_id) DO NOTHING
            RETURNING *
            "#,
        )
        .bind(user_id)
        .bind(tier.as_str())
        .bind(now)
        .fetch_optional(&self.pool)
        .await?;
        if let Some(row) = inserted {
            return Ok(row.into());
        }

        // Lost the insert race; the winner's row is there now.
        let row = sqlx::query_as::<_, UsageCounterRow>(
            "SELECT * FROM usage_counters WHERE user_id = $1",
        )
        .bind(user_id)
        .fetch_one(&self.pool)
        .await?;
        Ok(row.into())
    }

    async fn reset_period(
        &self,
        principal: &Principal,
        expected_anchor: DateTime<Utc>,
        now: DateTime<Utc>,
    ) -> Result<(), LedgerError> {
        let user_id = Self::user_id(principal)?;

        // Anchor equality is the compare-and-set: if another request
        // already rolled the period, zero rows match and we change nothing.
        sqlx::query(
            r#"
            UPDATE usage_counters
            SET period_count = 0, period_anchor = $3, updated_at = NOW()
            WHERE user_id = $1 AND period_anchor = $2
            "#,
        )
        .bind(user_id)
        .bind(expected_anchor)
        .bind(now)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn try_debit(
        &self,
        principal: &Principal,
        expected_tier: Tier,
        limit: i64,
        cost: i64,
    ) -> Result<Option<CounterState>, LedgerError> {
        let user_id = Self::user_id(principal)?;

        // One statement decides sufficiency and applies the split, so two
        // concurrent debits can never both pass on the same balance. The
        // WHERE clause re-checks the tier: a subscription change between
        // our read and this write voids the attempt.
        let row = sqlx::query_as::<_, UsageCounterRow>(
            r#"
            UPDATE usage_counters
            SET period_count = period_count + CASE
                    WHEN $3 < 0 THEN $4
                    ELSE LEAST($4, GREATEST($3 - period_count, 0))
                END,
                bonus_credits = bonus_credits - CASE
                    WHEN $3 < 0 THEN 0
                    ELSE $4 - LEAST($4, GREATEST($3 - period_count, 0))
                END,
                total_used = total_used + $4,
                updated_at = NOW()
            WHERE user_id = $1
              AND tier = $2
              AND ($3 < 0 OR GREATEST($3 - period_count, 0) + bonus_credits >= $4)
            RETURNING *
            "#,
        )
        .bind(user_id)
        .bind(expected_tier.as_str())
        .bind(limit)
        .bind(cost)
        .fetch_optional(&self.pool)
        .await?;
        Ok(row.map(Into::into))
    }

    async fn grant_bonus(
        &self,
        principal: &Principal,
        amount: i64,
        transaction_key: &str,
    ) -> Result<GrantOutcome, LedgerError> {
        let user_id = Self::user_id(principal)?;

        let mut tx = self.pool.begin().await?;

        // The transaction key's unique index is the dedup: a replayed
        // webhook inserts zero rows and must not touch the balance.
        let inserted = sqlx::query(
            r#"
            INSERT INTO credit_grants (id, user_id, amount, transaction_key)
            VALUES ($1, $2, $3, $4)
            ON CONFLICT (transaction_key) DO NOTHING
            "#,
        )
        .bind(Uuid::new_v4())
        .bind(user_id)
        .bind(amount)
        .bind(transaction_key)
        .execute(&mut *tx)
        .await?;

        if inserted.rows_affected() == 0 {
            tx.rollback().await?;
            let row = sqlx::query_as::<_, UsageCounterRow>(
                "SELECT * FROM usage_counters WHERE user_id = $1",
            )
            .bind(user_id)
            .fetch_one(&self.pool)
            .await?;
            return Ok(GrantOutcome {
                applied: false,
                counter: row.into(),
            });
        }

        let row = sqlx::query_as::<_, UsageCounterRow>(
            r#"
            UPDATE usage_counters
            SET bonus_credits = bonus_credits + $2, updated_at = NOW()
            WHERE user_id = $1
            RETURNING *
            "#,
        )
        .bind(user_id)
        .bind(amount)
        .fetch_one(&mut *tx)
        .await?;

        tx.commit().await?;
        Ok(GrantOutcome {
            applied: true,
            counter: row.into(),
        })
    }

    async fn set_tier(
        &self,
        principal: &Principal,
        tier: Tier,
        now: DateTime<Utc>,
    ) -> Result<CounterState, LedgerError> {
        let user_id = Self::user_id(principal)?;

        // A real tier change starts a fresh period; bonus credits and the
        // lifetime total ride across.
        let row = sqlx::query_as::<_, UsageCounterRow>(
            r#"
            UPDATE usage_counters
            SET tier = $2, period_count = 0, period_anchor = $3, updated_at = NOW()
            WHERE user_id = $1
            RETURNING *
            "#,
        )
        .bind(user_id)
        .bind(tier.as_str())
        .bind(now)
        .fetch_one(&self.pool)
        .await?;
        Ok(row.into())
    }
}
