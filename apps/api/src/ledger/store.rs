use async_trait::async_trait;
use chrono::{DateTime, Utc};

use super::LedgerError;
use crate::models::usage::UsageCounterRow;
use crate::principal::Principal;
use crate::tiers::Tier;

/// Counter state as every backend reports it.
#[derive(Debug, Clone)]
pub struct CounterState {
    pub tier: Tier,
    pub period_count: i64,
    pub period_anchor: DateTime<Utc>,
    pub bonus_credits: i64,
    pub total_used: i64,
}

impl From<UsageCounterRow> for CounterState {
    fn from(row: UsageCounterRow) -> Self {
        CounterState {
            tier: Tier::from_name(&row.tier),
            period_count: row.period_count,
            period_anchor: row.period_anchor,
            bonus_credits: row.bonus_credits,
            total_used: row.total_used,
        }
    }
}

/// Result of an idempotent credit grant.
#[derive(Debug, Clone)]
pub struct GrantOutcome {
    /// False when the transaction key was already recorded (replay).
    pub applied: bool,
    pub counter: CounterState,
}

/// Storage backend for usage counters.
///
/// Backends provide compare-and-set primitives only; the `ledger` facade
/// owns period-reset policy and retry. `try_debit` must evaluate its
/// affordability guard and apply the mutation as one conditional update,
/// never as a read followed by a write. `grant_bonus` and `set_tier`
/// expect the counter to exist (callers run `load_or_create` first) and
/// report a missing row as `sqlx::Error::RowNotFound`.
#[async_trait]
pub trait LedgerStore: Send + Sync {
    /// Fetch the principal's counter, creating it at `tier` with
    /// `period_anchor = now` when absent.
    async fn load_or_create(
        &self,
        principal: &Principal,
        tier: Tier,
        now: DateTime<Utc>,
    ) -> Result<CounterState, LedgerError>;

    /// Zero the period count and advance the anchor, guarded by the anchor
    /// value the caller read. Losing the race to a concurrent reset is not
    /// an error.
    async fn reset_period(
        &self,
        principal: &Principal,
        expected_anchor: DateTime<Utc>,
        now: DateTime<Utc>,
    ) -> Result<(), LedgerError>;

    /// Debit `cost` from the period quota first, then bonus credits, only
    /// when the balance at `limit` covers it and the stored tier still
    /// equals `expected_tier`. Unlimited limits (< 0) debit the period
    /// count by the full cost. Returns None when the guard rejected the
    /// update (insufficient balance or a concurrent tier change).
    async fn try_debit(
        &self,
        principal: &Principal,
        expected_tier: Tier,
        limit: i64,
        cost: i64,
    ) -> Result<Option<CounterState>, LedgerError>;

    /// Add `amount` bonus credits at most once per `transaction_key`.
    /// Replays return the current counter with `applied = false`.
    async fn grant_bonus(
        &self,
        principal: &Principal,
        amount: i64,
        transaction_key: &str,
    ) -> Result<GrantOutcome, LedgerError>;

    /// Set the tier, zeroing the period count and re-anchoring, as a
    /// subscription change does.
    async fn set_tier(
        &self,
        principal: &Principal,
        tier: Tier,
        now: DateTime<Utc>,
    ) -> Result<CounterState, LedgerError>;
}
