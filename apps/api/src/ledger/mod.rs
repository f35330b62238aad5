//! Usage ledger: quota periods, bonus balances, and conditional debits.
//!
//! The facade owns all policy (reset-if-due, snapshot math, debit retry,
//! idempotent grants) and delegates persistence to a [`LedgerStore`]:
//! Postgres for authenticated users, the in-process map for anonymous
//! fingerprints. Backends only expose compare-and-set primitives, so a
//! quota can never be overspent by concurrent requests on any backend.

pub mod handlers;
pub mod memory;
pub mod period;
pub mod postgres;
pub mod store;

use std::sync::Arc;

use chrono::Utc;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{info, warn};

use crate::principal::Principal;
use crate::tiers::{Operation, Tier, ANONYMOUS_DAILY_QUOTA};
use store::{CounterState, LedgerStore};

/// How many times a debit re-reads and retries after losing a write race
/// before giving up.
const DEBIT_ATTEMPTS: u32 = 3;

#[derive(Debug, Error)]
pub enum LedgerError {
    #[error("quota exceeded ({used} used of {limit})", used = .0.used, limit = .0.limit)]
    QuotaExceeded(Box<UsageSnapshot>),
    #[error("invalid principal: {0}")]
    InvalidPrincipal(String),
    #[error("usage counter contention persisted across retries")]
    Contention,
    #[error("ledger storage error: {0}")]
    Storage(#[from] sqlx::Error),
}

/// Point-in-time view of a principal's balance. `limit`, `period_remaining`
/// and `remaining` carry the -1 unlimited sentinel through unchanged.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UsageSnapshot {
    pub can_proceed: bool,
    pub used: i64,
    pub limit: i64,
    pub period_remaining: i64,
    pub bonus_credits: i64,
    pub remaining: i64,
    pub tier: Tier,
}

/// Outcome of a credit grant. `applied` is false when the transaction key
/// was seen before; the snapshot reflects the balance either way.
#[derive(Debug, Clone, Serialize)]
pub struct GrantReceipt {
    pub applied: bool,
    pub snapshot: UsageSnapshot,
}

/// The credit-accounting facade shared by all handlers.
pub struct UsageLedger {
    durable: Arc<dyn LedgerStore>,
    transient: Arc<dyn LedgerStore>,
}

impl UsageLedger {
    pub fn new(durable: Arc<dyn LedgerStore>, transient: Arc<dyn LedgerStore>) -> Self {
        Self { durable, transient }
    }

    fn store_for(&self, principal: &Principal) -> &dyn LedgerStore {
        match principal {
            Principal::User(_) => self.durable.as_ref(),
            Principal::Anonymous(_) => self.transient.as_ref(),
        }
    }

    fn quota_limit(principal: &Principal, tier: Tier) -> i64 {
        match principal {
            Principal::User(_) => tier.monthly_quota(),
            Principal::Anonymous(_) => ANONYMOUS_DAILY_QUOTA,
        }
    }

    fn snapshot(principal: &Principal, counter: &CounterState) -> UsageSnapshot {
        let limit = Self::quota_limit(principal, counter.tier);
        let unlimited = limit < 0;
        let period_remaining = if unlimited {
            -1
        } else {
            (limit - counter.period_count).max(0)
        };
        let remaining = if unlimited {
            -1
        } else {
            period_remaining + counter.bonus_credits
        };
        UsageSnapshot {
            can_proceed: unlimited || remaining > 0,
            used: counter.period_count,
            limit,
            period_remaining,
            bonus_credits: counter.bonus_credits,
            remaining,
            tier: counter.tier,
        }
    }

    /// Loads the counter, rolling the period over first when it has lapsed.
    /// Unknown principals get a FREE counter anchored now. The reset is a
    /// compare-and-set on the anchor, so two requests arriving together
    /// reset at most once.
    async fn refreshed(&self, principal: &Principal) -> Result<CounterState, LedgerError> {
        let store = self.store_for(principal);
        let now = Utc::now();
        let counter = store.load_or_create(principal, Tier::Free, now).await?;
        if period::reset_due(period::Period::of(principal), counter.period_anchor, now) {
            store
                .reset_period(principal, counter.period_anchor, now)
                .await?;
            return store.load_or_create(principal, Tier::Free, now).await;
        }
        Ok(counter)
    }

    /// Current balance without spending anything.
    pub async fn status(&self, principal: &Principal) -> Result<UsageSnapshot, LedgerError> {
        let counter = self.refreshed(principal).await?;
        Ok(Self::snapshot(principal, &counter))
    }

    /// Debits the operation's cost, quota headroom first and bonus credits
    /// for the rest. Callers record usage only after the paid work
    /// succeeded, so a rejected debit here means the balance truly ran out
    /// between their affordability check and now.
    pub async fn record_usage(
        &self,
        principal: &Principal,
        operation: Operation,
    ) -> Result<UsageSnapshot, LedgerError> {
        let store = self.store_for(principal);
        let cost = operation.credit_cost();

        for attempt in 1..=DEBIT_ATTEMPTS {
            let counter = self.refreshed(principal).await?;
            let limit = Self::quota_limit(principal, counter.tier);
            match store.try_debit(principal, counter.tier, limit, cost).await? {
                Some(updated) => return Ok(Self::snapshot(principal, &updated)),
                None => {
                    // Distinguish a genuine shortfall from losing a race
                    // with a concurrent debit, grant or tier change.
                    let current = self.refreshed(principal).await?;
                    let snap = Self::snapshot(principal, &current);
                    if snap.remaining >= 0 && snap.remaining < cost {
                        return Err(LedgerError::QuotaExceeded(Box::new(snap)));
                    }
                    warn!(%principal, attempt, "usage debit lost a write race, retrying");
                }
            }
        }
        Err(LedgerError::Contention)
    }

    /// Adds bonus credits exactly once per transaction key. Replays are
    /// acknowledged without touching the balance.
    pub async fn add_bonus_credits(
        &self,
        principal: &Principal,
        amount: i64,
        transaction_key: &str,
    ) -> Result<GrantReceipt, LedgerError> {
        if principal.is_anonymous() {
            return Err(LedgerError::InvalidPrincipal(
                "bonus credits require an authenticated user".to_string(),
            ));
        }
        self.refreshed(principal).await?;

        let outcome = self
            .store_for(principal)
            .grant_bonus(principal, amount, transaction_key)
            .await?;
        if outcome.applied {
            info!(%principal, amount, transaction_key, "applied credit grant");
        } else {
            info!(%principal, transaction_key, "ignored replayed credit grant");
        }
        Ok(GrantReceipt {
            applied: outcome.applied,
            snapshot: Self::snapshot(principal, &outcome.counter),
        })
    }

    /// Moves the principal onto a new tier, zeroing the period count and
    /// re-anchoring. Setting the tier it already has is a no-op, so a
    /// replayed billing webhook cannot wipe a live period.
    pub async fn set_tier(
        &self,
        principal: &Principal,
        tier: Tier,
    ) -> Result<UsageSnapshot, LedgerError> {
        if principal.is_anonymous() {
            return Err(LedgerError::InvalidPrincipal(
                "subscription tiers require an authenticated user".to_string(),
            ));
        }
        let counter = self.refreshed(principal).await?;
        if counter.tier == tier {
            return Ok(Self::snapshot(principal, &counter));
        }

        let updated = self
            .store_for(principal)
            .set_tier(principal, tier, Utc::now())
            .await?;
        info!(%principal, tier = tier.as_str(), "subscription tier changed");
        Ok(Self::snapshot(principal, &updated))
    }
}

#[cfg(test)]
mod tests {
    use super::memory::MemoryLedgerStore;
    use super::*;
    use chrono::Duration;
    use uuid::Uuid;

    fn make_ledger() -> (UsageLedger, Arc<MemoryLedgerStore>, Arc<MemoryLedgerStore>) {
        let durable = Arc::new(MemoryLedgerStore::new());
        let transient = Arc::new(MemoryLedgerStore::new());
        let ledger = UsageLedger::new(durable.clone(), transient.clone());
        (ledger, durable, transient)
    }

    fn user() -> Principal {
        Principal::User(Uuid::new_v4())
    }

    #[tokio::test]
    async fn test_unknown_user_starts_on_free_tier() {
        let (ledger, _, _) = make_ledger();
        let snap = ledger.status(&user()).await.unwrap();
        assert_eq!(snap.tier, Tier::Free);
        assert_eq!(snap.used, 0);
        assert_eq!(snap.limit, 10);
        assert_eq!(snap.remaining, 10);
        assert!(snap.can_proceed);
    }

    #[tokio::test]
    async fn test_status_rolls_over_lapsed_month_and_keeps_bonus() {
        let (ledger, durable, _) = make_ledger();
        let p = user();
        let two_months_ago = Utc::now() - Duration::days(62);
        durable
            .load_or_create(&p, Tier::Free, two_months_ago)
            .await
            .unwrap();
        durable.try_debit(&p, Tier::Free, 10, 7).await.unwrap();
        durable.grant_bonus(&p, 25, "tx").await.unwrap();

        let snap = ledger.status(&p).await.unwrap();
        assert_eq!(snap.used, 0);
        assert_eq!(snap.bonus_credits, 25);
        assert_eq!(snap.remaining, 35);
    }

    #[tokio::test]
    async fn test_record_usage_spends_bonus_once_quota_is_gone() {
        let (ledger, durable, _) = make_ledger();
        let p = user();
        durable.load_or_create(&p, Tier::Plus, Utc::now()).await.unwrap();
        durable.try_debit(&p, Tier::Plus, 100, 100).await.unwrap();
        durable.grant_bonus(&p, 200, "topup").await.unwrap();

        let snap = ledger
            .record_usage(&p, Operation::AnswerEvaluation)
            .await
            .unwrap();
        assert_eq!(snap.used, 100);
        assert_eq!(snap.period_remaining, 0);
        assert_eq!(snap.bonus_credits, 199);
        assert_eq!(snap.remaining, 199);
    }

    #[tokio::test]
    async fn test_record_usage_rejects_when_balance_runs_out() {
        let (ledger, durable, _) = make_ledger();
        let p = user();
        durable.load_or_create(&p, Tier::Free, Utc::now()).await.unwrap();
        durable.try_debit(&p, Tier::Free, 10, 10).await.unwrap();

        let err = ledger
            .record_usage(&p, Operation::AnswerEvaluation)
            .await
            .unwrap_err();
        match err {
            LedgerError::QuotaExceeded(snap) => {
                assert_eq!(snap.remaining, 0);
                assert!(!snap.can_proceed);
            }
            other => panic!("expected QuotaExceeded, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_partial_balance_cannot_cover_expensive_operation() {
        let (ledger, durable, _) = make_ledger();
        let p = user();
        durable.load_or_create(&p, Tier::Free, Utc::now()).await.unwrap();
        durable.try_debit(&p, Tier::Free, 10, 7).await.unwrap();

        // 3 credits left, full analysis costs 8.
        let err = ledger
            .record_usage(&p, Operation::FullAnalysis)
            .await
            .unwrap_err();
        assert!(matches!(err, LedgerError::QuotaExceeded(_)));

        // The failed attempt must not have burned anything.
        let snap = ledger.status(&p).await.unwrap();
        assert_eq!(snap.remaining, 3);
    }

    #[tokio::test]
    async fn test_unlimited_tier_counts_usage_but_never_blocks() {
        let (ledger, durable, _) = make_ledger();
        let p = user();
        durable
            .load_or_create(&p, Tier::Premium, Utc::now())
            .await
            .unwrap();

        let snap = ledger
            .record_usage(&p, Operation::FullAnalysis)
            .await
            .unwrap();
        assert_eq!(snap.used, 8);
        assert_eq!(snap.remaining, -1);
        assert!(snap.can_proceed);

        let snap = ledger
            .record_usage(&p, Operation::SessionEvaluation)
            .await
            .unwrap();
        assert_eq!(snap.used, 12);
    }

    #[tokio::test]
    async fn test_concurrent_debits_spend_each_credit_once() {
        let (ledger, durable, _) = make_ledger();
        let p = user();
        durable.load_or_create(&p, Tier::Free, Utc::now()).await.unwrap();

        // Two 8-credit debits against a 10-credit budget: exactly one can win.
        let (a, b) = tokio::join!(
            ledger.record_usage(&p, Operation::ResumeOptimization),
            ledger.record_usage(&p, Operation::ResumeOptimization),
        );
        let wins = [&a, &b].iter().filter(|r| r.is_ok()).count();
        assert_eq!(wins, 1);
        assert!([a, b]
            .into_iter()
            .find_map(Result::err)
            .is_some_and(|e| matches!(e, LedgerError::QuotaExceeded(_))));

        let snap = ledger.status(&p).await.unwrap();
        assert_eq!(snap.used, 8);
        assert_eq!(snap.remaining, 2);
    }

    #[tokio::test]
    async fn test_grant_applies_once_per_transaction_key() {
        let (ledger, _, _) = make_ledger();
        let p = user();

        let first = ledger.add_bonus_credits(&p, 200, "evt_123").await.unwrap();
        assert!(first.applied);
        assert_eq!(first.snapshot.bonus_credits, 200);

        let replay = ledger.add_bonus_credits(&p, 200, "evt_123").await.unwrap();
        assert!(!replay.applied);
        assert_eq!(replay.snapshot.bonus_credits, 200);
    }

    #[tokio::test]
    async fn test_anonymous_principals_cannot_receive_grants_or_tiers() {
        let (ledger, _, _) = make_ledger();
        let p = Principal::Anonymous("1.2.3.4-test".to_string());

        let err = ledger.add_bonus_credits(&p, 50, "evt").await.unwrap_err();
        assert!(matches!(err, LedgerError::InvalidPrincipal(_)));

        let err = ledger.set_tier(&p, Tier::Plus).await.unwrap_err();
        assert!(matches!(err, LedgerError::InvalidPrincipal(_)));
    }

    #[tokio::test]
    async fn test_tier_change_starts_a_fresh_period() {
        let (ledger, _, _) = make_ledger();
        let p = user();
        ledger
            .record_usage(&p, Operation::SessionEvaluation)
            .await
            .unwrap();

        let snap = ledger.set_tier(&p, Tier::Plus).await.unwrap();
        assert_eq!(snap.tier, Tier::Plus);
        assert_eq!(snap.used, 0);
        assert_eq!(snap.limit, 100);
    }

    #[tokio::test]
    async fn test_setting_the_same_tier_keeps_the_period() {
        let (ledger, _, _) = make_ledger();
        let p = user();
        ledger
            .record_usage(&p, Operation::SessionEvaluation)
            .await
            .unwrap();

        let snap = ledger.set_tier(&p, Tier::Free).await.unwrap();
        assert_eq!(snap.used, 4);
    }

    #[tokio::test]
    async fn test_anonymous_allowance_exhausts_after_ten_unit_debits() {
        let (ledger, _, _) = make_ledger();
        let p = Principal::Anonymous("9.9.9.9-browser".to_string());

        for used in 1..=10 {
            let snap = ledger
                .record_usage(&p, Operation::AnswerEvaluation)
                .await
                .unwrap();
            assert_eq!(snap.used, used);
        }

        let err = ledger
            .record_usage(&p, Operation::AnswerEvaluation)
            .await
            .unwrap_err();
        match err {
            LedgerError::QuotaExceeded(snap) => assert_eq!(snap.remaining, 0),
            other => panic!("expected QuotaExceeded, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_anonymous_counters_use_the_daily_window() {
        let (ledger, _, transient) = make_ledger();
        let p = Principal::Anonymous("1.2.3.4-cli".to_string());

        let snap = ledger.status(&p).await.unwrap();
        assert_eq!(snap.limit, ANONYMOUS_DAILY_QUOTA);

        // Exhaust today, then age the counter a day: the window reopens.
        let yesterday = Utc::now() - Duration::days(1);
        let p2 = Principal::Anonymous("5.6.7.8-cli".to_string());
        transient
            .load_or_create(&p2, Tier::Free, yesterday)
            .await
            .unwrap();
        transient
            .try_debit(&p2, Tier::Free, ANONYMOUS_DAILY_QUOTA, ANONYMOUS_DAILY_QUOTA)
            .await
            .unwrap();

        let snap = ledger.status(&p2).await.unwrap();
        assert_eq!(snap.used, 0);
        assert_eq!(snap.remaining, ANONYMOUS_DAILY_QUOTA);
    }
}
