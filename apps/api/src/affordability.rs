//! Pre-flight affordability checks.
//!
//! Pure read over a usage snapshot. Callers check before starting paid
//! work and record usage only after it succeeds, so a passing check is
//! advisory; the debit itself re-verifies atomically.

use serde::Serialize;

use crate::ledger::UsageSnapshot;
use crate::tiers::Operation;

#[derive(Debug, Clone, Serialize)]
pub struct Affordability {
    pub can_afford: bool,
    pub operation: Operation,
    pub credit_cost: i64,
    pub snapshot: UsageSnapshot,
}

/// Whether the snapshot's balance covers the operation. Unlimited tiers
/// (negative limit) afford everything; the -1 remaining sentinel never
/// enters the comparison.
pub fn check_affordability(operation: Operation, snapshot: UsageSnapshot) -> Affordability {
    let credit_cost = operation.credit_cost();
    let unlimited = snapshot.limit < 0;
    Affordability {
        can_afford: unlimited || snapshot.remaining >= credit_cost,
        operation,
        credit_cost,
        snapshot,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tiers::Tier;

    fn make_snapshot(tier: Tier, limit: i64, remaining: i64) -> UsageSnapshot {
        UsageSnapshot {
            can_proceed: limit < 0 || remaining > 0,
            used: 0,
            limit,
            period_remaining: remaining,
            bonus_credits: 0,
            remaining,
            tier,
        }
    }

    #[test]
    fn test_fresh_balance_affords_cheap_and_expensive_operations() {
        let snap = make_snapshot(Tier::Free, 10, 10);
        assert!(check_affordability(Operation::AnswerEvaluation, snap.clone()).can_afford);
        assert!(check_affordability(Operation::FullAnalysis, snap).can_afford);
    }

    #[test]
    fn test_exact_remaining_still_affords() {
        let snap = make_snapshot(Tier::Free, 10, 8);
        assert!(check_affordability(Operation::FullAnalysis, snap).can_afford);
    }

    #[test]
    fn test_short_balance_denies_only_what_it_cannot_cover() {
        let snap = make_snapshot(Tier::Free, 10, 3);
        assert!(!check_affordability(Operation::SessionEvaluation, snap.clone()).can_afford);
        assert!(check_affordability(Operation::AnswerEvaluation, snap).can_afford);
    }

    #[test]
    fn test_zero_balance_denies_everything() {
        let snap = make_snapshot(Tier::Free, 10, 0);
        let verdict = check_affordability(Operation::AnswerEvaluation, snap);
        assert!(!verdict.can_afford);
        assert_eq!(verdict.credit_cost, 1);
    }

    #[test]
    fn test_unlimited_tier_affords_despite_sentinel_remaining() {
        // remaining is -1 here; a plain numeric compare would wrongly deny.
        let snap = make_snapshot(Tier::Premium, -1, -1);
        assert!(check_affordability(Operation::FullAnalysis, snap).can_afford);
    }
}
