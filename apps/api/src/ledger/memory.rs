//! In-process ledger backend.
//!
//! Holds anonymous fingerprint counters (single instance, cleared on
//! restart) and doubles as the test backend for the facade. DashMap entry
//! guards serialize all mutation per key; no guard is ever held across an
//! await point.

use std::collections::HashSet;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use dashmap::DashMap;

use super::store::{CounterState, GrantOutcome, LedgerStore};
use super::LedgerError;
use crate::principal::Principal;
use crate::tiers::Tier;

#[derive(Debug)]
struct Entry {
    counter: CounterState,
    grant_keys: HashSet<String>,
}

/// DashMap-backed `LedgerStore`.
#[derive(Default)]
pub struct MemoryLedgerStore {
    entries: DashMap<String, Entry>,
}

impl MemoryLedgerStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn key(principal: &Principal) -> String {
        principal.to_string()
    }
}

#[async_trait]
impl LedgerStore for MemoryLedgerStore {
    async fn load_or_create(
        &self,
        principal: &Principal,
        tier: Tier,
        now: DateTime<Utc>,
    ) -> Result<CounterState, LedgerError> {
        let entry = self
            .entries
            .entry(Self::key(principal))
            .or_insert_with(|| Entry {
                counter: CounterState {
                    tier,
                    period_count: 0,
                    period_anchor: now,
                    bonus_credits: 0,
                    total_used: 0,
                },
                grant_keys: HashSet::new(),
            });
        Ok(entry.counter.clone())
    }

    async fn reset_period(
        &self,
        principal: &Principal,
        expected_anchor: DateTime<Utc>,
        now: DateTime<Utc>,
    ) -> Result<(), LedgerError> {
        if let Some(mut entry) = self.entries.get_mut(&Self::key(principal)) {
            // Anchor compare-and-set: a stale anchor means another task
            // already reset this period.
            if entry.counter.period_anchor == expected_anchor {
                entry.counter.period_count = 0;
                entry.counter.period_anchor = now;
            }
        }
        Ok(())
    }

    async fn try_debit(
        &self,
        principal: &Principal,
        expected_tier: Tier,
        limit: i64,
        cost: i64,
    ) -> Result<Option<CounterState>, LedgerError> {
        let Some(mut entry) = self.entries.get_mut(&Self::key(principal)) else {
            return Ok(None);
        };
        let counter = &mut entry.counter;

        if counter.tier != expected_tier {
            return Ok(None);
        }

        if limit < 0 {
            counter.period_count += cost;
        } else {
            let headroom = (limit - counter.period_count).max(0);
            if headroom + counter.bonus_credits < cost {
                return Ok(None);
            }
            let from_quota = cost.min(headroom);
            counter.period_count += from_quota;
            counter.bonus_credits -= cost - from_quota;
        }
        counter.total_used += cost;

        Ok(Some(counter.clone()))
    }

    async fn grant_bonus(
        &self,
        principal: &Principal,
        amount: i64,
        transaction_key: &str,
    ) -> Result<GrantOutcome, LedgerError> {
        let mut entry = self
            .entries
            .get_mut(&Self::key(principal))
            .ok_or(LedgerError::Storage(sqlx::Error::RowNotFound))?;

        if !entry.grant_keys.insert(transaction_key.to_string()) {
            return Ok(GrantOutcome {
                applied: false,
                counter: entry.counter.clone(),
            });
        }
        entry.counter.bonus_credits += amount;
        Ok(GrantOutcome {
            applied: true,
            counter: entry.counter.clone(),
        })
    }

    async fn set_tier(
        &self,
        principal: &Principal,
        tier: Tier,
        now: DateTime<Utc>,
    ) -> Result<CounterState, LedgerError> {
        let mut entry = self
            .entries
            .get_mut(&Self::key(principal))
            .ok_or(LedgerError::Storage(sqlx::Error::RowNotFound))?;

        entry.counter.tier = tier;
        entry.counter.period_count = 0;
        entry.counter.period_anchor = now;
        Ok(entry.counter.clone())
    }
}
