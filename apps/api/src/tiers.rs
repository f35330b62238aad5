//! Tier and operation pricing tables.
//!
//! Quotas and credit costs are fixed constants, not computed. PREMIUM uses
//! -1 as the unlimited sentinel, which flows through snapshots unchanged.

use serde::{Deserialize, Serialize};

/// Daily operation allowance for anonymous (fingerprint-tracked) callers.
pub const ANONYMOUS_DAILY_QUOTA: i64 = 10;

/// Subscription tier. Stored as TEXT in `usage_counters.tier`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Tier {
    Free,
    Plus,
    Premium,
}

impl Tier {
    /// Monthly operation quota for authenticated principals. -1 means
    /// unlimited.
    pub fn monthly_quota(self) -> i64 {
        match self {
            Tier::Free => 10,
            Tier::Plus => 100,
            Tier::Premium => -1,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Tier::Free => "FREE",
            Tier::Plus => "PLUS",
            Tier::Premium => "PREMIUM",
        }
    }

    /// Parses a stored or webhook-supplied tier name. Billing-provider
    /// aliases (PRO, ENTERPRISE) map onto the canonical tiers; anything
    /// unrecognized degrades to FREE.
    pub fn from_name(name: &str) -> Tier {
        match name.trim().to_ascii_uppercase().as_str() {
            "PLUS" | "PRO" => Tier::Plus,
            "PREMIUM" | "ENTERPRISE" => Tier::Premium,
            _ => Tier::Free,
        }
    }
}

/// Operation classes that consume credits.
///
/// Serialized in snake_case, so these double as the path segments of
/// `/api/v1/affordability/:operation`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Operation {
    AnswerEvaluation,
    SessionEvaluation,
    CoverLetter,
    FullAnalysis,
    ResumeOptimization,
}

impl Operation {
    pub fn credit_cost(self) -> i64 {
        match self {
            Operation::AnswerEvaluation => 1,
            Operation::SessionEvaluation => 4,
            Operation::CoverLetter => 4,
            Operation::FullAnalysis => 8,
            Operation::ResumeOptimization => 8,
        }
    }
}
