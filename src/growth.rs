//! Monthly user-growth curve.
//!
//! Built strictly after aggregation: a user's `first_time` can be lowered by
//! any later shard, so first-activity months are only meaningful once every
//! shard has been merged into every bucket.

use crate::item::month_key;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// One month on the growth curve.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GrowthPoint {
    pub month: String,
    pub new_users: i64,
    pub total_users: i64,
}

/// Tally of first-activity months across all buckets.
///
/// Keyed by `YYYY-MM`, so the BTreeMap ordering is already chronological.
#[derive(Debug, Default)]
pub struct GrowthTally {
    months: BTreeMap<String, i64>,
}

impl GrowthTally {
    /// Count one user's first activity. Returns whether the timestamp
    /// produced a month (epoch-zero first times do not, and such users are
    /// excluded from the curve and from the user total alike).
    pub fn record(&mut self, first_time: i64) -> bool {
        match month_key(first_time) {
            Some(month) => {
                *self.months.entry(month).or_insert(0) += 1;
                true
            }
            None => false,
        }
    }

    /// Total users counted so far — by construction equal to the sum of
    /// `new_users` over the finished curve.
    #[must_use]
    pub fn users(&self) -> i64 {
        self.months.values().sum()
    }

    /// Produce the ascending curve with its running cumulative total.
    #[must_use]
    pub fn into_curve(self) -> Vec<GrowthPoint> {
        let mut total = 0i64;
        self.months
            .into_iter()
            .map(|(month, new_users)| {
                total += new_users;
                GrowthPoint { month, new_users, total_users: total }
            })
            .collect()
    }
}
