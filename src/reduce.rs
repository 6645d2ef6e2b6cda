//! The per-user aggregate and its merge discipline.
//!
//! Aggregation is defined as a pure merge: an existing [`UserAggregate`]
//! (possibly absent) combined with one incoming item, field by field. Every
//! field operation — min/max with absent-as-identity, counter sums, the
//! strict-greater argmax pair — is commutative and associative across items,
//! so the final aggregate for a user does not depend on the order items are
//! seen. That is what makes per-shard, per-bucket batched application safe:
//! a bucket's buffer can be folded in memory first and the folded aggregates
//! merged into the store in one transaction.

use crate::item::{ItemClass, ItemRow, classify, domain_from_url, month_key};
use std::collections::HashMap;

/// Running aggregate for one username.
///
/// `avg_score` is deliberately absent: it is derived once, after all shards
/// are ingested, as `sum_score / items`.
#[derive(Debug, Clone, PartialEq)]
pub struct UserAggregate {
    pub first_time: Option<i64>,
    pub last_time: Option<i64>,
    pub items: i64,
    pub comments: i64,
    pub stories: i64,
    pub ask: i64,
    pub show: i64,
    pub launch: i64,
    pub jobs: i64,
    pub polls: i64,
    pub sum_score: f64,
    pub max_score: f64,
    pub min_score: f64,
    pub max_score_id: Option<i64>,
    pub max_score_title: Option<String>,
}

/// One item's contribution, pre-resolved for routing and the side tables.
#[derive(Debug, Clone, PartialEq)]
pub struct ItemUpdate {
    pub username: String,
    pub time: Option<i64>,
    pub class: ItemClass,
    pub score: f64,
    pub id: i64,
    pub title: Option<String>,
    pub domain: Option<String>,
    pub month: Option<String>,
}

impl ItemUpdate {
    /// Derive an update from a scanned row.
    ///
    /// Missing or non-finite scores count as 0. A zero timestamp is treated
    /// as absent throughout (no time bounds, no month).
    #[must_use]
    pub fn from_row(row: &ItemRow) -> Self {
        Self {
            username: row.by.clone(),
            time: row.time.filter(|t| *t != 0),
            class: classify(&row.kind, row.title.as_deref()),
            score: row.score.filter(|s| s.is_finite()).unwrap_or(0.0),
            id: row.id,
            title: row.title.clone(),
            domain: row.url.as_deref().and_then(domain_from_url),
            month: row.time.and_then(month_key),
        }
    }
}

impl UserAggregate {
    /// The aggregate of a single item — the seed for a first-seen user.
    ///
    /// The first item always sets the argmax pair, whatever its score.
    #[must_use]
    pub fn seed(upd: &ItemUpdate) -> Self {
        let c = upd.class;
        Self {
            first_time: upd.time,
            last_time: upd.time,
            items: 1,
            comments: c.comment.into(),
            stories: c.story.into(),
            ask: c.ask.into(),
            show: c.show.into(),
            launch: c.launch.into(),
            jobs: c.job.into(),
            polls: c.poll.into(),
            sum_score: upd.score,
            max_score: upd.score,
            min_score: upd.score,
            max_score_id: Some(upd.id),
            max_score_title: upd.title.clone(),
        }
    }

    /// Fold one more item into this aggregate.
    ///
    /// The argmax pair is replaced only on a strictly greater score, so ties
    /// keep the item that first reached the current maximum.
    pub fn absorb(&mut self, upd: &ItemUpdate) {
        let c = upd.class;
        self.first_time = min_opt(self.first_time, upd.time);
        self.last_time = max_opt(self.last_time, upd.time);
        self.items += 1;
        self.comments += i64::from(c.comment);
        self.stories += i64::from(c.story);
        self.ask += i64::from(c.ask);
        self.show += i64::from(c.show);
        self.launch += i64::from(c.launch);
        self.jobs += i64::from(c.job);
        self.polls += i64::from(c.poll);
        self.sum_score += upd.score;
        if upd.score > self.max_score {
            self.max_score = upd.score;
            self.max_score_id = Some(upd.id);
            self.max_score_title = upd.title.clone();
        }
        self.min_score = self.min_score.min(upd.score);
    }

    /// Merge another aggregate into this one.
    ///
    /// Combining per-batch aggregates this way is equivalent to absorbing
    /// their items one at a time; the store-side upsert applies the same
    /// policies when folding a batch into a persistent row.
    pub fn merge(&mut self, other: &UserAggregate) {
        self.first_time = min_opt(self.first_time, other.first_time);
        self.last_time = max_opt(self.last_time, other.last_time);
        self.items += other.items;
        self.comments += other.comments;
        self.stories += other.stories;
        self.ask += other.ask;
        self.show += other.show;
        self.launch += other.launch;
        self.jobs += other.jobs;
        self.polls += other.polls;
        self.sum_score += other.sum_score;
        if other.max_score > self.max_score {
            self.max_score = other.max_score;
            self.max_score_id = other.max_score_id;
            self.max_score_title = other.max_score_title.clone();
        }
        self.min_score = self.min_score.min(other.min_score);
    }
}

fn min_opt(a: Option<i64>, b: Option<i64>) -> Option<i64> {
    match (a, b) {
        (Some(x), Some(y)) => Some(x.min(y)),
        (x, None) => x,
        (None, y) => y,
    }
}

fn max_opt(a: Option<i64>, b: Option<i64>) -> Option<i64> {
    match (a, b) {
        (Some(x), Some(y)) => Some(x.max(y)),
        (x, None) => x,
        (None, y) => y,
    }
}

/// In-memory fold of one bucket's rows for one shard.
///
/// Holds the pre-merged user aggregates and the domain/month side tallies;
/// flushed to the bucket store in a single transaction and then discarded.
#[derive(Debug, Default)]
pub struct ShardTally {
    pub users: HashMap<String, UserAggregate>,
    pub domains: HashMap<(String, String), i64>,
    pub months: HashMap<(String, String), i64>,
}

impl ShardTally {
    /// Fold one item into the tally.
    pub fn add(&mut self, upd: ItemUpdate) {
        if let Some(domain) = &upd.domain {
            *self
                .domains
                .entry((upd.username.clone(), domain.clone()))
                .or_insert(0) += 1;
        }
        if let Some(month) = &upd.month {
            *self
                .months
                .entry((upd.username.clone(), month.clone()))
                .or_insert(0) += 1;
        }
        self.users
            .entry(upd.username.clone())
            .and_modify(|agg| agg.absorb(&upd))
            .or_insert_with(|| UserAggregate::seed(&upd));
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.users.is_empty()
    }
}
