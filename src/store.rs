//! Per-bucket SQLite output stores.
//!
//! Each bucket store holds the `users` aggregate table plus the
//! `user_domains` and `user_months` side tables for the usernames routed to
//! that bucket. Stores are throwaway build artifacts recreated on every run,
//! so durability pragmas are off. A shard's folded tally is merged in one
//! transaction per bucket: either every row of the batch lands or none does,
//! and a reader never observes a bucket half-updated for a shard.
//!
//! The upsert merge mirrors the pure reducer in [`crate::reduce`] field for
//! field; the CASE guards around the time bounds keep an absent side from
//! poisoning the MIN/MAX, and the argmax columns move only when the incoming
//! batch strictly beats the stored maximum.

use crate::alphabet::{BUCKET_COUNT, bucket_char};
use crate::reduce::ShardTally;
use anyhow::{Context, Result, anyhow};
use rusqlite::{Connection, named_params};
use std::fs;
use std::path::{Path, PathBuf};

const SCHEMA_SQL: &str = "
    PRAGMA journal_mode = OFF;
    PRAGMA synchronous = OFF;

    CREATE TABLE users (
      username TEXT PRIMARY KEY,
      first_time INTEGER,
      last_time INTEGER,
      items INTEGER,
      comments INTEGER,
      stories INTEGER,
      ask INTEGER,
      show INTEGER,
      launch INTEGER,
      jobs INTEGER,
      polls INTEGER,
      avg_score REAL,
      sum_score INTEGER,
      max_score INTEGER,
      min_score INTEGER,
      max_score_id INTEGER,
      max_score_title TEXT
    );

    CREATE TABLE user_domains (
      username TEXT NOT NULL,
      domain TEXT NOT NULL,
      count INTEGER NOT NULL,
      PRIMARY KEY(username, domain)
    );

    CREATE TABLE user_months (
      username TEXT NOT NULL,
      month TEXT NOT NULL,
      count INTEGER NOT NULL,
      PRIMARY KEY(username, month)
    );
";

const UPSERT_USER: &str = "
    INSERT INTO users (username, first_time, last_time, items, comments, stories,
                       ask, show, launch, jobs, polls, avg_score, sum_score,
                       max_score, min_score, max_score_id, max_score_title)
    VALUES (:username, :first_time, :last_time, :items, :comments, :stories,
            :ask, :show, :launch, :jobs, :polls, NULL, :sum_score,
            :max_score, :min_score, :max_score_id, :max_score_title)
    ON CONFLICT(username) DO UPDATE SET
      first_time = CASE
        WHEN users.first_time IS NULL THEN excluded.first_time
        WHEN excluded.first_time IS NULL THEN users.first_time
        ELSE MIN(users.first_time, excluded.first_time) END,
      last_time = CASE
        WHEN users.last_time IS NULL THEN excluded.last_time
        WHEN excluded.last_time IS NULL THEN users.last_time
        ELSE MAX(users.last_time, excluded.last_time) END,
      items = users.items + excluded.items,
      comments = users.comments + excluded.comments,
      stories = users.stories + excluded.stories,
      ask = users.ask + excluded.ask,
      show = users.show + excluded.show,
      launch = users.launch + excluded.launch,
      jobs = users.jobs + excluded.jobs,
      polls = users.polls + excluded.polls,
      sum_score = users.sum_score + excluded.sum_score,
      max_score_id = CASE WHEN excluded.max_score > users.max_score
                          THEN excluded.max_score_id ELSE users.max_score_id END,
      max_score_title = CASE WHEN excluded.max_score > users.max_score
                             THEN excluded.max_score_title ELSE users.max_score_title END,
      max_score = MAX(users.max_score, excluded.max_score),
      min_score = MIN(users.min_score, excluded.min_score)
";

const UPSERT_DOMAIN: &str = "
    INSERT INTO user_domains (username, domain, count)
    VALUES (?1, ?2, ?3)
    ON CONFLICT(username, domain) DO UPDATE SET count = count + excluded.count
";

const UPSERT_MONTH: &str = "
    INSERT INTO user_months (username, month, count)
    VALUES (?1, ?2, ?3)
    ON CONFLICT(username, month) DO UPDATE SET count = count + excluded.count
";

const FINALIZE_SQL: &str = "
    UPDATE users SET avg_score = CAST(sum_score AS REAL) / NULLIF(items, 0);
    CREATE INDEX IF NOT EXISTS idx_users_last_time ON users(last_time);
    CREATE INDEX IF NOT EXISTS idx_users_items ON users(items);
    CREATE INDEX IF NOT EXISTS idx_user_domains ON user_domains(username);
    CREATE INDEX IF NOT EXISTS idx_user_months ON user_months(username);
";

/// One bucket's output store.
pub struct BucketStore {
    conn: Connection,
    path: PathBuf,
    sid: usize,
}

impl BucketStore {
    /// Create the store for bucket `sid` under `dir`, replacing any file
    /// left over from a previous run.
    ///
    /// # Errors
    ///
    /// Fails when the old file cannot be removed or the schema cannot be
    /// created.
    pub fn create(dir: &Path, sid: usize) -> Result<Self> {
        let path = dir.join(format!("user_{sid}.sqlite"));
        if path.exists() {
            fs::remove_file(&path)
                .with_context(|| format!("remove stale store {}", path.display()))?;
        }
        let conn = Connection::open(&path)
            .with_context(|| format!("open bucket store {}", path.display()))?;
        conn.execute_batch(SCHEMA_SQL)
            .with_context(|| format!("initialize bucket store {}", path.display()))?;
        Ok(Self { conn, path, sid })
    }

    #[must_use]
    pub fn sid(&self) -> usize {
        self.sid
    }

    #[must_use]
    pub fn symbol(&self) -> char {
        bucket_char(self.sid)
    }

    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Merge one shard's folded tally into the store, atomically.
    ///
    /// # Errors
    ///
    /// A failed statement rolls the whole batch back and is fatal for the
    /// run; the bucket stores are this pass's own output and errors there
    /// are not recoverable.
    pub fn apply(&mut self, tally: &ShardTally) -> Result<()> {
        let tx = self.conn.transaction().context("begin bucket transaction")?;
        {
            let mut upsert_user = tx.prepare_cached(UPSERT_USER)?;
            for (username, agg) in &tally.users {
                upsert_user
                    .execute(named_params! {
                        ":username": username,
                        ":first_time": agg.first_time,
                        ":last_time": agg.last_time,
                        ":items": agg.items,
                        ":comments": agg.comments,
                        ":stories": agg.stories,
                        ":ask": agg.ask,
                        ":show": agg.show,
                        ":launch": agg.launch,
                        ":jobs": agg.jobs,
                        ":polls": agg.polls,
                        ":sum_score": agg.sum_score,
                        ":max_score": agg.max_score,
                        ":min_score": agg.min_score,
                        ":max_score_id": agg.max_score_id,
                        ":max_score_title": agg.max_score_title,
                    })
                    .with_context(|| format!("upsert user {username}"))?;
            }
            let mut upsert_domain = tx.prepare_cached(UPSERT_DOMAIN)?;
            for ((username, domain), count) in &tally.domains {
                upsert_domain
                    .execute(rusqlite::params![username, domain, count])
                    .with_context(|| format!("upsert domain count for {username}"))?;
            }
            let mut upsert_month = tx.prepare_cached(UPSERT_MONTH)?;
            for ((username, month), count) in &tally.months {
                upsert_month
                    .execute(rusqlite::params![username, month, count])
                    .with_context(|| format!("upsert month count for {username}"))?;
            }
        }
        tx.commit().context("commit bucket transaction")
    }

    /// Derive `avg_score` and build the secondary indexes.
    ///
    /// Runs once, after every shard has been merged; `avg_score` is never
    /// accumulated directly and stays NULL for rows with zero items.
    ///
    /// # Errors
    ///
    /// Propagates any SQL failure.
    pub fn finalize(&self) -> Result<()> {
        self.conn
            .execute_batch(FINALIZE_SQL)
            .with_context(|| format!("finalize bucket store {}", self.path.display()))
    }

    /// All non-null `first_time` values, for the post-pass growth tally.
    ///
    /// # Errors
    ///
    /// Propagates any SQL failure.
    pub fn first_activity_times(&self) -> Result<Vec<i64>> {
        let mut stmt = self
            .conn
            .prepare("SELECT first_time FROM users WHERE first_time IS NOT NULL")?;
        let times = stmt
            .query_map([], |row| row.get(0))?
            .collect::<rusqlite::Result<Vec<i64>>>()
            .context("scan first-activity times")?;
        Ok(times)
    }

    /// Close the store, returning its path.
    ///
    /// # Errors
    ///
    /// Fails if SQLite cannot cleanly close the connection.
    pub fn finish(self) -> Result<PathBuf> {
        self.conn
            .close()
            .map_err(|(_, err)| anyhow!(err))
            .with_context(|| format!("close bucket store {}", self.path.display()))?;
        Ok(self.path)
    }
}

/// The fixed arena of all bucket stores, indexed by the router.
///
/// Every bucket exists from the start of the run; none are created lazily.
pub struct BucketSet {
    stores: Vec<BucketStore>,
}

impl BucketSet {
    /// Create all [`BUCKET_COUNT`] stores under `dir`.
    ///
    /// # Errors
    ///
    /// Fails if any single store cannot be created.
    pub fn create(dir: &Path) -> Result<Self> {
        let mut stores = Vec::with_capacity(BUCKET_COUNT);
        for sid in 0..BUCKET_COUNT {
            stores.push(BucketStore::create(dir, sid)?);
        }
        Ok(Self { stores })
    }

    #[must_use]
    pub fn store_mut(&mut self, bucket: usize) -> &mut BucketStore {
        &mut self.stores[bucket]
    }

    #[must_use]
    pub fn into_stores(self) -> Vec<BucketStore> {
        self.stores
    }
}
