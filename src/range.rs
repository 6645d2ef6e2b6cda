//! Effective time-range estimation for one shard.
//!
//! The raw min/max timestamps in a shard regularly include corrupted
//! outliers, so the reported range is trimmed to the 1st and 99th
//! percentile ranks instead. Shards with no timestamped rows pass the
//! manifest-provided bounds through unchanged.

use anyhow::{Context, Result};
use rusqlite::{Connection, OptionalExtension};

/// Percentile-trimmed time range plus the null-timestamp count.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EffectiveRange {
    pub tmin_eff: Option<i64>,
    pub tmax_eff: Option<i64>,
    pub time_null: i64,
}

/// 0-indexed ranks read as the trimmed bounds for `n` timestamped rows.
///
/// Both ranks are `floor((n-1) * p)`. For small `n` they can collapse to
/// the same offset (with `n == 2` both resolve to 0, so the trimmed min and
/// max are equal even though the real values differ). That collapse is part
/// of the trimming contract and is relied on downstream; do not widen it.
#[must_use]
pub fn percentile_offsets(n: i64) -> (i64, i64) {
    let lo = ((n - 1) as f64 * 0.01).floor() as i64;
    let hi = ((n - 1) as f64 * 0.99).floor() as i64;
    (lo, hi)
}

/// Estimate the effective range of an open shard.
///
/// `tmin`/`tmax` are the manifest-provided bounds, reported unchanged when
/// the shard has no timestamped rows.
///
/// # Errors
///
/// Any query failure against the shard is propagated; the caller decides
/// whether that aborts the run or skips the shard.
pub fn estimate(
    conn: &Connection,
    tmin: Option<i64>,
    tmax: Option<i64>,
) -> Result<EffectiveRange> {
    let time_count: i64 = conn
        .query_row("SELECT COUNT(*) FROM items WHERE time IS NOT NULL", [], |row| row.get(0))
        .context("count timestamped items")?;

    let mut tmin_eff = tmin;
    let mut tmax_eff = tmax;
    if time_count > 0 {
        let (lo, hi) = percentile_offsets(time_count);
        tmin_eff = time_at_rank(conn, lo)?.or(tmin_eff);
        tmax_eff = time_at_rank(conn, hi)?.or(tmax_eff);
    }

    let time_null: i64 = conn
        .query_row("SELECT COUNT(*) FROM items WHERE time IS NULL", [], |row| row.get(0))
        .context("count null-timestamp items")?;

    Ok(EffectiveRange { tmin_eff, tmax_eff, time_null })
}

fn time_at_rank(conn: &Connection, rank: i64) -> Result<Option<i64>> {
    conn.query_row(
        "SELECT time FROM items WHERE time IS NOT NULL ORDER BY time LIMIT 1 OFFSET ?1",
        [rank],
        |row| row.get(0),
    )
    .optional()
    .with_context(|| format!("timestamp at rank {rank}"))
}
