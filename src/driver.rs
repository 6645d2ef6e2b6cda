//! The user-statistics pass: one streaming sweep over every shard.
//!
//! Shards are processed strictly sequentially in ascending sid order. Each
//! shard is decompressed to scratch if needed, scanned once through the
//! flow-controlled channel, routed row by row into per-bucket tallies, and
//! flushed transactionally per bucket. A shard that cannot be read is logged
//! and skipped — the pass continues with known-incomplete totals. After the
//! last shard the stores are finalized, the growth curve is tallied, and the
//! stats manifest is assembled.

use crate::alphabet::{ALPHABET, BUCKET_COUNT, bucket_for};
use crate::compress::{self, open_shard};
use crate::growth::{GrowthPoint, GrowthTally};
use crate::manifest::load_manifest;
use crate::reduce::{ItemUpdate, ShardTally};
use crate::store::BucketSet;
use crate::stream::ItemScan;
use anyhow::{Context, Result};
use chrono::{SecondsFormat, Utc};
use serde::Serialize;
use std::collections::HashSet;
use std::fs;
use std::path::PathBuf;

/// Configuration for the user-statistics pass.
#[derive(Debug, Clone)]
pub struct StatsConfig {
    pub manifest: PathBuf,
    pub shards_dir: PathBuf,
    pub out_dir: PathBuf,
    pub out_manifest: PathBuf,
    pub gzip: bool,
    pub keep_sqlite: bool,
}

impl Default for StatsConfig {
    fn default() -> Self {
        Self {
            manifest: PathBuf::from("docs/static-manifest.json"),
            shards_dir: PathBuf::from("docs/static-shards"),
            out_dir: PathBuf::from("docs/static-user-stats-shards"),
            out_manifest: PathBuf::from("docs/static-user-stats-manifest.json"),
            gzip: false,
            keep_sqlite: false,
        }
    }
}

/// One bucket store in the output manifest.
#[derive(Debug, Clone, Serialize)]
pub struct BucketMeta {
    pub sid: usize,
    #[serde(rename = "char")]
    pub symbol: char,
    pub file: String,
    pub bytes: u64,
}

#[derive(Debug, Clone, Serialize)]
pub struct StatsTotals {
    pub users: i64,
}

/// The stats manifest written next to the bucket stores.
#[derive(Debug, Clone, Serialize)]
pub struct StatsManifest {
    pub version: u32,
    pub created_at: String,
    pub shards: Vec<BucketMeta>,
    pub alphabet: String,
    pub totals: StatsTotals,
    pub user_growth: Vec<GrowthPoint>,
}

/// Run the user-statistics pass end to end.
///
/// # Errors
///
/// Fatal conditions are a missing or empty manifest, bucket-store failures,
/// and a gzip integrity failure on an output artifact. Missing or unreadable
/// shards are not fatal here; they are logged and skipped.
pub fn build_user_stats(cfg: &StatsConfig) -> Result<StatsManifest> {
    let manifest = load_manifest(&cfg.manifest)?;
    fs::create_dir_all(&cfg.out_dir)
        .with_context(|| format!("create output dir {}", cfg.out_dir.display()))?;

    let scratch = tempfile::tempdir().context("create scratch dir")?;
    let mut buckets = BucketSet::create(&cfg.out_dir)?;

    let shard_count = manifest.shards.len();
    let mut items_total = 0u64;
    let mut users_seen = 0u64;

    for (idx, shard) in manifest.shards.iter().enumerate() {
        let shard_path = cfg.shards_dir.join(&shard.file);
        if !shard_path.exists() {
            log::warn!("missing shard file: {}", shard_path.display());
            continue;
        }
        let handle = match open_shard(&shard_path, scratch.path()) {
            Ok(handle) => handle,
            Err(err) => {
                log::warn!("failed to gunzip shard {}: {err:#}", shard.sid);
                continue;
            }
        };

        let mut tallies: Vec<ShardTally> =
            (0..BUCKET_COUNT).map(|_| ShardTally::default()).collect();
        // Progress only: first-seen within this shard, so the running figure
        // can overcount users active in several shards.
        let mut seen = HashSet::new();

        let scan = ItemScan::open(handle.db_path());
        let scanned = scan.for_each_batch(|rows| {
            for row in rows {
                if seen.insert(row.by.clone()) {
                    users_seen += 1;
                }
                let update = ItemUpdate::from_row(&row);
                tallies[bucket_for(&row.by)].add(update);
                items_total += 1;
            }
            Ok(())
        });
        let scanned = match scanned {
            Ok(rows) => rows,
            Err(err) => {
                // Terminal stream error: this shard's buffers are discarded,
                // nothing was committed for it.
                log::warn!("shard {} scan aborted: {err:#}", shard.sid);
                continue;
            }
        };

        for (bucket, tally) in tallies.iter().enumerate() {
            if !tally.is_empty() {
                buckets
                    .store_mut(bucket)
                    .apply(tally)
                    .with_context(|| format!("flush shard {} bucket {bucket}", shard.sid))?;
            }
        }
        log::info!(
            "shard {}/{} sid {}: {} rows | items {} | users {}",
            idx + 1,
            shard_count,
            shard.sid,
            scanned,
            items_total,
            users_seen
        );
    }
    log::info!("ingested {items_total} items across {shard_count} shards");

    let mut growth = GrowthTally::default();
    let mut shard_meta = Vec::with_capacity(BUCKET_COUNT);
    for store in buckets.into_stores() {
        store.finalize()?;
        for first_time in store.first_activity_times()? {
            growth.record(first_time);
        }
        let sid = store.sid();
        let symbol = store.symbol();
        let path = store.finish()?;
        let mut bytes = fs::metadata(&path)
            .with_context(|| format!("stat {}", path.display()))?
            .len();
        let mut final_path = path.clone();
        if cfg.gzip {
            let mut gz = path.clone().into_os_string();
            gz.push(".gz");
            let gz = PathBuf::from(gz);
            bytes = compress::gzip_file(&path, &gz)?;
            compress::validate_gzip(&gz)
                .with_context(|| format!("bucket {sid} output failed validation"))?;
            if !cfg.keep_sqlite {
                fs::remove_file(&path)
                    .with_context(|| format!("remove {}", path.display()))?;
            }
            final_path = gz;
        }
        shard_meta.push(BucketMeta {
            sid,
            symbol,
            file: final_path
                .file_name()
                .map(|n| n.to_string_lossy().into_owned())
                .unwrap_or_default(),
            bytes,
        });
    }

    let out = StatsManifest {
        version: 1,
        created_at: Utc::now().to_rfc3339_opts(SecondsFormat::Millis, true),
        shards: shard_meta,
        alphabet: ALPHABET.to_string(),
        totals: StatsTotals { users: growth.users() },
        user_growth: growth.into_curve(),
    };
    crate::fsutil::write_json_pretty(&cfg.out_manifest, &out)?;
    log::info!("wrote {}", cfg.out_manifest.display());
    Ok(out)
}
