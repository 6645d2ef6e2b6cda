//! The archive-index pass: per-shard summary counts and effective ranges.
//!
//! Unlike the user-statistics pass, this one performs no per-user work and
//! treats a missing shard as fatal — the summary claims to describe the
//! whole archive, so it is aborted before any output is written rather than
//! published with silent holes.

use crate::compress::open_shard;
use crate::fsutil::{ensure_writable_or_backup, write_json_pretty};
use crate::manifest::load_manifest;
use crate::range;
use anyhow::{Context, Result, bail};
use chrono::{SecondsFormat, Utc};
use rusqlite::{Connection, OpenFlags};
use serde::Serialize;
use std::fs;
use std::path::{Path, PathBuf};

/// Configuration for the archive-index pass.
#[derive(Debug, Clone)]
pub struct IndexConfig {
    pub manifest: PathBuf,
    pub shards_dir: PathBuf,
    pub out: PathBuf,
}

impl Default for IndexConfig {
    fn default() -> Self {
        Self {
            manifest: PathBuf::from("docs/static-manifest.json"),
            shards_dir: PathBuf::from("docs/static-shards"),
            out: PathBuf::from("docs/archive-index.json"),
        }
    }
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct ArchiveTotals {
    pub items: i64,
    pub posts: i64,
    pub comments: i64,
    pub bytes: u64,
    pub shards: usize,
}

/// Sidecar metadata file listed alongside the shard summaries.
#[derive(Debug, Clone, Serialize)]
pub struct ManifestFileMeta {
    pub file: String,
    pub bytes: u64,
    pub note: String,
}

/// Summary of one shard.
#[derive(Debug, Clone, Serialize)]
pub struct ShardSummary {
    pub sid: i64,
    pub file: String,
    pub tmin: Option<i64>,
    pub tmax: Option<i64>,
    pub tmin_eff: Option<i64>,
    pub tmax_eff: Option<i64>,
    pub time_null: i64,
    pub id_lo: Option<i64>,
    pub id_hi: Option<i64>,
    pub count: i64,
    pub posts: i64,
    pub comments: i64,
    pub bytes: u64,
}

/// The archive-index output document.
#[derive(Debug, Clone, Serialize)]
pub struct ArchiveIndex {
    pub generated_at: String,
    pub snapshot_time: Option<serde_json::Value>,
    pub totals: ArchiveTotals,
    pub manifests: Vec<ManifestFileMeta>,
    pub shards: Vec<ShardSummary>,
}

/// Run the archive-index pass and write the summary document.
///
/// # Errors
///
/// Any missing or unreadable shard aborts the run before output is written.
pub fn build_archive_index(cfg: &IndexConfig) -> Result<ArchiveIndex> {
    let manifest = load_manifest(&cfg.manifest)?;
    let scratch = tempfile::tempdir().context("create scratch dir")?;

    let mut out = ArchiveIndex {
        generated_at: Utc::now().to_rfc3339_opts(SecondsFormat::Millis, true),
        snapshot_time: manifest.snapshot_time.clone(),
        totals: ArchiveTotals { shards: manifest.shards.len(), ..ArchiveTotals::default() },
        manifests: manifest_sidecars(&cfg.manifest),
        shards: Vec::with_capacity(manifest.shards.len()),
    };

    let shard_count = manifest.shards.len();
    for (idx, shard) in manifest.shards.iter().enumerate() {
        let shard_path = cfg.shards_dir.join(&shard.file);
        if !shard_path.exists() {
            bail!("shard missing: {}", shard_path.display());
        }
        let bytes = fs::metadata(&shard_path)
            .with_context(|| format!("stat {}", shard_path.display()))?
            .len();
        let handle = open_shard(&shard_path, scratch.path())
            .with_context(|| format!("open shard {}", shard.sid))?;
        let conn =
            Connection::open_with_flags(handle.db_path(), OpenFlags::SQLITE_OPEN_READ_ONLY)
                .with_context(|| format!("open shard db {}", handle.db_path().display()))?;

        let eff = range::estimate(&conn, shard.tmin, shard.tmax)
            .with_context(|| format!("estimate range for shard {}", shard.sid))?;
        let (items, comments, posts) = shard_counts(&conn)
            .with_context(|| format!("count items in shard {}", shard.sid))?;

        out.totals.items += items;
        out.totals.comments += comments;
        out.totals.posts += posts;
        out.totals.bytes += bytes;
        out.shards.push(ShardSummary {
            sid: shard.sid,
            file: shard.file.clone(),
            tmin: shard.tmin,
            tmax: shard.tmax,
            tmin_eff: eff.tmin_eff,
            tmax_eff: eff.tmax_eff,
            time_null: eff.time_null,
            id_lo: shard.id_lo,
            id_hi: shard.id_hi,
            count: items,
            posts,
            comments,
            bytes,
        });
        log::info!("scanned shard {}/{} sid {}", idx + 1, shard_count, shard.sid);
    }

    ensure_writable_or_backup(&cfg.out)?;
    write_json_pretty(&cfg.out, &out)?;
    log::info!("wrote {}", cfg.out.display());
    Ok(out)
}

/// Items, comments, and posts (everything that is not a comment) in a shard.
fn shard_counts(conn: &Connection) -> Result<(i64, i64, i64)> {
    conn.query_row(
        "SELECT
           COUNT(*),
           COALESCE(SUM(CASE WHEN type = 'comment' THEN 1 ELSE 0 END), 0),
           COALESCE(SUM(CASE WHEN type != 'comment' THEN 1 ELSE 0 END), 0)
         FROM items",
        [],
        |row| Ok((row.get(0)?, row.get(1)?, row.get(2)?)),
    )
    .map_err(Into::into)
}

/// Describe the metadata files that ship next to the shard manifest.
fn manifest_sidecars(manifest_path: &Path) -> Vec<ManifestFileMeta> {
    let dir = manifest_path.parent().unwrap_or_else(|| Path::new("."));
    let manifest_name = manifest_path
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default();
    let candidates = [
        (manifest_name.as_str(), "Shard metadata, ranges, and snapshot time."),
        ("filter-manifest.json", "Prime filter data for the main view."),
    ];
    let mut out = Vec::new();
    for (file, note) in candidates {
        if file.is_empty() {
            continue;
        }
        let Ok(meta) = fs::metadata(dir.join(file)) else {
            continue;
        };
        out.push(ManifestFileMeta {
            file: file.to_string(),
            bytes: meta.len(),
            note: note.to_string(),
        });
    }
    out
}
